//! Welcome banner loading and templating.

use std::path::Path;

/// Fallback banner when no MOTD file is configured or readable.
const DEFAULT_MOTD: &str = "Welcome to bulletin v{{VERSION}} on {{HOST}}:{{PORT}}";

/// Load the MOTD file and substitute the `{{VERSION}}`, `{{HOST}}` and
/// `{{PORT}}` placeholders. Sessions receive the result pre-rendered and
/// never see the template.
pub fn load(path: Option<&Path>, host: &str, port: u16) -> String {
    let template = path
        .and_then(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_else(|| DEFAULT_MOTD.to_string());

    render(&template, host, port)
}

fn render(template: &str, host: &str, port: u16) -> String {
    template
        .replace("{{VERSION}}", env!("CARGO_PKG_VERSION"))
        .replace("{{HOST}}", host)
        .replace("{{PORT}}", &port.to_string())
}
