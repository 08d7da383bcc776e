//! Command parsing and dispatch for the bulletin board protocol.
//!
//! The command table is a closed keyword set: `help`, `post`, `read` and
//! `exit`. Keyword matching is case-insensitive; argument text is passed
//! through verbatim aside from trimming. Anything else is an invalid
//! command, which is reported but never terminates the session.

use crate::storage::MessageStore;

/// Prompt written after the banner and after every handled command.
pub const PROMPT: &str = "> ";

/// Fixed response for unmatched input.
pub const INVALID: &str = "*** Invalid command, try 'help'\n";

/// Static command summary returned by `help`.
pub const HELP_TEXT: &str = "*** Commands:\n\
    \x20   help           --- show this help message\n\
    \x20   post <message> --- post a message to the board\n\
    \x20   read           --- read recent messages\n\
    \x20   exit           --- quit the session\n\n";

/// A recognized client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the command summary.
    Help,
    /// Append a message to the board.
    Post(String),
    /// Read back recent messages.
    Read,
    /// End the session.
    Exit,
}

impl Command {
    /// Parse a trimmed command line. Returns `None` for unmatched input.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        let keyword = line.split_whitespace().next().unwrap_or("");

        match keyword.to_ascii_lowercase().as_str() {
            "help" => Some(Command::Help),
            "read" => Some(Command::Read),
            "exit" => Some(Command::Exit),
            "post" => {
                let content = line[keyword.len()..].trim().to_string();
                Some(Command::Post(content))
            }
            _ => None,
        }
    }
}

/// Execute a non-terminating command against the message store, returning
/// the response text. `Exit` is handled by the session itself and never
/// reaches here.
pub fn execute(command: &Command, user: &str, messages: &MessageStore, max_read: usize) -> String {
    match command {
        Command::Help => HELP_TEXT.to_string(),

        Command::Post(content) => {
            if content.is_empty() {
                "Usage: post <message>\n".to_string()
            } else {
                messages.append(user, content);
                "Message posted.\n".to_string()
            }
        }

        Command::Read => {
            let recent = messages.recent(max_read);
            if recent.is_empty() {
                "No messages yet.\n".to_string()
            } else {
                let mut out = String::new();
                for msg in &recent {
                    out.push_str(&format!(
                        "[{}] {}: {}\n",
                        msg.timestamp, msg.user, msg.content
                    ));
                }
                out
            }
        }

        Command::Exit => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MessageStore;

    #[test]
    fn test_parse_keywords() {
        assert_eq!(Command::parse("help"), Some(Command::Help));
        assert_eq!(Command::parse("read"), Some(Command::Read));
        assert_eq!(Command::parse("exit"), Some(Command::Exit));
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(Command::parse("HELP"), Some(Command::Help));
        assert_eq!(Command::parse("Exit"), Some(Command::Exit));
        assert_eq!(
            Command::parse("POST hi"),
            Some(Command::Post("hi".to_string()))
        );
    }

    #[test]
    fn test_parse_post_keeps_argument_verbatim() {
        // Only the keyword is case-folded; the payload is untouched.
        assert_eq!(
            Command::parse("post Hello World"),
            Some(Command::Post("Hello World".to_string()))
        );
    }

    #[test]
    fn test_parse_post_trims_argument() {
        assert_eq!(
            Command::parse("post   spaced out  "),
            Some(Command::Post("spaced out".to_string()))
        );
    }

    #[test]
    fn test_parse_empty_post() {
        assert_eq!(Command::parse("post"), Some(Command::Post(String::new())));
        assert_eq!(Command::parse("post   "), Some(Command::Post(String::new())));
    }

    #[test]
    fn test_parse_unmatched() {
        assert_eq!(Command::parse("frobnicate"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("exits"), None);
    }

    #[test]
    fn test_help_is_idempotent() {
        let store = MessageStore::new(100, None);
        let first = execute(&Command::Help, "alice", &store, 30);
        for _ in 0..5 {
            assert_eq!(execute(&Command::Help, "alice", &store, 30), first);
        }
    }

    #[test]
    fn test_post_then_read_round_trip() {
        let store = MessageStore::new(100, None);
        let response = execute(
            &Command::Post("hello world".to_string()),
            "alice",
            &store,
            30,
        );
        assert_eq!(response, "Message posted.\n");

        let listing = execute(&Command::Read, "alice", &store, 30);
        assert!(listing.contains("alice: hello world"));
    }

    #[test]
    fn test_read_renders_newest_last() {
        let store = MessageStore::new(100, None);
        execute(&Command::Post("first".to_string()), "a", &store, 30);
        execute(&Command::Post("second".to_string()), "b", &store, 30);

        let listing = execute(&Command::Read, "a", &store, 30);
        let first_pos = listing.find("first").unwrap();
        let second_pos = listing.find("second").unwrap();
        assert!(first_pos < second_pos);
    }

    #[test]
    fn test_empty_post_rejected() {
        let store = MessageStore::new(100, None);
        let response = execute(&Command::Post(String::new()), "alice", &store, 30);
        assert_eq!(response, "Usage: post <message>\n");
        assert!(store.recent(10).is_empty());
    }

    #[test]
    fn test_read_empty_store() {
        let store = MessageStore::new(100, None);
        assert_eq!(execute(&Command::Read, "alice", &store, 30), "No messages yet.\n");
    }
}
