//! Line framing for the telnet-style wire protocol.
//!
//! Splits a raw byte stream into logical command lines while stripping
//! embedded telnet negotiation sequences (IAC + command + option). The
//! negotiation sub-protocol is never interpreted, only discarded.

/// Telnet "Interpret As Command" escape byte.
const IAC: u8 = 255;

/// Scanner state carried across reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ScanState {
    /// Plain text bytes.
    #[default]
    Ground,
    /// Inside a negotiation sequence; this many bytes remain to discard.
    Skip(u8),
}

/// Stateful byte-stream scanner producing terminator-free command lines.
///
/// A logical line may span multiple reads and one read may contain several
/// lines, so both the accumulation buffer and the negotiation-skip state
/// persist between calls to [`LineFramer::push`]. Negotiation sequences
/// split across a chunk boundary are therefore still stripped correctly.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    state: ScanState,
}

impl LineFramer {
    /// Create a framer with empty state.
    pub fn new() -> Self {
        LineFramer::default()
    }

    /// Feed one chunk of raw bytes, returning every complete line it closes.
    ///
    /// Lines are emitted without their terminators. An empty line (bare
    /// `\n` or `\r\n`) is a valid emission; callers decide whether to skip
    /// it. Trailing bytes without a terminator stay buffered and are never
    /// emitted on their own.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            match self.state {
                ScanState::Skip(remaining) => {
                    self.state = if remaining > 1 {
                        ScanState::Skip(remaining - 1)
                    } else {
                        ScanState::Ground
                    };
                }
                ScanState::Ground => match byte {
                    IAC => self.state = ScanState::Skip(2),
                    b'\r' => {}
                    b'\n' => {
                        let line = String::from_utf8_lossy(&self.buffer).into_owned();
                        self.buffer.clear();
                        lines.push(line);
                    }
                    other => self.buffer.push(other),
                },
            }
        }

        lines
    }
}
