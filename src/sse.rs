//! Server-sent event framing.
//!
//! [`EventScanner`] finds the end of an event in a byte stream that may arrive in arbitrary
//! pieces. [`parse_event`] turns a complete event into its joined `data:` payload.

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScanState {
    /// At the start of a line, nothing consumed yet.
    LineStart,
    /// Inside a non-empty line.
    InLine,
    /// A `\r` ended a non-empty line; a following `\n` belongs to it.
    CrInLine,
    /// A `\r` at the start of a line, i.e. a blank line. A following `\n` belongs to it.
    CrAtLineStart,
}

#[derive(Debug, PartialEq)]
pub enum ScanResult {
    NeedsMore,
    Found(usize), // Split point in the input slice
}

/// Incremental scanner for event boundaries.
///
/// An event ends with a blank line; lines end with `\n`, `\r\n` or `\r`. The scanner keeps its
/// state between calls, so each call must be passed only bytes not seen before.
#[derive(Debug)]
pub struct EventScanner {
    state: ScanState,
}

impl Default for EventScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl EventScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::LineStart,
        }
    }

    pub fn scan(&mut self, input: &[u8]) -> ScanResult {
        for (i, &byte) in input.iter().enumerate() {
            match self.state {
                ScanState::LineStart => match byte {
                    b'\n' => {
                        self.reset();
                        return ScanResult::Found(i + 1);
                    }
                    b'\r' => self.state = ScanState::CrAtLineStart,
                    _ => self.state = ScanState::InLine,
                },

                ScanState::InLine => match byte {
                    b'\n' => self.state = ScanState::LineStart,
                    b'\r' => self.state = ScanState::CrInLine,
                    _ => {}
                },

                ScanState::CrInLine => match byte {
                    b'\n' => self.state = ScanState::LineStart,
                    b'\r' => self.state = ScanState::CrAtLineStart,
                    _ => self.state = ScanState::InLine,
                },

                ScanState::CrAtLineStart => {
                    self.reset();
                    // A lone `\r` already ended the event, the current byte starts the next one.
                    return if byte == b'\n' {
                        ScanResult::Found(i + 1)
                    } else {
                        ScanResult::Found(i)
                    };
                }
            }
        }

        ScanResult::NeedsMore
    }

    /// Whether the last byte seen was in the middle of a line.
    pub fn mid_line(&self) -> bool {
        self.state == ScanState::InLine
    }

    fn reset(&mut self) {
        self.state = ScanState::LineStart;
    }
}

/// Extracts the data payload of a complete event.
///
/// All `data:` fields are joined with `\n`, a single leading space after the colon is stripped.
/// Returns `None` for events without data, such as comments used as keep-alives.
pub fn parse_event(event: &str) -> Option<String> {
    let mut data: Option<String> = None;

    // Blank lines produced by `\r\n` splitting carry no field.
    for line in event.split(['\r', '\n']) {
        let value = if let Some(value) = line.strip_prefix("data:") {
            value.strip_prefix(' ').unwrap_or(value)
        } else if line == "data" {
            ""
        } else {
            continue;
        };

        match data {
            Some(ref mut data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => data = Some(value.to_owned()),
        }
    }

    data
}

/// Returns the non-blank lines of an event that are neither comments nor known fields.
///
/// A body that is not an event stream at all, such as an HTML error page or a bare JSON error
/// object, shows up entirely as such lines.
pub fn unrecognized_lines(event: &str) -> impl Iterator<Item = &str> {
    event.split(['\r', '\n']).filter(|line| {
        if line.trim().is_empty() || line.starts_with(':') {
            return false;
        }
        let field = line.split_once(':').map_or(*line, |(field, _)| field);
        !matches!(field, "data" | "event" | "id" | "retry")
    })
}
