//! Line-oriented user input.
//!
//! Input is read from any [`BufRead`], one turn at a time, according to an [`InputMode`] chosen
//! once at startup.

use std::io::{self, BufRead};

use tracing::trace;

/// Line that ends a multi-line input.
pub const END_SENTINEL: &str = "//end";

/// Input that ends the session.
pub const QUIT_SENTINEL: &str = "quit";

/// How a turn's input is collected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    /// A single line is one turn.
    #[default]
    SingleLine,
    /// Lines are collected until [`END_SENTINEL`].
    MultiLine,
}

impl InputMode {
    /// Selects the mode from the answer to the startup question.
    ///
    /// `1` selects multi-line input, anything else single-line.
    pub fn select(answer: &str) -> Self {
        if answer.trim() == "1" {
            InputMode::MultiLine
        } else {
            InputMode::SingleLine
        }
    }
}

/// One turn's worth of user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Nothing but a line terminator, skipped without contacting the API.
    Empty,
    /// The user asked to leave.
    Quit,
    /// Standard input is exhausted.
    Eof,
    /// Text to send, line terminators included.
    Text(String),
}

impl Input {
    /// Classifies raw input as read from the terminal.
    pub fn classify(raw: String) -> Self {
        let content = strip_line_terminator(&raw);
        if content.is_empty() {
            Input::Empty
        } else if content == QUIT_SENTINEL {
            Input::Quit
        } else {
            Input::Text(raw)
        }
    }
}

/// Strips a single trailing `\n` or `\r\n`.
fn strip_line_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .unwrap_or(line)
}

/// Reads the answer to the mode question.
///
/// End of input selects the default mode.
pub fn read_mode<R: BufRead>(reader: &mut R) -> io::Result<InputMode> {
    let mut answer = String::new();
    reader.read_line(&mut answer)?;
    Ok(InputMode::select(&answer))
}

/// Reads one turn's input.
///
/// In multi-line mode, input cut off by the end of the stream is still returned if any lines were
/// collected; the next call then reports [`Input::Eof`].
pub fn read_input<R: BufRead>(reader: &mut R, mode: InputMode) -> io::Result<Input> {
    match mode {
        InputMode::SingleLine => {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Ok(Input::Eof);
            }
            Ok(Input::classify(line))
        }
        InputMode::MultiLine => {
            let mut buffer = String::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line)? == 0 {
                    if buffer.is_empty() {
                        return Ok(Input::Eof);
                    }
                    break;
                }

                if strip_line_terminator(&line) == END_SENTINEL {
                    break;
                }
                trace!(len = line.len(), "collected input line");
                buffer.push_str(&line);
            }
            Ok(Input::classify(buffer))
        }
    }
}
