//! Streamed reply consumption.
//!
//! A [`FragmentStream`] wraps the body of a streaming completion response and yields the text
//! fragments of the reply as they arrive, blocking on the underlying reader in between.

use std::io::{self, Read};

use tracing::{debug, trace, warn};

use crate::{
    Error, openai,
    sse::{self, EventScanner, ScanResult},
};

/// Number of bytes requested from the reader per read.
const READ_SIZE: usize = 8 * 1024;

/// A lazy, finite sequence of reply fragments.
///
/// Ends with `None` once the end marker was received. An error ends the sequence as well; after
/// either, the stream yields `None` forever and the reader is never touched again. The reader
/// (usually the HTTP response, and with it the connection) is released when the stream is dropped.
#[derive(Debug)]
pub struct FragmentStream<R> {
    reader: R,
    scanner: EventScanner,
    /// Bytes received but not yet consumed as a complete event.
    buffer: Vec<u8>,
    /// Prefix of `buffer` already fed to `scanner`.
    scanned: usize,
    /// Whether any event carried data.
    seen_data: bool,
    /// Lines that are not part of an event stream, kept to report what the server sent instead.
    unrecognized: String,
    finished: bool,
}

impl<R: Read> FragmentStream<R> {
    /// Creates a new stream reading server-sent events from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            scanner: EventScanner::new(),
            buffer: Vec::new(),
            scanned: 0,
            seen_data: false,
            unrecognized: String::new(),
            finished: false,
        }
    }

    /// Whether the stream has ended, either cleanly or through an error.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Splits the next complete event off the buffer, if there is one.
    fn next_event(&mut self) -> Option<Vec<u8>> {
        match self.scanner.scan(&self.buffer[self.scanned..]) {
            ScanResult::Found(end) => {
                let event = self.buffer.drain(..self.scanned + end).collect();
                self.scanned = 0;
                Some(event)
            }
            ScanResult::NeedsMore => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    /// Reads until the next fragment or the end of the reply.
    fn advance(&mut self) -> Result<Option<String>, Error> {
        loop {
            while let Some(event) = self.next_event() {
                let event = String::from_utf8_lossy(&event);
                let Some(data) = sse::parse_event(&event) else {
                    trace!("ignoring event without data");
                    self.keep_unrecognized(&event);
                    continue;
                };
                self.seen_data = true;

                if data == openai::DONE_MARKER {
                    debug!("reply stream finished");
                    return Ok(None);
                }

                if let Some(fragment) = openai::deserialize_chunk(&data)?.fragment() {
                    trace!(len = fragment.len(), "received fragment");
                    return Ok(Some(fragment.to_owned()));
                }
            }

            let mut chunk = [0; READ_SIZE];
            let read = match self.reader.read(&mut chunk) {
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };

            if read == 0 {
                return self.finish_at_eof();
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Handles the connection closing before an end marker was seen.
    ///
    /// Trailing complete lines are handled as a final event; a data line cut short is an error. A
    /// body that never carried any data is reported as an error as well, decoded as an error
    /// envelope where possible.
    fn finish_at_eof(&mut self) -> Result<Option<String>, Error> {
        self.finished = true;

        let rest = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();

        let data = sse::parse_event(&rest);
        let cut_short = self.scanner.mid_line() && !rest.trim().is_empty();
        if cut_short && (self.seen_data || data.is_some()) {
            return Err(Error::UnexpectedEof);
        }

        match data {
            Some(data) => {
                self.seen_data = true;
                if data == openai::DONE_MARKER {
                    return Ok(None);
                }
                let chunk = openai::deserialize_chunk(&data)?;
                return Ok(chunk.fragment().map(str::to_owned));
            }
            None => self.keep_unrecognized(&rest),
        }

        if self.unrecognized.is_empty() {
            warn!("reply stream closed without end marker");
            return Ok(None);
        }

        let body = std::mem::take(&mut self.unrecognized);
        if self.seen_data {
            warn!(len = body.len(), "ignoring trailing non-event text");
            return Ok(None);
        }

        debug!(len = body.len(), "response body is not an event stream");
        Err(match openai::deserialize_error(&body) {
            Some(error) => Error::Api(error),
            None => Error::InvalidStream(body),
        })
    }

    fn keep_unrecognized(&mut self, event: &str) {
        for line in sse::unrecognized_lines(event) {
            if !self.unrecognized.is_empty() {
                self.unrecognized.push('\n');
            }
            self.unrecognized.push_str(line);
        }
    }
}

impl<R: Read> Iterator for FragmentStream<R> {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.advance() {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
