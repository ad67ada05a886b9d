//! Server-Sent Events (SSE) framing for streamed chat completions.
//!
//! [`SseParser`] is an incremental `text/event-stream` parser fed with text of arbitrary chunk
//! boundaries. [`SseReader`] drives it from any blocking byte source (the streamed HTTP body),
//! carrying split UTF-8 sequences across reads.

use std::collections::VecDeque;
use std::io::{self, Read};

/// Payload of the terminal sentinel event (`data: [DONE]`).
pub const DONE_SENTINEL: &str = "[DONE]";

const READ_CHUNK: usize = 8 * 1024;

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// Event type from the `event:` field; empty means the default `message` type.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }
}

/// Incremental SSE parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    current: SseEvent,
    has_data: bool,
    bom_checked: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.current.event = value.to_string(),
            "data" => {
                self.current.data.push_str(value);
                self.current.data.push('\n');
                self.has_data = true;
            }
            "id" if !value.contains('\0') => self.current.id = Some(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if !self.has_data {
            self.current = SseEvent::default();
            return None;
        }
        self.has_data = false;
        let mut event = std::mem::take(&mut self.current);
        if event.data.ends_with('\n') {
            event.data.pop();
        }
        Some(event)
    }

    /// Feed text and return every event completed by it.
    pub fn feed(&mut self, data: &str) -> Vec<SseEvent> {
        self.buffer.push_str(data);
        let mut buffer = std::mem::take(&mut self.buffer);

        if !self.bom_checked && !buffer.is_empty() {
            self.bom_checked = true;
            if let Some(rest) = buffer.strip_prefix('\u{FEFF}') {
                buffer = rest.to_string();
            }
        }

        let mut events = Vec::new();
        let mut start = 0usize;
        let bytes = buffer.as_bytes();
        while let Some(rel) = memchr::memchr2(b'\r', b'\n', &bytes[start..]) {
            let pos = start + rel;
            let next = match bytes[pos] {
                b'\n' => pos + 1,
                // A trailing CR may be the first half of a CRLF split across chunks.
                _ if pos + 1 == bytes.len() => break,
                _ if bytes[pos + 1] == b'\n' => pos + 2,
                _ => pos + 1,
            };
            let line = &buffer[start..pos];
            start = next;
            if line.is_empty() {
                events.extend(self.dispatch());
            } else {
                self.apply_line(line);
            }
        }

        buffer.drain(..start);
        self.buffer = buffer;
        events
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || self.has_data
    }

    /// Complete the event in progress when the stream ends without a blank line.
    pub fn flush(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim_end_matches('\r');
        if !rest.is_empty() {
            self.apply_line(rest);
        }
        self.dispatch()
    }
}

/// Blocking iterator of SSE events over a byte source.
pub struct SseReader<R> {
    inner: R,
    parser: SseParser,
    pending: VecDeque<SseEvent>,
    utf8_tail: Vec<u8>,
    finished: bool,
}

impl<R: Read> SseReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            utf8_tail: Vec::new(),
            finished: false,
        }
    }

    /// Feed one chunk, holding back an incomplete trailing UTF-8 sequence.
    fn process_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.utf8_tail.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.utf8_tail);
        match std::str::from_utf8(&bytes) {
            Ok(text) => {
                self.pending.extend(self.parser.feed(text));
                Ok(())
            }
            Err(err) => {
                let valid = err.valid_up_to();
                if let Ok(text) = std::str::from_utf8(&bytes[..valid]) {
                    self.pending.extend(self.parser.feed(text));
                }
                if let Some(invalid) = err.error_len() {
                    self.utf8_tail = bytes[valid + invalid..].to_vec();
                    return Err(io::Error::new(io::ErrorKind::InvalidData, err));
                }
                self.utf8_tail = bytes[valid..].to_vec();
                Ok(())
            }
        }
    }

    fn finish(&mut self) -> Option<io::Result<SseEvent>> {
        self.finished = true;
        if !self.utf8_tail.is_empty() {
            self.utf8_tail.clear();
            return Some(Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Stream ended with incomplete UTF-8 sequence",
            )));
        }
        self.parser.flush().map(Ok)
    }
}

impl<R: Read> Iterator for SseReader<R> {
    type Item = io::Result<SseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }
            match self.inner.read(&mut chunk) {
                Ok(0) => return self.finish(),
                Ok(n) => {
                    if let Err(err) = self.process_chunk(&chunk[..n]) {
                        return Some(Err(err));
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
