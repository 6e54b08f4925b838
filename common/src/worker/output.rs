// Incremental decoder for the envelopes job scripts write to stderr

use crate::models::WorkerOutput;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Envelope {
    numerator: i64,
    denominator: i64,
    warning: bool,
    data: Option<String>,
    debug: Option<String>,
}

impl Envelope {
    fn push_events(self, events: &mut Vec<WorkerOutput>) {
        if let Some(text) = self.debug.filter(|d| !d.is_empty()) {
            events.push(WorkerOutput::Debug(text));
            return;
        }
        if let Some(data) = self.data {
            events.push(WorkerOutput::Data {
                data,
                warning: self.warning,
            });
        }
        if self.numerator != 0 || self.denominator != 0 {
            events.push(WorkerOutput::Status {
                numerator: self.numerator,
                denominator: self.denominator,
            });
        }
    }
}

/// Largest envelope held back while waiting for its closing brace; past
/// this the pending bytes are flushed as a warning
pub const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

/// Turns a chunked stream of concatenated JSON envelopes into events
///
/// Envelopes carry no delimiter, so a chunk may end in the middle of one;
/// the tail is buffered until the next chunk completes it. Bytes are scanned
/// once for object boundaries and each envelope is parsed only when its
/// closing brace arrives. Anything that is not a valid envelope is surfaced
/// once as a warning with the raw text.
#[derive(Debug, Default)]
pub struct OutputDecoder {
    buf: Vec<u8>,
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl OutputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk and collect every envelope it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<WorkerOutput> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        let mut pos = self.scanned;

        while pos < self.buf.len() {
            let byte = self.buf[pos];
            pos += 1;

            if self.depth == 0 {
                match byte {
                    b'{' => self.depth = 1,
                    b if b.is_ascii_whitespace() => consumed = pos,
                    _ => {
                        self.flush_invalid(consumed, &mut events);
                        return events;
                    }
                }
                continue;
            }

            if self.in_string {
                match byte {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        match serde_json::from_slice::<Envelope>(&self.buf[consumed..pos]) {
                            Ok(envelope) => envelope.push_events(&mut events),
                            Err(_) => {
                                self.flush_invalid(consumed, &mut events);
                                return events;
                            }
                        }
                        consumed = pos;
                    }
                }
                _ => {}
            }
        }

        self.buf.drain(..consumed);
        self.scanned = self.buf.len();

        if self.buf.len() > MAX_PENDING_BYTES {
            self.flush_invalid(0, &mut events);
        }
        events
    }

    /// Surface everything from `from` onward as one warning and start over
    fn flush_invalid(&mut self, from: usize, events: &mut Vec<WorkerOutput>) {
        if let Some(raw) = raw_text(&self.buf[from..]) {
            events.push(WorkerOutput::Data {
                data: raw,
                warning: true,
            });
        }
        *self = Self::default();
    }

    /// Flush whatever is left once the stream has ended
    pub fn finish(self) -> Option<WorkerOutput> {
        raw_text(&self.buf).map(|data| WorkerOutput::Data {
            data,
            warning: true,
        })
    }

    /// Bytes held back waiting for the rest of an envelope
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn raw_text(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
