//! Line framing for the incoming byte stream.

use log::warn;

/// Accumulates bytes and yields complete `\n`-terminated lines.  A partial
/// line is carried over to the next push.  A line that grows past
/// `max_line_length` is dropped up to and including its terminator.
pub struct LineBuffer {
    buffer: Vec<u8>,
    max_line_length: usize,
    discarding: bool,
}

impl LineBuffer {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            max_line_length: max_line_length.max(1),
            discarding: false,
        }
    }

    /// Feed `data`, returning the lines it completed in arrival order.
    /// Terminators are stripped; `\r` is left for the decoder to trim.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &byte in data {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else {
                    lines.push(std::mem::take(&mut self.buffer));
                }
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.buffer.len() >= self.max_line_length {
                warn!(
                    "Discarding line longer than {} bytes",
                    self.max_line_length
                );
                self.buffer.clear();
                self.discarding = true;
                continue;
            }
            self.buffer.push(byte);
        }
        lines
    }

    /// Bytes of the unfinished line.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}
