//! Bounded output buffer
//!
//! Keeps the most recent output of an agent so the UI and the status
//! classifier can look at what it has been doing lately. Capacity is counted
//! in characters, and overflow always drops the oldest text.

use super::tail_chars;

/// A fixed-capacity text buffer that discards from the front
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    data: String,
    /// Maximum capacity in characters
    capacity: usize,
    /// Characters currently held, cached to avoid rescanning `data`
    chars: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: String::new(),
            capacity,
            chars: 0,
        }
    }

    /// Append a chunk, dropping the oldest characters past capacity.
    pub fn write(&mut self, chunk: &str) {
        let added = chunk.chars().count();
        self.data.push_str(chunk);
        self.chars += added;

        if self.chars > self.capacity {
            let overflow = self.chars - self.capacity;
            let cut = self
                .data
                .char_indices()
                .nth(overflow)
                .map(|(idx, _)| idx)
                .unwrap_or(self.data.len());
            self.data.drain(..cut);
            self.chars = self.capacity;
        }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// The last `n` characters held
    pub fn tail(&self, n: usize) -> &str {
        tail_chars(&self.data, n)
    }

    /// Number of characters currently stored
    pub fn len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }
}
