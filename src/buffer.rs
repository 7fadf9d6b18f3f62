//! Append-only byte staging with a read cursor, as specified in "Byte
//! buffer": `append`, `advance`, `compact`, indexed exclusively via the
//! cursor so parsers never see bytes they have already consumed.
//!
//! Grounded on the teacher's `input_buffer: Vec<u8>` carried across
//! `process_bytes_flat` calls, generalized from an implicit
//! `input_buffer.drain(..input_pos)` per call into an explicit cursor with a
//! threshold-triggered compaction so the drain cost is amortized.

/// Fraction of the buffer that must be consumed (relative to its current
/// length) before `maybe_compact` actually drains it. Keeps `compact` from
/// being a per-push O(n) copy when the partial tail is tiny.
const COMPACT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
    cursor: usize,
    max_seen_partial: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    /// The unconsumed tail: exactly the bytes a resumed parse needs.
    pub fn pending(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    /// Never rewinds; `n` must not exceed `pending().len()`.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.cursor + n <= self.data.len());
        self.cursor = (self.cursor + n).min(self.data.len());
        self.max_seen_partial = self.max_seen_partial.max(self.current_partial_size());
    }

    pub fn current_partial_size(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn max_partial_size_seen(&self) -> usize {
        self.max_seen_partial
    }

    /// Reclaim consumed bytes once the cursor has eaten a meaningful
    /// fraction of the buffer. Logical offsets relative to the cursor are
    /// unaffected by design: callers only ever index via `pending()`.
    pub fn maybe_compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        if self.cursor as f64 >= self.data.len() as f64 * COMPACT_THRESHOLD || self.cursor == self.data.len()
        {
            self.data.drain(..self.cursor);
            self.cursor = 0;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }
}
