//! Progress and throughput accounting.
//!
//! Grounded on the teacher's bare `record_count` counter in `parser.rs`,
//! generalized to the full set of counters the converter's progress
//! reporting needs: bytes/chunks/records in and out, per-stage timing, and
//! buffer high-water marks.

use std::time::Duration;

/// A point-in-time snapshot handed back by `Converter::stats()`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub chunks_in: u64,
    pub records_processed: u64,
    pub records_filtered: u64,
    pub parse_time_ms: f64,
    pub transform_time_ms: f64,
    pub write_time_ms: f64,
    pub max_buffer_size: usize,
    pub current_partial_size: usize,
}

impl Stats {
    /// Throughput in MiB/s over the total wall time spent in parse + transform
    /// + write. Zero when no time has elapsed yet (avoids a divide-by-zero at
    /// the very first chunk).
    pub fn throughput_mb_per_sec(&self) -> f64 {
        let total_ms = self.parse_time_ms + self.transform_time_ms + self.write_time_ms;
        if total_ms <= 0.0 {
            return 0.0;
        }
        let mb = self.bytes_in as f64 / (1024.0 * 1024.0);
        mb / (total_ms / 1000.0)
    }
}

/// Mutable accumulator the converter updates as it runs; `snapshot()` yields
/// the public, immutable [`Stats`] view.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    enabled: bool,
    inner: Stats,
}

impl StatsAccumulator {
    pub fn new(enabled: bool) -> Self {
        StatsAccumulator {
            enabled,
            inner: Stats::default(),
        }
    }

    pub fn record_chunk_in(&mut self, bytes: usize) {
        if !self.enabled {
            return;
        }
        self.inner.bytes_in += bytes as u64;
        self.inner.chunks_in += 1;
    }

    pub fn record_bytes_out(&mut self, bytes: usize) {
        if !self.enabled {
            return;
        }
        self.inner.bytes_out += bytes as u64;
    }

    pub fn record_parsed(&mut self, count: u64) {
        if !self.enabled {
            return;
        }
        self.inner.records_processed += count;
    }

    pub fn record_filtered(&mut self, count: u64) {
        if !self.enabled {
            return;
        }
        self.inner.records_filtered += count;
    }

    pub fn add_parse_time(&mut self, d: Duration) {
        if !self.enabled {
            return;
        }
        self.inner.parse_time_ms += d.as_secs_f64() * 1000.0;
    }

    pub fn add_transform_time(&mut self, d: Duration) {
        if !self.enabled {
            return;
        }
        self.inner.transform_time_ms += d.as_secs_f64() * 1000.0;
    }

    pub fn add_write_time(&mut self, d: Duration) {
        if !self.enabled {
            return;
        }
        self.inner.write_time_ms += d.as_secs_f64() * 1000.0;
    }

    pub fn observe_buffer_size(&mut self, partial_size: usize) {
        if !self.enabled {
            return;
        }
        self.inner.current_partial_size = partial_size;
        self.inner.max_buffer_size = self.inner.max_buffer_size.max(partial_size);
    }

    pub fn snapshot(&self) -> Stats {
        self.inner
    }
}
