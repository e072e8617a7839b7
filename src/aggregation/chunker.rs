//! Splits oversized date ranges into contiguous, non-overlapping chunks.

use crate::config::ChunkingConfig;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Inclusive sub-range of a requested range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateChunk {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateChunk {
    /// Days covered, counting both ends
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DateRangeChunker {
    threshold_days: i64,
    chunk_days: i64,
}

impl DateRangeChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            threshold_days: config.threshold_days,
            chunk_days: config.chunk_days.max(1),
        }
    }

    /// Ranges whose `end - start` exceeds the threshold are chunked
    pub fn needs_chunking(&self, start: NaiveDate, end: NaiveDate) -> bool {
        (end - start).num_days() > self.threshold_days
    }

    /// Chunks for a range, or the range itself when it is small enough
    pub fn chunks_for(&self, start: NaiveDate, end: NaiveDate) -> Vec<DateChunk> {
        if self.needs_chunking(start, end) {
            Self::split(start, end, self.chunk_days)
        } else {
            vec![DateChunk { start, end }]
        }
    }

    /// Ordered chunks of `chunk_days` days covering `[start, end]` exactly
    ///
    /// The last chunk is clamped to `end` and may be shorter.
    pub fn split(start: NaiveDate, end: NaiveDate, chunk_days: i64) -> Vec<DateChunk> {
        if end < start {
            return Vec::new();
        }

        let step = Duration::days(chunk_days.max(1));
        let mut chunks = Vec::new();
        let mut cursor = start;

        while cursor <= end {
            let chunk_end = (cursor + step - Duration::days(1)).min(end);
            chunks.push(DateChunk {
                start: cursor,
                end: chunk_end,
            });
            cursor = chunk_end + Duration::days(1);
        }

        chunks
    }
}
