//! Chunks and Objects
//!
//! An [`Object`] is one trace request plus the erasure-coded layout derived
//! from it. Each of its data and parity fragments is stored as a [`Chunk`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::trace::Record;

/// One stored fragment of an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk key (`"{index}@{object key}"`)
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Access frequency
    pub freq: u64,
    /// Times the chunk was re-placed after a miss
    pub reset: u64,
}

impl Chunk {
    /// Create a fresh chunk that has been accessed once
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            freq: 1,
            reset: 0,
        }
    }

    /// Copy of this chunk with one more access recorded
    pub fn accessed(&self) -> Self {
        Self {
            freq: self.freq + 1,
            ..self.clone()
        }
    }

    /// Copy of this chunk after being re-placed
    pub fn replaced(&self) -> Self {
        Self {
            reset: self.reset + 1,
            ..self.clone()
        }
    }
}

/// A logical request unit
#[derive(Debug, Clone)]
pub struct Object {
    /// The trace record this object was built from
    pub record: Record,
    /// Number of data chunks
    pub data_chunks: usize,
    /// Number of parity chunks
    pub parity_chunks: usize,
    /// Size of each chunk
    pub chunk_size: u64,
    /// Estimated transfer time of the whole object
    pub estimation: Duration,
}

impl Object {
    /// Build the chunk layout for a record
    pub fn new(record: Record, data_chunks: usize, parity_chunks: usize) -> Self {
        let data_chunks = data_chunks.max(1);
        let chunk_size = record.size.div_ceil(data_chunks as u64);
        Self {
            record,
            data_chunks,
            parity_chunks,
            chunk_size,
            estimation: Duration::ZERO,
        }
    }

    /// Estimate transfer time against a bandwidth in bytes/second (0 = unknown)
    pub fn with_bandwidth(mut self, bandwidth: u64) -> Self {
        if bandwidth > 0 {
            self.estimation = Duration::from_secs_f64(self.record.size as f64 / bandwidth as f64);
        }
        self
    }

    /// Object key
    #[inline]
    pub fn key(&self) -> &str {
        &self.record.key
    }

    /// Object size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.record.size
    }

    /// Request timestamp in nanoseconds
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.record.timestamp
    }

    /// Data plus parity chunk count
    pub fn total_chunks(&self) -> usize {
        self.data_chunks + self.parity_chunks
    }

    /// True if the underlying record could not be parsed
    pub fn is_skippable(&self) -> bool {
        self.record.is_skippable()
    }

    /// Key of the chunk at `index`
    pub fn chunk_key(&self, index: usize) -> String {
        format!("{}@{}", index, self.record.key)
    }

    /// Chunk stored at `index`
    pub fn chunk(&self, index: usize) -> Chunk {
        Chunk::new(self.chunk_key(index), self.chunk_size)
    }
}
