//! Process-wide pool of fixed-size byte buffers for enumeration batches.
//!
//! Directory enumeration pulls records from the facade in buffer-sized
//! batches. Buffers are recycled through a bounded free list so steady-state
//! enumeration performs no allocation; when the pool is exhausted new buffers
//! are allocated, and when it is full returned buffers are dropped instead.

use std::ops::{Deref, DerefMut};
use std::sync::LazyLock;

use crossbeam_queue::ArrayQueue;

/// Size of each pooled buffer. 64 KiB is the largest batch the directory
/// enumeration system calls are observed to fill.
pub const BYTES_PER_BUFFER: usize = 64 * 1024;

/// Maximum number of buffers retained by the pool once freed.
const POOL_CAPACITY: usize = 64;

static BUFFER_POOL: LazyLock<ArrayQueue<Box<[u8]>>> =
    LazyLock::new(|| ArrayQueue::new(POOL_CAPACITY));

/// Heap-allocated fixed-size byte buffer borrowed from the process-wide pool
/// and returned to it on drop.
pub struct PooledBuffer(Option<Box<[u8]>>);

impl PooledBuffer {
    /// Takes a buffer from the pool, allocating a fresh zeroed one when the
    /// pool is empty.
    pub fn acquire() -> Self {
        let storage = BUFFER_POOL
            .pop()
            .unwrap_or_else(|| vec![0u8; BYTES_PER_BUFFER].into_boxed_slice());
        Self(Some(storage))
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        BYTES_PER_BUFFER
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(storage) = self.0.take() {
            // A full pool drops the buffer on the floor.
            let _ = BUFFER_POOL.push(storage);
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.0.as_ref().expect("buffer present until drop")
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut().expect("buffer present until drop")
    }
}
