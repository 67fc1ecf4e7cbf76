//! Bounded buffer pool
//!
//! Pre-allocates a fixed number of `BytesMut` buffers of a fixed capacity.
//! The pool never grows: when every buffer is checked out, `acquire` waits
//! until one is released. This is the daemon's backpressure valve - reads
//! stall when the writer falls behind instead of allocating without bound.
//!
//! # Example
//!
//! ```ignore
//! let pool = BufferPool::new(64, 4096); // 64 buffers, 4KB each
//!
//! // Connection handler - may wait under pressure
//! let mut buf = pool.acquire().await?;
//! stream.read_buf(&mut buf).await?;
//!
//! // Writer - after the bytes hit the file
//! pool.release(buf);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use tokio::sync::Semaphore;

use crate::error::BufferPoolError;

/// Fixed-size pool of reusable `BytesMut` buffers
///
/// Buffers live in a lock-free queue; a semaphore holds one permit per
/// buffer sitting in the queue. A permit is consumed before a pop and added
/// back after a push, so a successful permit acquisition always finds a
/// buffer and a buffer is never handed to two owners.
pub struct BufferPool {
    /// Buffers currently available
    queue: ArrayQueue<BytesMut>,

    /// One permit per buffer in `queue`
    available: Semaphore,

    /// Capacity of each buffer
    buffer_capacity: usize,

    /// Metrics
    metrics: BufferPoolMetrics,
}

/// Metrics for buffer pool monitoring
#[derive(Debug, Default)]
pub struct BufferPoolMetrics {
    /// Buffers handed out
    pub acquires: AtomicU64,

    /// Acquires that had to wait for a release
    pub waits: AtomicU64,

    /// Buffers returned to the pool
    pub releases: AtomicU64,

    /// Buffers replaced because their capacity shrank
    pub replacements: AtomicU64,

    /// Surplus buffers dropped (pool already full)
    pub drops: AtomicU64,
}

impl BufferPoolMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            acquires: AtomicU64::new(0),
            waits: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            replacements: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record_acquire(&self) {
        self.acquires.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_replacement(&self) {
        self.replacements.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_drop(&self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            acquires: self.acquires.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of buffer pool metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    pub acquires: u64,
    pub waits: u64,
    pub releases: u64,
    pub replacements: u64,
    pub drops: u64,
}

impl PoolMetricsSnapshot {
    /// Fraction of acquires that had to wait (0.0 to 1.0)
    pub fn wait_rate(&self) -> f64 {
        if self.acquires == 0 {
            0.0
        } else {
            self.waits as f64 / self.acquires as f64
        }
    }
}

impl BufferPool {
    /// Create a pool holding `pool_size` buffers of `buffer_capacity` bytes
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is zero (an empty pool would block forever).
    /// Configuration validation rejects that value before it gets here.
    pub fn new(pool_size: usize, buffer_capacity: usize) -> Self {
        assert!(pool_size > 0, "buffer pool needs at least one buffer");

        let queue = ArrayQueue::new(pool_size);
        for _ in 0..pool_size {
            // Cannot fail: the queue was created with exactly this capacity
            let _ = queue.push(BytesMut::with_capacity(buffer_capacity));
        }

        Self {
            queue,
            available: Semaphore::new(pool_size),
            buffer_capacity,
            metrics: BufferPoolMetrics::new(),
        }
    }

    /// Take a buffer out of the pool, waiting until one is available
    ///
    /// The returned buffer is empty with at least `buffer_capacity` bytes of
    /// spare capacity.
    pub async fn acquire(&self) -> Result<BytesMut, BufferPoolError> {
        let permit = match self.available.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                self.metrics.record_wait();
                tracing::trace!(
                    in_flight = self.in_flight(),
                    "buffer pool exhausted, waiting for release"
                );
                self.available
                    .acquire()
                    .await
                    .map_err(|_| BufferPoolError::Closed)?
            }
        };
        permit.forget();
        self.pop()
    }

    fn pop(&self) -> Result<BytesMut, BufferPoolError> {
        let buf = self.queue.pop().ok_or(BufferPoolError::Inconsistent)?;
        self.metrics.record_acquire();
        Ok(buf)
    }

    /// Return a buffer to the pool
    ///
    /// The buffer is cleared; its previous contents are irrelevant. A buffer
    /// whose capacity fell below `buffer_capacity` is swapped for a fresh
    /// allocation so the pool keeps its full size. If the pool is already
    /// full the buffer did not come from it and is dropped.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        if buf.capacity() < self.buffer_capacity {
            self.metrics.record_replacement();
            buf = BytesMut::with_capacity(self.buffer_capacity);
        }

        match self.queue.push(buf) {
            Ok(()) => {
                self.metrics.record_release();
                self.available.add_permits(1);
            }
            Err(_) => {
                self.metrics.record_drop();
                tracing::debug!("buffer pool full, dropping surplus buffer");
            }
        }
    }

    /// Number of buffers currently available
    #[inline]
    pub fn available(&self) -> usize {
        self.available.available_permits()
    }

    /// Number of buffers currently checked out
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.capacity().saturating_sub(self.available())
    }

    /// Total number of buffers owned by the pool
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Capacity of each buffer in bytes
    #[inline]
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Get reference to metrics
    #[inline]
    pub fn metrics(&self) -> &BufferPoolMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("buffer_capacity", &self.buffer_capacity)
            .finish()
    }
}

#[cfg(test)]
#[path = "buffer_pool_test.rs"]
mod buffer_pool_test;
