//! # Buffer Pool
//!
//! The stream allocator used by packet processors. Serialization buffers are
//! handed out from a pre-allocated pool so the hot write/read path does not hit
//! the global allocator once the pool is warm.
//!
//! A `BufferPool` is a cheap handle: clones share the same underlying pool. A
//! transport keeps one as its primary allocator, and context mappings may carry
//! a different one per remote peer (for example an isolated pool per connection).
//!
//! ## Usage
//! ```rust,no_run
//! use packet_transport::utils::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(16, 1200); // 16 buffers of 1200 bytes
//! let mut buffer = pool.acquire();
//! buffer.extend_from_slice(b"payload");
//! // Buffer automatically returned to pool on drop
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Default buffer capacity
const DEFAULT_BUFFER_CAPACITY: usize = 1200;

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    buffer_capacity: usize,
    acquired_total: AtomicU64,
}

/// A pooled buffer that returns itself to the pool when dropped
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Get an immutable view of the written bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // Buffers that grew past twice the pool's size are not worth keeping
        if self.buffer.capacity() <= self.pool.buffer_capacity * 2 {
            self.buffer.clear();
            if let Ok(mut free) = self.pool.free.lock() {
                free.push(std::mem::take(&mut self.buffer));
            }
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

/// Shared pool of serialization buffers
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool with `pool_size` pre-allocated buffers of `buffer_capacity` bytes
    pub fn new(pool_size: usize, buffer_capacity: usize) -> Self {
        let mut free = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            free.push(Vec::with_capacity(buffer_capacity));
        }

        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                buffer_capacity,
                acquired_total: AtomicU64::new(0),
            }),
        }
    }

    /// Acquire a buffer from the pool (or allocate a new one if pool is empty)
    pub fn acquire(&self) -> PooledBuffer {
        let capacity = self.inner.buffer_capacity;
        let buffer = match self.inner.free.lock() {
            Ok(mut free) => free.pop().unwrap_or_else(|| Vec::with_capacity(capacity)),
            Err(_) => Vec::with_capacity(capacity),
        };
        self.inner.acquired_total.fetch_add(1, Ordering::Relaxed);

        PooledBuffer {
            buffer,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Get the current number of available buffers in the pool
    pub fn available(&self) -> usize {
        self.inner.free.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Capacity each pooled buffer is created with
    pub fn buffer_capacity(&self) -> usize {
        self.inner.buffer_capacity
    }

    /// Total number of buffers handed out by this pool since creation
    pub fn acquired_total(&self) -> u64 {
        self.inner.acquired_total.load(Ordering::Relaxed)
    }

    /// Whether two handles refer to the same underlying pool
    pub fn ptr_eq(&self, other: &BufferPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(32, DEFAULT_BUFFER_CAPACITY)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("available", &self.available())
            .field("buffer_capacity", &self.inner.buffer_capacity)
            .field("acquired_total", &self.acquired_total())
            .finish()
    }
}
