//! Reusable output buffers for serialized workbooks.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::conf::{N_BUFFER_GROWTH_RETAIN_MAX, N_BUFFERS_POOL_MAX_DEFAULT, N_BYTES_BUFFER_DEFAULT};

/// Pool of byte buffers pre-sized for one workbook each.
///
/// Buffers return to the pool when their [`PooledBuffer`] guard drops. At most
/// `n_buffers_max` idle buffers are retained; buffers that grew far past the
/// initial capacity are dropped instead of retained.
#[derive(Debug)]
pub struct BufferPool {
    n_bytes_capacity: usize,
    n_buffers_max: usize,
    l_buffers_idle: Mutex<Vec<Vec<u8>>>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(N_BYTES_BUFFER_DEFAULT, N_BUFFERS_POOL_MAX_DEFAULT)
    }
}

impl BufferPool {
    /// Create an empty pool.
    pub fn new(n_bytes_capacity: usize, n_buffers_max: usize) -> Self {
        Self {
            n_bytes_capacity,
            n_buffers_max,
            l_buffers_idle: Mutex::new(Vec::new()),
        }
    }

    /// Initial capacity of each buffer.
    pub fn buffer_capacity(&self) -> usize {
        self.n_bytes_capacity
    }

    /// Number of idle buffers currently retained.
    pub fn idle_count(&self) -> usize {
        self.l_buffers_idle.lock().len()
    }

    /// Take an empty buffer, reusing an idle one when available.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buffer = self
            .l_buffers_idle
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.n_bytes_capacity));
        PooledBuffer {
            buffer,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() > self.n_bytes_capacity.saturating_mul(N_BUFFER_GROWTH_RETAIN_MAX) {
            return;
        }
        buffer.clear();
        let mut l_buffers_idle = self.l_buffers_idle.lock();
        if l_buffers_idle.len() < self.n_buffers_max {
            l_buffers_idle.push(buffer);
        }
    }
}

/// Exclusive handle to one pooled buffer; returns it on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}
