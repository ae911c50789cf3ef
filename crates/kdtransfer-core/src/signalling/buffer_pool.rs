//! Reusable read-buffer pool so per-connection frame reads don't each
//! allocate a fresh `Vec`.

use std::sync::Mutex;

/// Cap on how many buffers the pool will hold onto; beyond this,
/// returned buffers are simply dropped.
const MAX_POOLED_BUFFERS: usize = 256;

pub(super) struct BufferPool {
    buffer_size: usize,
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub(super) fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// Take a buffer from the pool, or allocate a fresh one.
    pub(super) fn get(&self) -> Vec<u8> {
        let mut pool = self.buffers.lock().unwrap();
        pool.pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_size))
    }

    /// Return a buffer to the pool. Buffers whose capacity no longer
    /// matches this pool's size class, or that arrive once the pool is
    /// full, are dropped rather than retained — a defensive choice that
    /// trades a future allocation for bounded pool memory.
    pub(super) fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() < self.buffer_size {
            return;
        }
        buf.clear();

        let mut pool = self.buffers.lock().unwrap();
        if pool.len() < MAX_POOLED_BUFFERS {
            pool.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_returned_buffers() {
        let pool = BufferPool::new(8);
        let buf = pool.get();
        let cap = buf.capacity();
        pool.put(buf);

        let reused = pool.get();
        assert_eq!(reused.capacity(), cap);
    }

    #[test]
    fn drops_undersized_buffers_on_return() {
        let pool = BufferPool::new(8 * 1024);
        pool.put(Vec::with_capacity(4));
        assert!(pool.buffers.lock().unwrap().is_empty());
    }

    #[test]
    fn caps_pool_size() {
        let pool = BufferPool::new(8);
        for _ in 0..MAX_POOLED_BUFFERS + 10 {
            pool.put(Vec::with_capacity(8));
        }
        assert_eq!(pool.buffers.lock().unwrap().len(), MAX_POOLED_BUFFERS);
    }
}
