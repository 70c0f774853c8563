use std::ops::{Deref, DerefMut};

use proto::HANDSHAKE_SIZE;

use crate::mutex::Mutex;

/// Pool of reusable transmit buffers
///
/// Shared by a listener and the sessions created from it. Buffers are handed out through
/// [`PooledBuf`] guards, which give the buffer back when dropped, whichever way the sending code
/// exits.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    buf_size: usize,
    max_idle: usize,
}

impl BufferPool {
    /// Create an empty pool of buffers with room for `buf_size` bytes
    ///
    /// At most `max_idle` returned buffers are kept for reuse; extras are freed.
    pub fn new(buf_size: usize, max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            buf_size,
            max_idle,
        }
    }

    /// Take an empty buffer from the pool, allocating if none is idle
    pub fn acquire(&self) -> PooledBuf<'_> {
        let buf = self
            .free
            .lock("acquire")
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buf_size));
        PooledBuf {
            buf: Some(buf),
            pool: self,
        }
    }

    /// Number of buffers waiting to be reused
    pub fn idle(&self) -> usize {
        self.free.lock("idle").len()
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.free.lock("release");
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }
}

/// Sized for handshake frames, keeping up to 64 idle buffers
impl Default for BufferPool {
    fn default() -> Self {
        Self::new(HANDSHAKE_SIZE, 64)
    }
}

/// A buffer borrowed from a [`BufferPool`], returned to it on drop
#[derive(Debug)]
pub struct PooledBuf<'a> {
    // invariant: always `Some` until dropped
    buf: Option<Vec<u8>>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuf<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().unwrap()
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().unwrap()
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse() {
        let pool = BufferPool::new(HANDSHAKE_SIZE, 2);
        assert_eq!(pool.idle(), 0);
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(&[1, 2, 3]);
        }
        assert_eq!(pool.idle(), 1);
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= HANDSHAKE_SIZE);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn returned_on_early_exit() {
        fn fails(pool: &BufferPool) -> Result<(), ()> {
            let mut buf = pool.acquire();
            buf.push(0);
            if !buf.is_empty() {
                return Err(());
            }
            Ok(())
        }

        let pool = BufferPool::default();
        assert!(fails(&pool).is_err());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn bounded_idle() {
        let pool = BufferPool::new(HANDSHAKE_SIZE, 2);
        let bufs = (0..4).map(|_| pool.acquire()).collect::<Vec<_>>();
        drop(bufs);
        assert_eq!(pool.idle(), 2);
    }
}
