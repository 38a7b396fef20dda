//! Pooled frame buffers.
//!
//! Every exported frame needs a `width * height * 4` byte buffer. Allocating
//! one per tick at 4K/60 churns through ~2 GB/s, so buffers are rented from a
//! pool and returned automatically when the [`Frame`] is dropped. Ownership
//! moves with the frame: the readback side rents it, the encoder feed drops it
//! after writing it to the pipe, and any frame discarded on an error or
//! cancel path is returned the same way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use frameport_render_model::Resolution;

/// Pool of equally sized BGRA frame buffers.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    resolution: Resolution,
    frame_bytes: usize,
    max_idle: usize,
    idle: Mutex<Vec<Vec<u8>>>,
    allocated: AtomicU64,
    reused: AtomicU64,
}

/// Allocation counters for a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers created because none were idle.
    pub allocated: u64,
    /// Rents served from an idle buffer.
    pub reused: u64,
}

/// One BGRA frame. Returns its buffer to the originating pool on drop.
pub struct Frame {
    data: Vec<u8>,
    resolution: Resolution,
    pool: Weak<PoolInner>,
}

impl FramePool {
    /// Create a pool for frames of `resolution`, keeping at most `max_idle`
    /// buffers around for reuse.
    pub fn new(resolution: Resolution, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                resolution,
                frame_bytes: resolution.frame_bytes(),
                max_idle,
                idle: Mutex::new(Vec::with_capacity(max_idle)),
                allocated: AtomicU64::new(0),
                reused: AtomicU64::new(0),
            }),
        }
    }

    /// Rent a frame. Recycled buffers keep their previous contents; callers
    /// overwrite every byte during readback.
    pub fn rent(&self) -> Frame {
        let recycled = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();

        let data = match recycled {
            Some(buffer) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                buffer
            }
            None => {
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                vec![0u8; self.inner.frame_bytes]
            }
        };

        Frame {
            data,
            resolution: self.inner.resolution,
            pool: Arc::downgrade(&self.inner),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.inner.resolution
    }

    /// Size in bytes of every frame handed out by this pool.
    pub fn frame_bytes(&self) -> usize {
        self.inner.frame_bytes
    }

    /// Buffers currently waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
        }
    }
}

impl PoolInner {
    fn give_back(&self, buffer: Vec<u8>) {
        if buffer.len() != self.frame_bytes {
            return;
        }
        let mut idle = self
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if idle.len() < self.max_idle {
            idle.push(buffer);
        }
    }
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("resolution", &self.resolution)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.give_back(std::mem::take(&mut self.data));
        }
    }
}
