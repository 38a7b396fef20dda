//! Bounded hand-off between the render loop and the encoder feed.
//!
//! The render loop is the single producer and must never stall, so it uses
//! [`FrameBuffer::try_enqueue`] and skips the tick when the buffer is full.
//! The encoder feed is the single consumer and blocks in
//! [`FrameBuffer::dequeue`] until a frame arrives or the buffer is completed
//! and drained.
//!
//! Completion drops the only long-lived sender, which disconnects the channel:
//! queued frames stay readable and the consumer then sees end-of-stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};

use crate::frame_pool::Frame;

/// Default number of frames that may wait for the encoder.
pub const DEFAULT_CAPACITY: usize = 60;

const BLOCKING_ENQUEUE_POLL: Duration = Duration::from_millis(20);

/// Bounded FIFO of frames awaiting the encoder.
pub struct FrameBuffer {
    sender: Mutex<Option<Sender<Frame>>>,
    receiver: Receiver<Frame>,
    capacity: usize,
    completed: AtomicBool,
}

/// Why a frame was refused. The frame is handed back so the caller decides
/// what happens to it; dropping it returns the buffer to its pool.
#[derive(Debug, thiserror::Error)]
pub enum TryEnqueueError {
    #[error("frame buffer is full")]
    Full(Frame),

    #[error("frame buffer no longer accepts frames")]
    Completed(Frame),
}

impl TryEnqueueError {
    pub fn into_frame(self) -> Frame {
        match self {
            Self::Full(frame) | Self::Completed(frame) => frame,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl FrameBuffer {
    /// Create a buffer holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            capacity,
            completed: AtomicBool::new(false),
        }
    }

    /// Enqueue without blocking.
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), TryEnqueueError> {
        let guard = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(sender) = guard.as_ref() else {
            return Err(TryEnqueueError::Completed(frame));
        };
        match sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => Err(TryEnqueueError::Full(frame)),
            Err(TrySendError::Disconnected(frame)) => Err(TryEnqueueError::Completed(frame)),
        }
    }

    /// Enqueue, waiting while the buffer is full. Returns `false` once the
    /// buffer is completed, including while waiting.
    ///
    /// Each send attempt holds the sender lock, so `complete` cannot slip in
    /// between the completion check and the send.
    pub fn enqueue(&self, frame: Frame) -> bool {
        let mut pending = frame;
        loop {
            {
                let guard = self
                    .sender
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let Some(sender) = guard.as_ref() else {
                    return false;
                };
                match sender.send_timeout(pending, BLOCKING_ENQUEUE_POLL) {
                    Ok(()) => return true,
                    Err(SendTimeoutError::Timeout(frame)) => pending = frame,
                    Err(SendTimeoutError::Disconnected(_)) => return false,
                }
            }
            // Let `complete` and `try_enqueue` take the lock between attempts.
            std::thread::yield_now();
        }
    }

    /// Take the next frame, blocking while the buffer is empty. `None` marks
    /// end-of-stream: the buffer was completed and every frame was consumed.
    pub fn dequeue(&self) -> Option<Frame> {
        loop {
            match self.receiver.recv_timeout(BLOCKING_ENQUEUE_POLL) {
                Ok(frame) => return Some(frame),
                Err(RecvTimeoutError::Disconnected) => return None,
                Err(RecvTimeoutError::Timeout) => {
                    if self.is_completed() && self.receiver.is_empty() {
                        return None;
                    }
                }
            }
        }
    }

    /// Stop accepting frames. Queued frames remain drainable. Idempotent.
    pub fn complete(&self) {
        self.completed.store(true, Ordering::SeqCst);
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(sender);
    }

    /// Drop every queued frame, returning the buffers to their pool.
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Whether the next `try_enqueue` would be refused for lack of space.
    /// The producer uses this to skip a tick instead of blocking.
    pub fn is_full(&self) -> bool {
        self.receiver.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
