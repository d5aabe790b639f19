//! Bounded frame queue between capture and inference.
//!
//! When inference is slower than the camera the queue drops its oldest frame
//! to make room, so the inference stage always works on recent footage.

use crate::collector::types::Frame;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Drop-oldest bounded queue of frames.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    sender: Sender<Frame>,
    receiver: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue a frame, evicting the oldest one if the queue is full.
    ///
    /// Returns the number of frames evicted.
    pub fn push(&self, frame: Frame) -> u64 {
        let mut frame = frame;
        let mut evicted = 0;
        loop {
            match self.sender.try_send(frame) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(returned)) => {
                    frame = returned;
                    if self.receiver.try_recv().is_ok() {
                        evicted += 1;
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                // Unreachable while the queue holds its own receiver.
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }

    /// Wait up to `timeout` for the next frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Frame, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<Frame> {
        self.receiver.try_recv().ok()
    }

    /// Discard all queued frames.
    pub fn clear(&self) {
        while self.receiver.try_recv().is_ok() {}
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Total frames evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
