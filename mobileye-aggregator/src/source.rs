//! Frame sources
//!
//! The aggregator loop pulls frames through [`FrameSource`]. A receive that
//! times out is not an error: it yields `Ok(None)` and the loop simply tries
//! again. Finite sources (replays, log files) additionally report when they
//! have nothing left.

use crate::types::{CanFrame, SourceError};
use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// A blocking producer of raw CAN frames
pub trait FrameSource {
    /// Wait up to `timeout` for the next frame.
    ///
    /// `Ok(None)` means no frame arrived in time, or the source is exhausted.
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, SourceError>;

    /// True once a finite source has delivered its last frame
    fn is_exhausted(&self) -> bool {
        false
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, SourceError> {
        (**self).receive(timeout)
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

/// In-memory frames, delivered in order without waiting
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    frames: VecDeque<CanFrame>,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = CanFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Append a frame to the end of the replay
    pub fn push(&mut self, frame: CanFrame) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn receive(&mut self, _timeout: Duration) -> Result<Option<CanFrame>, SourceError> {
        Ok(self.frames.pop_front())
    }

    fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Frames handed over from another thread, e.g. a bus driver callback.
///
/// The source is exhausted once every sender has been dropped.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: Receiver<CanFrame>,
    disconnected: bool,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<CanFrame>) -> Self {
        Self {
            receiver,
            disconnected: false,
        }
    }
}

impl FrameSource for ChannelSource {
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, SourceError> {
        if self.disconnected {
            return Ok(None);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("Frame channel closed");
                self.disconnected = true;
                Ok(None)
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.disconnected
    }
}
