// Optional best-effort bridge to a remote visualizer

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveStreamError {
    #[error("live stream is full")]
    Full,

    #[error("live stream disconnected")]
    Disconnected,

    #[error("live stream failed: {0}")]
    Other(String),
}

/// Receives each serialized record as it is appended.
///
/// Implementations must not block; a failed send is counted by the tracer
/// and otherwise ignored.
pub trait LiveStream {
    fn send(&mut self, payload: &str) -> Result<(), LiveStreamError>;
}

/// Live stream backed by a bounded channel, for a consumer on another thread
pub struct ChannelLiveStream {
    sender: Sender<String>,
}

impl ChannelLiveStream {
    pub fn bounded(capacity: usize) -> (Self, Receiver<String>) {
        let (sender, receiver) = bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl LiveStream for ChannelLiveStream {
    fn send(&mut self, payload: &str) -> Result<(), LiveStreamError> {
        self.sender
            .try_send(payload.to_string())
            .map_err(|err| match err {
                TrySendError::Full(_) => LiveStreamError::Full,
                TrySendError::Disconnected(_) => LiveStreamError::Disconnected,
            })
    }
}
