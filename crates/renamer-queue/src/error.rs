//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue stopped accepting work for shutdown.
    #[error("Queue is closed")]
    Closed,

    #[error("Drain timed out with {in_flight} tasks still in flight")]
    DrainTimeout { in_flight: usize },
}

impl QueueError {
    pub fn is_closed(&self) -> bool {
        matches!(self, QueueError::Closed)
    }
}
