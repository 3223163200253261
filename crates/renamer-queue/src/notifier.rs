//! Status messages with bounded retry on rate limits.

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use renamer_messaging::{MessagingTransport, TransportError};
use renamer_models::{ChatId, MessageRef};

use crate::metrics::{record_notify_exhausted, record_notify_retry};
use crate::retry::{retry_when, RetryConfig, RetryResult};

pub type NotifyResult<T> = Result<T, NotifyError>;

/// A status message could not be delivered.
///
/// Never fatal to a task: callers log it and carry on.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{operation} still rate limited after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last_error: TransportError,
    },

    #[error("{operation} rejected: {source}")]
    Rejected {
        operation: &'static str,
        #[source]
        source: TransportError,
    },
}

impl NotifyError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, NotifyError::Exhausted { .. })
    }

    fn from_retry<T>(operation: &'static str, result: RetryResult<T, TransportError>) -> NotifyResult<T> {
        match result {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Exhausted { error, attempts } => {
                record_notify_exhausted(operation);
                Err(NotifyError::Exhausted {
                    operation,
                    attempts,
                    last_error: error,
                })
            }
            RetryResult::NotRetried { error, .. } => Err(NotifyError::Rejected {
                operation,
                source: error,
            }),
        }
    }
}

/// Wraps send, edit and delete of status messages in one retry policy.
#[derive(Clone)]
pub struct RateLimitedNotifier {
    transport: Arc<dyn MessagingTransport>,
    max_retries: u32,
}

impl RateLimitedNotifier {
    /// `max_retries` counts retries after the first attempt.
    pub fn new(transport: Arc<dyn MessagingTransport>, max_retries: u32) -> Self {
        Self {
            transport,
            max_retries,
        }
    }

    /// The wrapped transport, for calls that bypass the notifier.
    pub fn transport(&self) -> &Arc<dyn MessagingTransport> {
        &self.transport
    }

    fn config(&self, operation: &'static str) -> RetryConfig {
        RetryConfig::rate_limited(operation).with_max_retries(self.max_retries)
    }

    fn is_rate_limited(operation: &'static str) -> impl Fn(&TransportError) -> bool {
        move |e: &TransportError| {
            let limited = e.is_rate_limited();
            if limited {
                record_notify_retry(operation);
            }
            limited
        }
    }

    pub async fn send(&self, chat: ChatId, text: &str) -> NotifyResult<MessageRef> {
        const OP: &str = "send_message";
        let result = retry_when(&self.config(OP), Self::is_rate_limited(OP), || {
            self.transport.send_message(chat, text)
        })
        .await;
        NotifyError::from_retry(OP, result)
    }

    /// Edit a message. An unchanged text counts as delivered.
    pub async fn edit(&self, chat: ChatId, message: MessageRef, text: &str) -> NotifyResult<()> {
        const OP: &str = "edit_message";
        let result = retry_when(&self.config(OP), Self::is_rate_limited(OP), || async move {
            match self.transport.edit_message(chat, message, text).await {
                Err(e) if e.is_not_modified() => Ok(()),
                other => other,
            }
        })
        .await;
        NotifyError::from_retry(OP, result)
    }

    /// Delete a message. A message that is already gone counts as deleted.
    pub async fn delete(&self, chat: ChatId, message: MessageRef) -> NotifyResult<()> {
        const OP: &str = "delete_message";
        let result = retry_when(&self.config(OP), Self::is_rate_limited(OP), || async move {
            match self.transport.delete_message(chat, message).await {
                Err(e) if e.is_message_missing() => Ok(()),
                other => other,
            }
        })
        .await;
        NotifyError::from_retry(OP, result)
    }

    /// Send and log instead of failing.
    pub async fn send_logged(&self, chat: ChatId, text: &str) -> Option<MessageRef> {
        match self.send(chat, text).await {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(chat_id = chat.0, error = %e, "Status message not delivered");
                None
            }
        }
    }

    /// Edit and log instead of failing.
    pub async fn edit_logged(&self, chat: ChatId, message: MessageRef, text: &str) {
        if let Err(e) = self.edit(chat, message, text).await {
            warn!(chat_id = chat.0, message_id = message.0, error = %e, "Status edit not delivered");
        }
    }

    /// Delete and log instead of failing.
    pub async fn delete_logged(&self, chat: ChatId, message: MessageRef) {
        if let Err(e) = self.delete(chat, message).await {
            warn!(chat_id = chat.0, message_id = message.0, error = %e, "Status delete not delivered");
        }
    }
}
