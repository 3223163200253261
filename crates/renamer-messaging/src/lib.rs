//! Messaging transport for the rename service.
//!
//! This crate provides:
//! - The `MessagingTransport` contract with a distinguished rate-limit error
//! - A Telegram Bot API implementation over `reqwest`
//! - A long-poll update source yielding inbound files
//! - A recording in-memory transport (`test-util` feature)

pub mod bot_api;
pub mod error;
pub mod transport;
pub mod updates;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use bot_api::{BotApiClient, BotApiConfig, DEFAULT_API_URL};
pub use error::{TransportError, TransportResult};
pub use transport::{
    InlineButton, MessagingTransport, TransferCallback, TransferProgress, UploadRequest,
};
pub use updates::{IncomingFile, UpdatePoller};
