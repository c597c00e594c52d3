//! Ingest abstraction
//!
//! Overview
//! --------
//! Minimal trait representing a source of raw items for the fetch loop. The
//! concrete implementation is the Redis list queue in [`crate::redis`]; tests
//! drive the loop with in-memory fakes.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::errors::InputError;

#[async_trait::async_trait]
pub trait Queue: Send {
    /// Claim the next items, oldest first. An empty vec means nothing arrived
    /// within the blocking window, or `cancel` fired while waiting.
    async fn fetch(&mut self, cancel: &CancellationToken) -> Result<Vec<Bytes>, InputError>;

    /// Re-establish connectivity after a failed fetch.
    async fn reconnect(&mut self) -> Result<(), InputError>;

    /// Release connections. Called once, when the loop stops.
    async fn close(&mut self);
}
