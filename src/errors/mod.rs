//! Error types for redis-list-input
//!
//! Overview
//! --------
//! Canonical error enumeration used across config, pool, fetch, decode and
//! emit layers. Keep variants stable and descriptive; map external library
//! errors into these variants at module boundaries.
//!
//! Classification
//! --------------
//! - Construction-time variants are fatal: the connector never starts.
//! - `Fetch` and `Decode` are recoverable in the steady state.
//! - `ScriptInvalidated`, `ReconnectExhausted` and `BusClosed` stop a running
//!   loop and are returned to the supervisor.
//!
//! Concurrency / Logging
//! ---------------------
//! Errors are `Send + Sync` and implement Display via `thiserror`.
//! Use `tracing` for context at call sites (`error!(...);`).
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A duration field (e.g. `blocking_timeout`) did not parse.
    #[error("Invalid duration: {0}")]
    DurationParse(String),

    /// The pool could not be built for the configured address.
    #[error("Redis connect failed: {0}")]
    Connect(String),

    /// Startup liveness probe failed after the pool was built.
    #[error("ping redis server failed: {0}")]
    PingFailed(String),

    /// The server rejected the batch-pop script.
    #[error("Batch script load failed: {0}")]
    ScriptLoad(String),

    /// The script handle was reported unknown twice within one logical call.
    #[error("Batch script invalidated again right after re-install")]
    ScriptInvalidated,

    /// Transport or command failure during a single fetch.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Reconnect gave up after {attempts} attempts: {last}")]
    ReconnectExhausted { attempts: u32, last: String },

    /// Malformed payload; surfaced as an error-tagged event.
    #[error("Queue item decode error: {0}")]
    Decode(String),

    #[error("Event bus closed")]
    BusClosed,
}

impl InputError {
    /// Whether the error must stop the fetch loop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, InputError::Fetch(_) | InputError::Decode(_))
    }
}
