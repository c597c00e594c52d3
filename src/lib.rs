//! Batched blocking consumer for Redis lists.
//!
//! ```text
//! Redis list -> RedisListQueue (BLPOP | EVALSHA batch pop) -> Decoder -> Event -> EventSink
//! ```
//!
//! [`input::ListInput`] is the entry point: it validates config, connects,
//! pings, installs the batch script and spawns the fetch loop in [`app`].
pub mod app;
pub mod config;
pub mod emit;
pub mod errors;
pub mod ingest;
pub mod input;
pub mod redis;
pub mod transform;
pub mod util;
