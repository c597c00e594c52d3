//! Connector wiring: validate → connect → ping → install script → spawn.
//!
//! Every startup failure is returned from [`ListInput::init`] and the loop
//! never starts. Validation runs before any socket is opened, and the batch
//! script is only installed once the ping has succeeded.

use std::sync::Arc;

use deadpool_redis::Pool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app::{run, RetryPolicy, RunStats};
use crate::config::{ConnectorConfig, InputConfig};
use crate::emit::EventSink;
use crate::errors::InputError;
use crate::ingest::Queue;
use crate::redis::{create_pool, ping, RedisListQueue};
use crate::transform::decode::{codec_from_name, Decoder};

pub struct ListInput {
    config: ConnectorConfig,
    queue: RedisListQueue,
    decoder: Arc<dyn Decoder>,
}

impl ListInput {
    /// Build the input with the decoder named by `codec`.
    pub async fn init(raw: &InputConfig) -> Result<Self, InputError> {
        let config = raw.validate()?;
        let decoder = codec_from_name(&config.codec)?;
        Self::with_decoder(config, decoder).await
    }

    pub async fn with_decoder(
        config: ConnectorConfig,
        decoder: Arc<dyn Decoder>,
    ) -> Result<Self, InputError> {
        let pool = create_pool(&config)?;
        if let Err(e) = ping(&pool).await {
            pool.close();
            return Err(e);
        }

        let mut queue = RedisListQueue::new(pool, &config);
        if let Err(e) = queue.install_script().await {
            queue.close().await;
            return Err(e);
        }

        info!(
            host = %config.host,
            key = %config.key,
            connections = config.connections,
            batch_count = config.batch_count,
            blocking_timeout = ?config.blocking_timeout,
            "redis list input ready"
        );
        Ok(Self {
            config,
            queue,
            decoder,
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Shared pool handle, for health checks running beside the loop.
    pub fn pool(&self) -> Pool {
        self.queue.pool().clone()
    }

    /// SHA of the installed batch script, if batching is on.
    pub fn script_handle(&self) -> Option<&str> {
        self.queue.script().and_then(|s| s.handle())
    }

    /// Spawn the fetch loop. The task resolves when `cancel` fires or a
    /// fatal error stops it; the pool is closed before it returns.
    pub fn start<S>(
        self,
        sink: S,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<RunStats, InputError>>
    where
        S: EventSink + 'static,
    {
        tokio::spawn(async move {
            let Self {
                config,
                mut queue,
                decoder,
            } = self;
            let policy = RetryPolicy::from_config(&config);
            run(&mut queue, decoder.as_ref(), &sink, &cancel, policy).await
        })
    }
}
