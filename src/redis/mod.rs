//! Redis list integration (single version of `redis` via deadpool-redis)
//!
//! The pool is an explicitly owned value: [`create_pool`] builds it,
//! [`RedisListQueue`] holds it for the lifetime of the input and closes it on
//! shutdown. `Pool` is cheap to clone and safe to share, so health checks may
//! run concurrently with the fetch loop.

pub mod script;

use bytes::Bytes;
use deadpool_redis::redis::{self, RedisError, Value};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ConnectorConfig;
use crate::errors::InputError;
use crate::ingest::Queue;
use script::BatchScript;

/// Build the pool. Connections open lazily, at most `connections` at a time.
pub fn create_pool(cfg: &ConnectorConfig) -> Result<Pool, InputError> {
    let mut pool_cfg = PoolConfig::new(cfg.connections);
    pool_cfg.timeouts.wait = Some(cfg.connect_timeout);
    pool_cfg.timeouts.create = Some(cfg.connect_timeout);
    pool_cfg.timeouts.recycle = Some(cfg.connect_timeout);

    let mut redis_cfg = Config::from_url(cfg.redis_url());
    redis_cfg.pool = Some(pool_cfg);
    redis_cfg
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| InputError::Connect(e.to_string()))
}

/// Liveness probe through the pool.
#[tracing::instrument(skip(pool))]
pub async fn ping(pool: &Pool) -> Result<(), InputError> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| InputError::PingFailed(e.to_string()))?;
    let pong: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(|e| InputError::PingFailed(e.to_string()))?;
    debug!(reply = %pong, "ping ok");
    Ok(())
}

/// Socket-level failures: the connection should not go back to the pool.
pub(crate) fn is_transport(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

/// `BLPOP` takes whole seconds on older servers, and 0 means "forever".
pub fn blocking_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    secs.max(1)
}

/// Parse a `BLPOP` reply: `nil` on timeout, else `[key, value]`.
pub fn parse_blpop_reply(val: Value) -> Option<Bytes> {
    let Value::Bulk(mut pair) = val else {
        return None;
    };
    if pair.len() != 2 {
        return None;
    }
    match pair.pop() {
        Some(Value::Data(b)) => Some(Bytes::from(b)),
        _ => None,
    }
}

/// Run `op` until it completes or `cancel` fires. A ready result wins over
/// cancellation, so an item the server already handed out is not dropped.
pub(crate) async fn unless_cancelled<F>(op: F, cancel: &CancellationToken) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        r = op => Some(r),
        _ = cancel.cancelled() => None,
    }
}

pub struct RedisListQueue {
    pool: Pool,
    key: String,
    batch_count: usize,
    blocking_timeout: Duration,
    command_timeout: Duration,
    script: Option<BatchScript>,
}

impl RedisListQueue {
    /// The batch script is only used when `batch_count > 1`.
    pub fn new(pool: Pool, cfg: &ConnectorConfig) -> Self {
        Self {
            pool,
            key: cfg.key.clone(),
            batch_count: cfg.batch_count,
            blocking_timeout: cfg.blocking_timeout,
            command_timeout: cfg.connect_timeout,
            script: cfg.is_batched().then(BatchScript::new),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn script(&self) -> Option<&BatchScript> {
        self.script.as_ref()
    }

    pub async fn health_check(&self) -> Result<(), InputError> {
        ping(&self.pool).await
    }

    async fn conn(&self) -> Result<Connection, InputError> {
        self.pool
            .get()
            .await
            .map_err(|e| InputError::Fetch(e.to_string()))
    }

    /// Register the batch script up front. A no-op for `batch_count == 1`.
    pub async fn install_script(&mut self) -> Result<(), InputError> {
        let Some(script) = self.script.as_mut() else {
            return Ok(());
        };
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| InputError::Connect(e.to_string()))?;
        match script.install(&mut *conn).await {
            // Startup has no retry loop, so any load failure is fatal here.
            Err(InputError::Fetch(e)) => Err(InputError::ScriptLoad(e)),
            other => other.map(|_| ()),
        }
    }

    /// One `BLPOP` bounded by the blocking timeout. Cancellation aborts the
    /// wait and drops the connection so the server stops serving the pop.
    pub async fn blpop(&self, cancel: &CancellationToken) -> Result<Option<Bytes>, InputError> {
        let secs = blocking_secs(self.blocking_timeout);
        let deadline = Duration::from_secs(secs) + self.command_timeout;
        let mut conn = self.conn().await?;

        let mut cmd = redis::cmd("BLPOP");
        cmd.arg(&self.key).arg(secs);

        let outcome = unless_cancelled(
            tokio::time::timeout(deadline, cmd.query_async::<_, Value>(&mut *conn)),
            cancel,
        )
        .await;

        match outcome {
            None => {
                drop(Connection::take(conn));
                warn!(key = %self.key, "in-flight blocking pop abandoned on cancellation");
                Ok(None)
            }
            Some(Err(_elapsed)) => {
                drop(Connection::take(conn));
                Err(InputError::Fetch(format!(
                    "BLPOP on {} gave no reply within {:?}",
                    self.key, deadline
                )))
            }
            Some(Ok(Err(e))) => {
                if is_transport(&e) {
                    drop(Connection::take(conn));
                }
                Err(InputError::Fetch(e.to_string()))
            }
            Some(Ok(Ok(reply))) => Ok(parse_blpop_reply(reply)),
        }
    }

    /// Atomic pop of up to `batch_count` items through the batch script.
    pub async fn pop_batch(&mut self) -> Result<Vec<Bytes>, InputError> {
        let Some(script) = self.script.as_mut() else {
            return Ok(Vec::new());
        };
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| InputError::Fetch(e.to_string()))?;

        let res = tokio::time::timeout(
            self.command_timeout,
            script.pop_batch(&mut *conn, &self.key, self.batch_count),
        )
        .await;

        match res {
            Ok(Ok(items)) => Ok(items),
            Ok(Err(e)) => {
                if matches!(e, InputError::Fetch(_)) {
                    drop(Connection::take(conn));
                }
                Err(e)
            }
            Err(_elapsed) => {
                drop(Connection::take(conn));
                Err(InputError::Fetch(format!(
                    "batch pop on {} gave no reply within {:?}",
                    self.key, self.command_timeout
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl Queue for RedisListQueue {
    async fn fetch(&mut self, cancel: &CancellationToken) -> Result<Vec<Bytes>, InputError> {
        if self.script.is_some() {
            let batch = self.pop_batch().await?;
            if !batch.is_empty() {
                debug!(key = %self.key, count = batch.len(), "batch popped");
                return Ok(batch);
            }
            // Drained: wait on the list instead of spinning on the script.
        }
        Ok(self.blpop(cancel).await?.into_iter().collect())
    }

    async fn reconnect(&mut self) -> Result<(), InputError> {
        ping(&self.pool)
            .await
            .map_err(|e| InputError::Fetch(e.to_string()))
    }

    async fn close(&mut self) {
        self.pool.close();
    }
}
