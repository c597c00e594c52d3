//! Server-side batch pop.
//!
//! A Lua script pops up to N items from the head of a list in one atomic
//! round trip. The script is registered with `SCRIPT LOAD` and invoked by
//! its SHA1 via `EVALSHA`. The handle lives in a two-state holder:
//!
//! ```text
//! Absent --SCRIPT LOAD--> Installed(sha)
//! Installed --NOSCRIPT--> Absent --SCRIPT LOAD--> Installed --NOSCRIPT--> fatal
//! ```
//!
//! A `NOSCRIPT` reply means the script never ran, so nothing was claimed and
//! retrying the same call cannot drop or duplicate items.

use bytes::Bytes;
use deadpool_redis::redis::{self, aio::ConnectionLike, ErrorKind, RedisError, Value};
use tracing::{info, warn};

use super::is_transport;
use crate::errors::InputError;

/// `KEYS[1]` = list, `ARGV[1]` = max items. Returns items oldest first.
pub const BATCH_POP_LUA: &str = r#"
local want = tonumber(ARGV[1])
local out = {}
while want > 0 do
  local item = redis.call('LPOP', KEYS[1])
  if not item then
    break
  end
  out[#out + 1] = item
  want = want - 1
end
return out
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptState {
    Absent,
    Installed(String),
}

#[derive(Debug)]
pub struct BatchScript {
    state: ScriptState,
    installs: u64,
}

impl Default for BatchScript {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchScript {
    pub fn new() -> Self {
        Self {
            state: ScriptState::Absent,
            installs: 0,
        }
    }

    pub fn state(&self) -> &ScriptState {
        &self.state
    }

    pub fn handle(&self) -> Option<&str> {
        match &self.state {
            ScriptState::Installed(sha) => Some(sha),
            ScriptState::Absent => None,
        }
    }

    /// Number of successful `SCRIPT LOAD`s so far.
    pub fn installs(&self) -> u64 {
        self.installs
    }

    #[tracing::instrument(skip(self, conn))]
    pub async fn install<C>(&mut self, conn: &mut C) -> Result<String, InputError>
    where
        C: ConnectionLike + Send,
    {
        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(BATCH_POP_LUA)
            .query_async(conn)
            .await
            .map_err(|e| {
                if is_transport(&e) {
                    InputError::Fetch(e.to_string())
                } else {
                    InputError::ScriptLoad(e.to_string())
                }
            })?;
        self.installs += 1;
        info!(sha = %sha, installs = self.installs, "batch script installed");
        self.state = ScriptState::Installed(sha.clone());
        Ok(sha)
    }

    /// Pop up to `count` items from `key`, installing the script if needed.
    ///
    /// A `NOSCRIPT` reply triggers one re-install and one retry; a second
    /// `NOSCRIPT` in the same call is `ScriptInvalidated`.
    pub async fn pop_batch<C>(
        &mut self,
        conn: &mut C,
        key: &str,
        count: usize,
    ) -> Result<Vec<Bytes>, InputError>
    where
        C: ConnectionLike + Send,
    {
        let sha = match &self.state {
            ScriptState::Installed(sha) => sha.clone(),
            ScriptState::Absent => self.install(conn).await?,
        };

        match evalsha(conn, &sha, key, count).await {
            Ok(reply) => return Ok(parse_batch_reply(reply)),
            Err(e) if is_noscript(&e) => {
                warn!(sha = %sha, key = %key, "batch script unknown to server; re-installing");
                self.state = ScriptState::Absent;
            }
            Err(e) => return Err(InputError::Fetch(e.to_string())),
        }

        let sha = self.install(conn).await?;
        match evalsha(conn, &sha, key, count).await {
            Ok(reply) => Ok(parse_batch_reply(reply)),
            Err(e) if is_noscript(&e) => {
                self.state = ScriptState::Absent;
                Err(InputError::ScriptInvalidated)
            }
            Err(e) => Err(InputError::Fetch(e.to_string())),
        }
    }
}

async fn evalsha<C>(conn: &mut C, sha: &str, key: &str, count: usize) -> Result<Value, RedisError>
where
    C: ConnectionLike + Send,
{
    redis::cmd("EVALSHA")
        .arg(sha)
        .arg(1)
        .arg(key)
        .arg(count)
        .query_async(conn)
        .await
}

fn is_noscript(e: &RedisError) -> bool {
    e.kind() == ErrorKind::NoScriptError
}

/// Flatten the script's array reply; non-bulk entries are skipped.
pub fn parse_batch_reply(val: Value) -> Vec<Bytes> {
    let Value::Bulk(items) = val else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Data(b) => Some(Bytes::from(b)),
            _ => None,
        })
        .collect()
}
