// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`StateStore`] backed by a shared Redis server.
//!
//! Each user owns two hashes:
//!
//! - `<prefix>:state:<user>` with the `state` and `weight` fields
//! - `<prefix>:temp:<user>` with the temporary data bag
//!
//! Every write runs in a MULTI/EXEC pipeline that also re-arms `EXPIRE` on
//! both keys, so the pair expires together after `state.ttl_secs` of
//! inactivity. Reads never refresh the TTL.

use std::str::FromStr;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use carbwise_config::model::StateConfig;
use carbwise_core::types::{ConversationState, ExternalUserId};
use carbwise_core::{CarbwiseError, StateStore};

const STATE_FIELD: &str = "state";
const WEIGHT_FIELD: &str = "weight";

fn redis_err(e: redis::RedisError) -> CarbwiseError {
    CarbwiseError::Storage {
        source: Box::new(e),
    }
}

fn corrupt(key: &str, field: &str, value: &str) -> CarbwiseError {
    CarbwiseError::Internal(format!(
        "unreadable conversation state `{value}` in {key} field {field}"
    ))
}

/// Redis key names for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Keys {
    state: String,
    temp: String,
}

impl Keys {
    fn new(prefix: &str, user: ExternalUserId) -> Self {
        Self {
            state: format!("{prefix}:state:{}", user.0),
            temp: format!("{prefix}:temp:{}", user.0),
        }
    }
}

fn decode_state(key: &str, raw: Option<String>) -> Result<ConversationState, CarbwiseError> {
    match raw {
        None => Ok(ConversationState::Idle),
        Some(raw) => {
            ConversationState::from_str(&raw).map_err(|_| corrupt(key, STATE_FIELD, &raw))
        }
    }
}

fn decode_weight(key: &str, raw: Option<String>) -> Result<Option<f64>, CarbwiseError> {
    raw.map(|raw| {
        raw.parse::<f64>()
            .ok()
            .filter(|grams| grams.is_finite())
            .ok_or_else(|| corrupt(key, WEIGHT_FIELD, &raw))
    })
    .transpose()
}

/// Dialog state shared through Redis, so several bot processes see the
/// same conversations and a restart does not lose them.
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
    prefix: String,
    ttl_secs: i64,
}

impl std::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStore")
            .field("prefix", &self.prefix)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl RedisStateStore {
    /// Connects to `state.redis_url`. The connection manager reconnects on
    /// its own after the server drops the link.
    pub async fn connect(config: &StateConfig) -> Result<Self, CarbwiseError> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| CarbwiseError::Config("state.redis_url is not set".into()))?;
        let client = redis::Client::open(url).map_err(redis_err)?;
        let conn = client.get_connection_manager().await.map_err(redis_err)?;
        info!(prefix = %config.redis_key_prefix, ttl_secs = config.ttl_secs, "connected to redis state store");
        Ok(Self {
            conn,
            prefix: config.redis_key_prefix.clone(),
            ttl_secs: i64::try_from(config.ttl_secs).unwrap_or(i64::MAX),
        })
    }

    fn keys(&self, user: ExternalUserId) -> Keys {
        Keys::new(&self.prefix, user)
    }

    /// Runs `pipe` atomically with both of the user's keys re-armed.
    async fn write(&self, keys: &Keys, mut pipe: redis::Pipeline) -> Result<(), CarbwiseError> {
        pipe.expire(&keys.state, self.ttl_secs)
            .ignore()
            .expire(&keys.temp, self.ttl_secs)
            .ignore();
        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CarbwiseError> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await.map_err(redis_err)
    }
}

fn atomic() -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    pipe
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get_state(&self, user: ExternalUserId) -> Result<ConversationState, CarbwiseError> {
        let keys = self.keys(user);
        let raw = self.hget(&keys.state, STATE_FIELD).await?;
        decode_state(&keys.state, raw)
    }

    async fn set_state(
        &self,
        user: ExternalUserId,
        state: ConversationState,
    ) -> Result<(), CarbwiseError> {
        let keys = self.keys(user);
        let mut pipe = atomic();
        pipe.hset(&keys.state, STATE_FIELD, state.to_string()).ignore();
        self.write(&keys, pipe).await
    }

    async fn get_temp(
        &self,
        user: ExternalUserId,
        key: &str,
    ) -> Result<Option<String>, CarbwiseError> {
        self.hget(&self.keys(user).temp, key).await
    }

    async fn set_temp(
        &self,
        user: ExternalUserId,
        key: &str,
        value: String,
    ) -> Result<(), CarbwiseError> {
        let keys = self.keys(user);
        let mut pipe = atomic();
        pipe.hset(&keys.temp, key, value).ignore();
        self.write(&keys, pipe).await
    }

    async fn remove_temp(&self, user: ExternalUserId, key: &str) -> Result<(), CarbwiseError> {
        let keys = self.keys(user);
        let mut pipe = atomic();
        pipe.hdel(&keys.temp, key).ignore();
        self.write(&keys, pipe).await
    }

    async fn clear_temp(&self, user: ExternalUserId) -> Result<(), CarbwiseError> {
        let keys = self.keys(user);
        let mut pipe = atomic();
        pipe.del(&keys.temp).ignore();
        self.write(&keys, pipe).await
    }

    async fn get_weight(&self, user: ExternalUserId) -> Result<Option<f64>, CarbwiseError> {
        let keys = self.keys(user);
        let raw = self.hget(&keys.state, WEIGHT_FIELD).await?;
        decode_weight(&keys.state, raw)
    }

    async fn set_weight(&self, user: ExternalUserId, grams: f64) -> Result<(), CarbwiseError> {
        let keys = self.keys(user);
        let mut pipe = atomic();
        pipe.hset(&keys.state, WEIGHT_FIELD, grams.to_string()).ignore();
        self.write(&keys, pipe).await
    }

    async fn clear_weight(&self, user: ExternalUserId) -> Result<(), CarbwiseError> {
        let keys = self.keys(user);
        let mut pipe = atomic();
        pipe.hdel(&keys.state, WEIGHT_FIELD).ignore();
        self.write(&keys, pipe).await
    }

    async fn reset(&self, user: ExternalUserId) -> Result<(), CarbwiseError> {
        let keys = self.keys(user);
        let mut conn = self.conn.clone();
        let () = conn
            .del(vec![keys.state.as_str(), keys.temp.as_str()])
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    /// Redis expires keys itself; nothing to sweep.
    async fn sweep_expired(&self) -> Result<usize, CarbwiseError> {
        debug!("redis state store has no sweep");
        Ok(0)
    }
}
