// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis-backed state store.
//!
//! Plain operations map one-to-one onto Redis commands. An [`AtomicUnit`] is
//! shipped as JSON to a Lua script, which Redis runs without interleaving
//! any other command. Requires a single-node deployment: the script touches
//! keys it does not declare up front.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::debug;

use parley_core::atomic::{ttl_secs, AtomicUnit};
use parley_core::{Backend, BackendKind, HealthStatus, ParleyError, StateStore};

const ATOMIC_UNIT_SCRIPT: &str = r#"
local unit = cjson.decode(ARGV[1])

local function holds(g)
  if g.guard == 'value_in' then
    local v = redis.call('GET', g.key)
    if not v then
      if g.default == nil then return false end
      v = g.default
    end
    for _, allowed in ipairs(g.values) do
      if v == allowed then return true end
    end
    return false
  elseif g.guard == 'exists' then
    return redis.call('EXISTS', g.key) == 1
  elseif g.guard == 'absent' then
    return redis.call('EXISTS', g.key) == 0
  elseif g.guard == 'hash_field_absent' then
    return redis.call('HEXISTS', g.key, g.field) == 0
  end
  error('unknown guard ' .. tostring(g.guard))
end

local function apply(op)
  local kind = op.op
  if kind == 'set' then
    if op.ttl_secs then
      redis.call('SET', op.key, op.value, 'EX', op.ttl_secs)
    else
      redis.call('SET', op.key, op.value)
    end
  elseif kind == 'delete' then
    redis.call('DEL', op.key)
  elseif kind == 'expire' then
    redis.call('EXPIRE', op.key, op.ttl_secs)
  elseif kind == 'list_push_back' then
    redis.call('RPUSH', op.key, op.value)
  elseif kind == 'list_push_front' then
    redis.call('LPUSH', op.key, op.value)
  elseif kind == 'list_remove' then
    redis.call('LREM', op.key, 0, op.value)
  elseif kind == 'hash_set' then
    for _, pair in ipairs(op.fields) do
      redis.call('HSET', op.key, pair[1], pair[2])
    end
  elseif kind == 'hash_incr' then
    redis.call('HINCRBY', op.key, op.field, op.by)
  elseif kind == 'set_add' then
    redis.call('SADD', op.key, op.member)
  elseif kind == 'set_remove' then
    redis.call('SREM', op.key, op.member)
  else
    error('unknown op ' .. tostring(kind))
  end
end

for _, g in ipairs(unit.guards) do
  if not holds(g) then return 0 end
end
for _, op in ipairs(unit.ops) do
  apply(op)
end
return 1
"#;

/// [`StateStore`] over a shared Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    unit_script: redis::Script,
}

impl RedisStore {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// The connection manager reconnects on its own after transient failures.
    pub async fn connect(url: &str) -> Result<Self, ParleyError> {
        let client = redis::Client::open(url).map_err(ParleyError::store)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(ParleyError::store)?;
        debug!(url, "redis connection manager ready");
        Ok(Self {
            conn,
            unit_script: redis::Script::new(ATOMIC_UNIT_SCRIPT),
        })
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, ParleyError> {
        let mut conn = self.conn.clone();
        cmd.query_async(&mut conn).await.map_err(ParleyError::store)
    }
}

#[async_trait]
impl Backend for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::StateStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        match self.query::<String>(&redis::cmd("PING")).await {
            Ok(reply) if reply == "PONG" => Ok(HealthStatus::Healthy),
            Ok(reply) => Ok(HealthStatus::Degraded(format!("unexpected PING reply {reply}"))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, ParleyError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.query(redis::cmd("MGET").arg(keys)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), ParleyError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl_secs(ttl));
        }
        self.query(&cmd).await
    }

    async fn delete(&self, key: &str) -> Result<bool, ParleyError> {
        let removed: i64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, ParleyError> {
        let count: i64 = self.query(redis::cmd("EXISTS").arg(key)).await?;
        Ok(count > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError> {
        let applied: i64 = self
            .query(redis::cmd("EXPIRE").arg(key).arg(ttl_secs(ttl)))
            .await?;
        Ok(applied == 1)
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<usize, ParleyError> {
        self.query(redis::cmd("RPUSH").arg(key).arg(value)).await
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<usize, ParleyError> {
        self.query(redis::cmd("LPUSH").arg(key).arg(value)).await
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, ParleyError> {
        self.query(redis::cmd("LPOP").arg(key)).await
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, ParleyError> {
        self.query(redis::cmd("LREM").arg(key).arg(0).arg(value)).await
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, ParleyError> {
        self.query(redis::cmd("LRANGE").arg(key).arg(0).arg(-1)).await
    }

    async fn list_len(&self, key: &str) -> Result<usize, ParleyError> {
        self.query(redis::cmd("LLEN").arg(key)).await
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), ParleyError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let _: i64 = self.query(&cmd).await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, ParleyError> {
        self.query(redis::cmd("HGETALL").arg(key)).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, ParleyError> {
        let added: i64 = self.query(redis::cmd("SADD").arg(key).arg(member)).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, ParleyError> {
        let removed: i64 = self.query(redis::cmd("SREM").arg(key).arg(member)).await?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, ParleyError> {
        self.query(redis::cmd("SMEMBERS").arg(key)).await
    }

    async fn execute(&self, unit: AtomicUnit) -> Result<bool, ParleyError> {
        let payload = unit
            .to_json()
            .map_err(|e| ParleyError::Internal(format!("unit encoding failed: {e}")))?;
        let mut conn = self.conn.clone();
        let applied: i64 = self
            .unit_script
            .arg(payload)
            .invoke_async(&mut conn)
            .await
            .map_err(ParleyError::store)?;
        Ok(applied == 1)
    }
}
