// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process state store.
//!
//! The whole keyspace sits behind one async mutex, so every call, including
//! a full [`AtomicUnit`], observes and mutates it without interleaving.
//! Expiry uses `tokio::time::Instant`; tests running on a paused clock can
//! advance past TTLs deterministically. Expired keys are dropped lazily on
//! access, as Redis does.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use parley_core::atomic::{AtomicUnit, Guard, Op};
use parley_core::{Backend, BackendKind, HealthStatus, ParleyError, StateStore};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

impl Value {
    fn is_empty_collection(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
        }
    }
}

fn wrong_type(key: &str) -> ParleyError {
    ParleyError::WrongType {
        key: key.to_string(),
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Str,
    List,
    Hash,
    Set,
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    /// Drops `key` if its expiry has passed, then returns it.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            trace!(key, "expired key dropped");
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    /// Drops every entry whose expiry has passed.
    fn purge(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.expires_at.is_none_or(|at| at > now));
        before - self.entries.len()
    }

    fn exists(&mut self, key: &str) -> bool {
        self.live(key).is_some()
    }

    fn check_shape(&mut self, key: &str, shape: Shape) -> Result<(), ParleyError> {
        let ok = match self.live(key).map(|e| &e.value) {
            None => true,
            Some(Value::Str(_)) => shape == Shape::Str,
            Some(Value::List(_)) => shape == Shape::List,
            Some(Value::Hash(_)) => shape == Shape::Hash,
            Some(Value::Set(_)) => shape == Shape::Set,
        };
        if ok { Ok(()) } else { Err(wrong_type(key)) }
    }

    fn get(&mut self, key: &str) -> Result<Option<String>, ParleyError> {
        self.check_shape(key, Shape::Str)?;
        Ok(match self.live(key).map(|e| &e.value) {
            Some(Value::Str(s)) => Some(s.clone()),
            _ => None,
        })
    }

    fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
    }

    fn delete(&mut self, key: &str) -> bool {
        let existed = self.exists(key);
        self.entries.remove(key);
        existed
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        match self.live(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }
    }

    /// Mutable access to the collection at `key`, creating it when missing.
    fn collection(&mut self, key: &str, shape: Shape) -> Result<&mut Value, ParleyError> {
        self.check_shape(key, shape)?;
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: match shape {
                Shape::Str => Value::Str(String::new()),
                Shape::List => Value::List(VecDeque::new()),
                Shape::Hash => Value::Hash(HashMap::new()),
                Shape::Set => Value::Set(BTreeSet::new()),
            },
            expires_at: None,
        });
        Ok(&mut entry.value)
    }

    /// Removes `key` if the collection stored there became empty.
    fn prune(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|e| e.value.is_empty_collection())
        {
            self.entries.remove(key);
        }
    }

    fn list(&mut self, key: &str) -> Result<Option<&mut VecDeque<String>>, ParleyError> {
        self.check_shape(key, Shape::List)?;
        Ok(match self.live(key).map(|e| &mut e.value) {
            Some(Value::List(l)) => Some(l),
            _ => None,
        })
    }

    fn push(&mut self, key: &str, value: &str, front: bool) -> Result<usize, ParleyError> {
        let Value::List(list) = self.collection(key, Shape::List)? else {
            return Err(wrong_type(key));
        };
        if front {
            list.push_front(value.to_string());
        } else {
            list.push_back(value.to_string());
        }
        Ok(list.len())
    }

    fn list_remove(&mut self, key: &str, value: &str) -> Result<usize, ParleyError> {
        let removed = match self.list(key)? {
            Some(list) => {
                let before = list.len();
                list.retain(|v| v != value);
                before - list.len()
            }
            None => 0,
        };
        self.prune(key);
        Ok(removed)
    }

    fn hash(&mut self, key: &str) -> Result<Option<&mut HashMap<String, String>>, ParleyError> {
        self.check_shape(key, Shape::Hash)?;
        Ok(match self.live(key).map(|e| &mut e.value) {
            Some(Value::Hash(h)) => Some(h),
            _ => None,
        })
    }

    fn hash_set(&mut self, key: &str, fields: &[(String, String)]) -> Result<(), ParleyError> {
        if fields.is_empty() {
            return Ok(());
        }
        let Value::Hash(hash) = self.collection(key, Shape::Hash)? else {
            return Err(wrong_type(key));
        };
        hash.extend(fields.iter().cloned());
        Ok(())
    }

    fn hash_incr(&mut self, key: &str, field: &str, by: i64) -> Result<i64, ParleyError> {
        let Value::Hash(hash) = self.collection(key, Shape::Hash)? else {
            return Err(wrong_type(key));
        };
        let current: i64 = match hash.get(field) {
            Some(raw) => raw.parse().map_err(|_| ParleyError::WrongType {
                key: format!("{key}.{field}"),
            })?,
            None => 0,
        };
        let next = current + by;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    fn set_members_mut(&mut self, key: &str) -> Result<Option<&mut BTreeSet<String>>, ParleyError> {
        self.check_shape(key, Shape::Set)?;
        Ok(match self.live(key).map(|e| &mut e.value) {
            Some(Value::Set(s)) => Some(s),
            _ => None,
        })
    }

    fn set_add(&mut self, key: &str, member: &str) -> Result<bool, ParleyError> {
        let Value::Set(set) = self.collection(key, Shape::Set)? else {
            return Err(wrong_type(key));
        };
        Ok(set.insert(member.to_string()))
    }

    fn set_remove(&mut self, key: &str, member: &str) -> Result<bool, ParleyError> {
        let removed = self
            .set_members_mut(key)?
            .is_some_and(|set| set.remove(member));
        self.prune(key);
        Ok(removed)
    }

    fn holds(&mut self, guard: &Guard) -> Result<bool, ParleyError> {
        Ok(match guard {
            Guard::ValueIn {
                key,
                values,
                default,
            } => match self.get(key)?.or_else(|| default.clone()) {
                Some(current) => values.iter().any(|v| *v == current),
                None => false,
            },
            Guard::Exists { key } => self.exists(key),
            Guard::Absent { key } => !self.exists(key),
            Guard::HashFieldAbsent { key, field } => self
                .hash(key)?
                .is_none_or(|hash| !hash.contains_key(field)),
        })
    }

    /// Shape the op needs at its key, if it constrains one.
    fn required_shape(op: &Op) -> Option<(&str, Shape)> {
        match op {
            Op::Set { .. } | Op::Delete { .. } | Op::Expire { .. } => None,
            Op::ListPushBack { key, .. }
            | Op::ListPushFront { key, .. }
            | Op::ListRemove { key, .. } => Some((key.as_str(), Shape::List)),
            Op::HashSet { key, .. } | Op::HashIncr { key, .. } => Some((key.as_str(), Shape::Hash)),
            Op::SetAdd { key, .. } | Op::SetRemove { key, .. } => Some((key.as_str(), Shape::Set)),
        }
    }

    fn apply(&mut self, op: &Op) -> Result<(), ParleyError> {
        match op {
            Op::Set {
                key,
                value,
                ttl_secs,
            } => self.set(key, value, ttl_secs.map(Duration::from_secs)),
            Op::Delete { key } => {
                self.delete(key);
            }
            Op::Expire { key, ttl_secs } => {
                self.expire(key, Duration::from_secs(*ttl_secs));
            }
            Op::ListPushBack { key, value } => {
                self.push(key, value, false)?;
            }
            Op::ListPushFront { key, value } => {
                self.push(key, value, true)?;
            }
            Op::ListRemove { key, value } => {
                self.list_remove(key, value)?;
            }
            Op::HashSet { key, fields } => self.hash_set(key, fields)?,
            Op::HashIncr { key, field, by } => {
                self.hash_incr(key, field, *by)?;
            }
            Op::SetAdd { key, member } => {
                self.set_add(key, member)?;
            }
            Op::SetRemove { key, member } => {
                self.set_remove(key, member)?;
            }
        }
        Ok(())
    }
}

/// Single-process [`StateStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: Mutex<Keyspace>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys, for leak assertions in tests.
    pub async fn key_count(&self) -> usize {
        let mut keyspace = self.keyspace.lock().await;
        keyspace.purge();
        keyspace.entries.len()
    }
}

#[async_trait]
impl Backend for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::StateStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        self.keyspace.lock().await.get(key)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, ParleyError> {
        let mut keyspace = self.keyspace.lock().await;
        // MGET semantics: non-string values read as missing
        Ok(keys
            .iter()
            .map(|key| keyspace.get(key).ok().flatten())
            .collect())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), ParleyError> {
        self.keyspace.lock().await.set(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, ParleyError> {
        Ok(self.keyspace.lock().await.delete(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, ParleyError> {
        Ok(self.keyspace.lock().await.exists(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError> {
        Ok(self.keyspace.lock().await.expire(key, ttl))
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<usize, ParleyError> {
        self.keyspace.lock().await.push(key, value, false)
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<usize, ParleyError> {
        self.keyspace.lock().await.push(key, value, true)
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, ParleyError> {
        let mut keyspace = self.keyspace.lock().await;
        let popped = keyspace.list(key)?.and_then(|list| list.pop_front());
        keyspace.prune(key);
        Ok(popped)
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, ParleyError> {
        self.keyspace.lock().await.list_remove(key, value)
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, ParleyError> {
        Ok(self
            .keyspace
            .lock()
            .await
            .list(key)?
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_len(&self, key: &str) -> Result<usize, ParleyError> {
        Ok(self.keyspace.lock().await.list(key)?.map_or(0, |l| l.len()))
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), ParleyError> {
        self.keyspace.lock().await.hash_set(key, fields)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, ParleyError> {
        Ok(self
            .keyspace
            .lock()
            .await
            .hash(key)?
            .map(|h| h.clone())
            .unwrap_or_default())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, ParleyError> {
        self.keyspace.lock().await.set_add(key, member)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, ParleyError> {
        self.keyspace.lock().await.set_remove(key, member)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, ParleyError> {
        Ok(self
            .keyspace
            .lock()
            .await
            .set_members_mut(key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn execute(&self, unit: AtomicUnit) -> Result<bool, ParleyError> {
        let mut keyspace = self.keyspace.lock().await;
        for guard in &unit.guards {
            if !keyspace.holds(guard)? {
                trace!(?guard, "atomic unit refused");
                return Ok(false);
            }
        }
        // Reject shape mismatches before touching anything so a failing
        // unit applies nothing.
        for op in &unit.ops {
            if let Some((key, shape)) = Keyspace::required_shape(op) {
                keyspace.check_shape(key, shape)?;
            }
        }
        for op in &unit.ops {
            keyspace.apply(op)?;
        }
        Ok(true)
    }

    async fn purge_expired(&self) -> Result<usize, ParleyError> {
        let purged = self.keyspace.lock().await.purge();
        if purged > 0 {
            trace!(purged, "expired keys purged");
        }
        Ok(purged)
    }
}
