// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Guarded multi-key units applied by the state store as one indivisible step.
//!
//! An [`AtomicUnit`] is a list of [`Guard`]s followed by a list of [`Op`]s.
//! The store evaluates every guard and, only if all of them hold, applies
//! every op with no other store operation interleaved. A unit whose guards
//! fail leaves the store untouched. Units serialize to JSON so network
//! backends can ship them to a server-side script.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A precondition checked before any op is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "guard", rename_all = "snake_case")]
pub enum Guard {
    /// The string at `key` is one of `values`. A missing key reads as
    /// `default`, or fails the guard when there is no default.
    ValueIn {
        key: String,
        values: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// `key` exists.
    Exists { key: String },
    /// `key` does not exist.
    Absent { key: String },
    /// The hash at `key` has no `field` (a missing hash has no fields).
    HashFieldAbsent { key: String, field: String },
}

impl Guard {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Guard::ValueIn {
            key: key.into(),
            values: vec![value.into()],
            default: None,
        }
    }

    pub fn value_in(
        key: impl Into<String>,
        values: Vec<String>,
        default: Option<&str>,
    ) -> Self {
        Guard::ValueIn {
            key: key.into(),
            values,
            default: default.map(str::to_string),
        }
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Guard::Exists { key: key.into() }
    }

    pub fn absent(key: impl Into<String>) -> Self {
        Guard::Absent { key: key.into() }
    }

    pub fn hash_field_absent(key: impl Into<String>, field: impl Into<String>) -> Self {
        Guard::HashFieldAbsent {
            key: key.into(),
            field: field.into(),
        }
    }
}

/// A mutation applied once every guard holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Set {
        key: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl_secs: Option<u64>,
    },
    Delete { key: String },
    Expire { key: String, ttl_secs: u64 },
    ListPushBack { key: String, value: String },
    ListPushFront { key: String, value: String },
    /// Removes every occurrence of `value`.
    ListRemove { key: String, value: String },
    HashSet { key: String, fields: Vec<(String, String)> },
    HashIncr { key: String, field: String, by: i64 },
    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
}

impl Op {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Op::Set {
            key: key.into(),
            value: value.into(),
            ttl_secs: None,
        }
    }

    pub fn set_with_ttl(key: impl Into<String>, value: impl Into<String>, ttl: Duration) -> Self {
        Op::Set {
            key: key.into(),
            value: value.into(),
            ttl_secs: Some(ttl_secs(ttl)),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Op::Delete { key: key.into() }
    }

    pub fn expire(key: impl Into<String>, ttl: Duration) -> Self {
        Op::Expire {
            key: key.into(),
            ttl_secs: ttl_secs(ttl),
        }
    }
}

/// Store TTLs are whole seconds; anything shorter rounds up to one.
pub fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Guards plus ops, applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicUnit {
    pub guards: Vec<Guard>,
    pub ops: Vec<Op>,
}

impl AtomicUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn ops(mut self, ops: impl IntoIterator<Item = Op>) -> Self {
        self.ops.extend(ops);
        self
    }

    pub fn guards(mut self, guards: impl IntoIterator<Item = Guard>) -> Self {
        self.guards.extend(guards);
        self
    }

    /// JSON form shipped to script-capable backends.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_guards_and_ops() {
        let unit = AtomicUnit::new()
            .guard(Guard::absent("k"))
            .op(Op::set("k", "v"))
            .ops([Op::delete("a"), Op::delete("b")]);
        assert_eq!(unit.guards.len(), 1);
        assert_eq!(unit.ops.len(), 3);
    }

    #[test]
    fn json_shape_is_tagged_and_sparse() {
        let unit = AtomicUnit::new()
            .guard(Guard::equals("user:1:state", "SEARCHING"))
            .op(Op::set("user:1:state", "IDLE"));
        let json: serde_json::Value = serde_json::from_str(&unit.to_json().unwrap()).unwrap();

        assert_eq!(json["guards"][0]["guard"], "value_in");
        assert!(json["guards"][0].get("default").is_none());
        assert_eq!(json["ops"][0]["op"], "set");
        assert!(json["ops"][0].get("ttl_secs").is_none());
    }

    #[test]
    fn hash_fields_encode_as_pairs() {
        let unit = AtomicUnit::new().op(Op::HashSet {
            key: "h".into(),
            fields: vec![("a".into(), "1".into())],
        });
        let json: serde_json::Value = serde_json::from_str(&unit.to_json().unwrap()).unwrap();
        assert_eq!(json["ops"][0]["fields"][0][0], "a");
        assert_eq!(json["ops"][0]["fields"][0][1], "1");
    }

    #[test]
    fn sub_second_ttl_rounds_up() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(60)), 60);
    }
}
