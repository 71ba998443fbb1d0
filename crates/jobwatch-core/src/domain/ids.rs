//! Domain identifiers (strongly-typed IDs).
//!
//! # ExecutionId
//! Execution Gateway が払い出す不透明な文字列です。
//! 中身の構造（UUID / ULID など）は仮定せず、比較と表示だけを提供します。
//!
//! # DisplayId
//! Poller が表示先（notebook のセル、ターミナルなど）を更新するためのハンドル。
//! こちらはローカルで生成するので ULID を使います。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a remote execution (the thing a `Job` tracks).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ExecutionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Handle of a published display (one per watch).
///
/// Display で "display-" プレフィックスを付けます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DisplayId(Ulid);

impl DisplayId {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_id_is_opaque() {
        let id = ExecutionId::new("exec-001");
        assert_eq!(id.as_str(), "exec-001");
        assert_eq!(id.to_string(), "exec-001");
        assert_eq!(id, ExecutionId::from("exec-001"));
    }

    #[test]
    fn execution_id_serializes_as_plain_string() {
        let id = ExecutionId::new("abc");
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"abc\"");
    }

    #[test]
    fn display_ids_are_unique_and_prefixed() {
        let a = DisplayId::generate();
        let b = DisplayId::generate();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("display-"));
    }
}
