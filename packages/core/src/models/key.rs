//! Opaque identifiers for nodes and trees.
//!
//! Node ids, parent references and tree ids can be integers (sequential
//! tables), or text (UUID, ULID, or any other string key). `Key` keeps both
//! shapes behind one type so the tree engine never cares which one a table
//! uses.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;
use uuid::Uuid;

/// Identity of a node or of a tree partition
///
/// # Examples
///
/// ```rust
/// use nodespace_nested_set::models::Key;
///
/// let numeric = Key::from(42);
/// let textual = Key::from("0190f5b2-3c1e-7a55-8a9e-5b1f0c2d9e11");
///
/// assert_eq!(numeric.as_int(), Some(42));
/// assert_eq!(textual.as_int(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl Key {
    /// Integer value, if this key is numeric
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    /// Text value, if this key is a string key
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Int(_) => None,
            Self::Text(value) => Some(value),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{}", value),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&Key> for Key {
    fn from(value: &Key) -> Self {
        value.clone()
    }
}

impl From<Uuid> for Key {
    fn from(value: Uuid) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Ulid> for Key {
    fn from(value: Ulid) -> Self {
        Self::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_inner_value() {
        assert_eq!(Key::from(7).to_string(), "7");
        assert_eq!(Key::from("node-a").to_string(), "node-a");
    }

    #[test]
    fn test_serde_is_untagged() {
        let int_key: Key = serde_json::from_str("12").unwrap();
        let text_key: Key = serde_json::from_str("\"abc\"").unwrap();

        assert_eq!(int_key, Key::Int(12));
        assert_eq!(text_key, Key::Text("abc".to_string()));
        assert_eq!(serde_json::to_string(&int_key).unwrap(), "12");
    }

    #[test]
    fn test_uuid_and_ulid_become_text_keys() {
        let uuid = Uuid::now_v7();
        let ulid = Ulid::new();

        assert_eq!(Key::from(uuid).as_text(), Some(uuid.to_string().as_str()));
        assert_eq!(Key::from(ulid).as_text(), Some(ulid.to_string().as_str()));
    }
}
