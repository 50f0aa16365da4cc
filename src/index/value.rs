use std::collections::BTreeSet;
use std::fmt;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Deserialize};
use crate::core::types::FieldValue;

/// Scalar type an index is declared over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Text,
    Integer,
    Boolean,
    Date,
    Ref,
}

/// A single forward-map key. Ordering is per variant, so ranges only make
/// sense between keys of the index's own `KeyType`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Ref(u64),
}

impl IndexKey {
    pub fn key_type(&self) -> KeyType {
        match self {
            IndexKey::Text(_) => KeyType::Text,
            IndexKey::Integer(_) => KeyType::Integer,
            IndexKey::Boolean(_) => KeyType::Boolean,
            IndexKey::Date(_) => KeyType::Date,
            IndexKey::Ref(_) => KeyType::Ref,
        }
    }

    /// Scalar field values map one-to-one; lists have no single key.
    pub fn from_field(value: &FieldValue) -> Option<IndexKey> {
        match value {
            FieldValue::Text(s) => Some(IndexKey::Text(s.clone())),
            FieldValue::Integer(n) => Some(IndexKey::Integer(*n)),
            FieldValue::Boolean(b) => Some(IndexKey::Boolean(*b)),
            FieldValue::Date(d) => Some(IndexKey::Date(*d)),
            FieldValue::Ref(id) => Some(IndexKey::Ref(*id)),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            IndexKey::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for IndexKey {
    fn from(s: &str) -> Self {
        IndexKey::Text(s.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(s: String) -> Self {
        IndexKey::Text(s)
    }
}

impl From<i64> for IndexKey {
    fn from(n: i64) -> Self {
        IndexKey::Integer(n)
    }
}

impl From<bool> for IndexKey {
    fn from(b: bool) -> Self {
        IndexKey::Boolean(b)
    }
}

impl From<DateTime<Utc>> for IndexKey {
    fn from(d: DateTime<Utc>) -> Self {
        IndexKey::Date(d)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IndexKey::Text(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        _ => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            IndexKey::Integer(n) => write!(f, "{}", n),
            IndexKey::Boolean(b) => write!(f, "{}", b),
            IndexKey::Date(d) => write!(f, "d\"{}\"", d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            IndexKey::Ref(id) => write!(f, "#{}", id),
        }
    }
}

/// Value about to be stored in an index, as produced by value extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    Single(IndexKey),
    Multiple(Vec<IndexKey>),
}

impl IndexValue {
    pub fn is_multiple(&self) -> bool {
        matches!(self, IndexValue::Multiple(_))
    }

    pub fn keys(&self) -> &[IndexKey] {
        match self {
            IndexValue::Single(key) => std::slice::from_ref(key),
            IndexValue::Multiple(keys) => keys,
        }
    }

    pub fn into_stored(self) -> StoredValue {
        match self {
            IndexValue::Single(key) => StoredValue::Single(key),
            IndexValue::Multiple(keys) => StoredValue::Multiple(keys.into_iter().collect()),
        }
    }
}

/// Value held in an index's reverse map. Multi-valued entries are kept as an
/// ordered set so that equality does not depend on extraction order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredValue {
    Single(IndexKey),
    Multiple(BTreeSet<IndexKey>),
}

impl StoredValue {
    pub fn is_multiple(&self) -> bool {
        matches!(self, StoredValue::Multiple(_))
    }

    pub fn keys(&self) -> Vec<&IndexKey> {
        match self {
            StoredValue::Single(key) => vec![key],
            StoredValue::Multiple(keys) => keys.iter().collect(),
        }
    }

    /// First key in index order; used when sorting results by this value.
    pub fn sort_key(&self) -> Option<&IndexKey> {
        match self {
            StoredValue::Single(key) => Some(key),
            StoredValue::Multiple(keys) => keys.iter().next(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            StoredValue::Single(_) => false,
            StoredValue::Multiple(keys) => keys.is_empty(),
        }
    }
}
