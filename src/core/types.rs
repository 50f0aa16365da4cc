use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::core::config::BUCKET_COUNT;
use crate::lock::page_lock::PageLock;

/// Bucket key of a durable object: selects its second-level shard.
pub fn ikey(id: u64) -> u32 {
    (id % BUCKET_COUNT) as u32
}

/// Identifier of a stored object.
///
/// Durable objects own a positive integer, transient ones a negative integer.
/// A durable object may also be reachable through a secondary string id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectId {
    Durable(u64),
    Temp(i64),
    Named(String),
}

impl ObjectId {
    /// Numeric strings are coerced to integer ids; anything else is a secondary id.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(n) => ObjectId::from_int(n),
            Err(_) => ObjectId::Named(raw.to_string()),
        }
    }

    pub fn from_int(n: i64) -> Self {
        if n < 0 {
            ObjectId::Temp(n)
        } else {
            ObjectId::Durable(n as u64)
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ObjectId::Durable(id) => Some(*id as i64),
            ObjectId::Temp(id) => Some(*id),
            ObjectId::Named(_) => None,
        }
    }

    pub fn ikey(&self) -> Option<u32> {
        match self {
            ObjectId::Durable(id) => Some(ikey(*id)),
            _ => None,
        }
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, ObjectId::Temp(_))
    }
}

impl From<u64> for ObjectId {
    fn from(id: u64) -> Self {
        ObjectId::Durable(id)
    }
}

impl From<i64> for ObjectId {
    fn from(id: i64) -> Self {
        ObjectId::from_int(id)
    }
}

impl From<&str> for ObjectId {
    fn from(raw: &str) -> Self {
        ObjectId::parse(raw)
    }
}

impl From<String> for ObjectId {
    fn from(raw: String) -> Self {
        ObjectId::parse(&raw)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObjectId::Durable(id) => write!(f, "{}", id),
            ObjectId::Temp(id) => write!(f, "{}", id),
            ObjectId::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Attribute value carried by a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Ref(u64),
    List(Vec<FieldValue>),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(d: DateTime<Utc>) -> Self {
        FieldValue::Date(d)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        FieldValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// A domain object as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Positive once confirmed, negative while transient.
    pub iid: i64,
    pub secondary_id: Option<String>,
    pub class_name: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub locks: BTreeMap<String, PageLock>,
    pub created: DateTime<Utc>,
}

impl ObjectRecord {
    pub fn new(iid: i64, class_name: &str, secondary_id: Option<String>) -> Self {
        ObjectRecord {
            iid,
            secondary_id,
            class_name: class_name.to_string(),
            fields: BTreeMap::new(),
            locks: BTreeMap::new(),
            created: Utc::now(),
        }
    }

    pub fn id(&self) -> ObjectId {
        ObjectId::from_int(self.iid)
    }

    pub fn is_temp(&self) -> bool {
        self.iid < 0
    }

    pub fn durable_id(&self) -> Option<u64> {
        if self.iid > 0 { Some(self.iid as u64) } else { None }
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn remove_field(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }
}
