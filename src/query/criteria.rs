use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use crate::index::value::IndexKey;
use crate::query::operator::Operator;

/// Constraint on one indexed attribute: a literal value or an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    Value(IndexKey),
    Op(Operator),
}

impl Criterion {
    pub fn is_negative(&self) -> bool {
        matches!(self, Criterion::Op(op) if op.is_negative())
    }

    pub fn keys(&self) -> Vec<&IndexKey> {
        match self {
            Criterion::Value(key) => vec![key],
            Criterion::Op(op) => op.keys(),
        }
    }

    pub fn map_keys<F: Fn(&IndexKey) -> IndexKey>(&self, f: F) -> Criterion {
        match self {
            Criterion::Value(key) => Criterion::Value(f(key)),
            Criterion::Op(op) => Criterion::Op(op.map_keys(f)),
        }
    }
}

impl From<IndexKey> for Criterion {
    fn from(key: IndexKey) -> Self {
        Criterion::Value(key)
    }
}

impl From<Operator> for Criterion {
    fn from(op: Operator) -> Self {
        Criterion::Op(op)
    }
}

impl From<&str> for Criterion {
    fn from(s: &str) -> Self {
        Criterion::Value(IndexKey::from(s))
    }
}

impl From<String> for Criterion {
    fn from(s: String) -> Self {
        Criterion::Value(IndexKey::from(s))
    }
}

impl From<i64> for Criterion {
    fn from(n: i64) -> Self {
        Criterion::Value(IndexKey::from(n))
    }
}

impl From<bool> for Criterion {
    fn from(b: bool) -> Self {
        Criterion::Value(IndexKey::from(b))
    }
}

impl From<DateTime<Utc>> for Criterion {
    fn from(d: DateTime<Utc>) -> Self {
        Criterion::Value(IndexKey::from(d))
    }
}

/// Per-attribute constraints of one search, ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    constraints: BTreeMap<String, Criterion>,
}

impl Criteria {
    pub fn new() -> Self {
        Criteria::default()
    }

    pub fn with(mut self, attribute: &str, criterion: impl Into<Criterion>) -> Self {
        self.insert(attribute, criterion);
        self
    }

    pub fn insert(&mut self, attribute: &str, criterion: impl Into<Criterion>) {
        self.constraints.insert(attribute.to_string(), criterion.into());
    }

    pub fn get(&self, attribute: &str) -> Option<&Criterion> {
        self.constraints.get(attribute)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Criterion)> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// Caller's visibility set, supplied by the authorization layer. Merged into a
/// secure search as an extra `or` constraint on `attribute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visibility {
    pub attribute: String,
    pub allowed: Vec<IndexKey>,
}

impl Visibility {
    pub fn new<I, K>(attribute: &str, allowed: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<IndexKey>,
    {
        Visibility {
            attribute: attribute.to_string(),
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn criterion(&self) -> Criterion {
        Criterion::Op(Operator::Or(self.allowed.clone()))
    }
}
