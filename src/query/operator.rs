use std::ops::Bound;
use crate::core::error::{Error, Result};
use crate::index::inverted::{Index, SearchContext};
use crate::index::sets::{IdSet, SetOps};
use crate::index::value::IndexKey;

/// Predicate combinators evaluated against one index's forward map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// Any of the values.
    Or(Vec<IndexKey>),
    /// All of the values; multi-valued indexes only.
    And(Vec<IndexKey>),
    /// Closed range; a missing bound is unbounded on that side.
    In {
        lower: Option<IndexKey>,
        upper: Option<IndexKey>,
    },
    /// Excludes objects holding any of the values.
    Not(Vec<IndexKey>),
}

/// Outcome of an operator. `applied` tells the index the running result has
/// already been folded into `ids`.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub ids: Option<IdSet>,
    pub applied: bool,
}

impl Evaluated {
    fn no_match() -> Self {
        Evaluated { ids: None, applied: true }
    }
}

impl Operator {
    pub fn or<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<IndexKey>,
    {
        Operator::Or(values.into_iter().map(Into::into).collect())
    }

    pub fn and<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<IndexKey>,
    {
        Operator::And(values.into_iter().map(Into::into).collect())
    }

    pub fn not<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<IndexKey>,
    {
        Operator::Not(values.into_iter().map(Into::into).collect())
    }

    pub fn range<K: Into<IndexKey>>(lower: Option<K>, upper: Option<K>) -> Self {
        Operator::In {
            lower: lower.map(Into::into),
            upper: upper.map(Into::into),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Or(_) => "or",
            Operator::And(_) => "and",
            Operator::In { .. } => "in",
            Operator::Not(_) => "not",
        }
    }

    /// Negative operators are subtracted from the final result instead of
    /// narrowing the running one.
    pub fn is_negative(&self) -> bool {
        matches!(self, Operator::Not(_))
    }

    pub fn keys(&self) -> Vec<&IndexKey> {
        match self {
            Operator::Or(values) | Operator::And(values) | Operator::Not(values) => values.iter().collect(),
            Operator::In { lower, upper } => lower.iter().chain(upper.iter()).collect(),
        }
    }

    pub fn map_keys<F: Fn(&IndexKey) -> IndexKey>(&self, f: F) -> Operator {
        match self {
            Operator::Or(values) => Operator::Or(values.iter().map(&f).collect()),
            Operator::And(values) => Operator::And(values.iter().map(&f).collect()),
            Operator::Not(values) => Operator::Not(values.iter().map(&f).collect()),
            Operator::In { lower, upper } => Operator::In {
                lower: lower.as_ref().map(&f),
                upper: upper.as_ref().map(&f),
            },
        }
    }

    /// Like `map_keys`, but a value may expand into several. Range bounds keep
    /// their first expansion, or the original key when it expands to nothing.
    pub fn flat_map_keys<F: Fn(&IndexKey) -> Vec<IndexKey>>(&self, f: F) -> Operator {
        let expand = |values: &Vec<IndexKey>| values.iter().flat_map(&f).collect::<Vec<_>>();
        match self {
            Operator::Or(values) => Operator::Or(expand(values)),
            Operator::And(values) => Operator::And(expand(values)),
            Operator::Not(values) => Operator::Not(expand(values)),
            Operator::In { lower, upper } => Operator::In {
                lower: lower.as_ref().map(|key| f(key).into_iter().next().unwrap_or_else(|| key.clone())),
                upper: upper.as_ref().map(|key| f(key).into_iter().next().unwrap_or_else(|| key.clone())),
            },
        }
    }

    pub fn evaluate(&self, index: &Index, running: Option<&IdSet>, ctx: &SearchContext) -> Result<Evaluated> {
        for key in self.keys() {
            index.check_key(key, ctx.catalog)?;
        }

        match self {
            Operator::Or(values) => Ok(Self::evaluate_or(index, values, running, ctx.or_intersect_threshold)),
            Operator::Not(values) => Ok(Evaluated {
                ids: SetOps::non_empty(SetOps::union_all(values.iter().filter_map(|v| index.get(v)))),
                applied: false,
            }),
            Operator::And(values) => {
                if !index.kind.is_multi_valued() {
                    return Err(Error::invalid_value(format!(
                        "and() needs a multi-valued index, '{}' of catalog '{}' is {:?}",
                        index.name, ctx.catalog, index.kind
                    )));
                }
                Ok(Self::evaluate_and(index, values, running))
            }
            Operator::In { lower, upper } => {
                let lower = lower.as_ref().map_or(Bound::Unbounded, Bound::Included);
                let upper = upper.as_ref().map_or(Bound::Unbounded, Bound::Included);
                if Self::empty_range(&lower, &upper) {
                    return Ok(Evaluated::no_match());
                }
                let ids = SetOps::union_all(index.by_value.range::<IndexKey, _>((lower, upper)).map(|(_, ids)| ids));
                Ok(Evaluated { ids: SetOps::non_empty(ids), applied: false })
            }
        }
    }

    fn evaluate_or(index: &Index, values: &[IndexKey], running: Option<&IdSet>, threshold: u64) -> Evaluated {
        let sets = values.iter().filter_map(|v| index.get(v));
        match running {
            Some(rs) if rs.len() < threshold => Evaluated {
                ids: SetOps::non_empty(SetOps::union_filtered(sets, rs)),
                applied: true,
            },
            _ => Evaluated {
                ids: SetOps::non_empty(SetOps::union_all(sets)),
                applied: false,
            },
        }
    }

    fn evaluate_and(index: &Index, values: &[IndexKey], running: Option<&IdSet>) -> Evaluated {
        let mut sets = Vec::with_capacity(values.len());
        for value in values {
            match index.get(value) {
                Some(ids) => sets.push(ids),
                None => return Evaluated::no_match(),
            }
        }
        if sets.is_empty() {
            return Evaluated::no_match();
        }
        Evaluated {
            ids: SetOps::intersect_smallest_first(sets, running),
            applied: true,
        }
    }

    // BTreeMap::range panics on an inverted range.
    fn empty_range(lower: &Bound<&IndexKey>, upper: &Bound<&IndexKey>) -> bool {
        match (lower, upper) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            _ => false,
        }
    }
}
