use serde::{Deserialize, Serialize};
use crate::index::inverted::Index;
use crate::index::value::IndexKey;
use crate::query::criteria::Criterion;
use crate::query::operator::Operator;

/// Sort order for search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Asc,   // Ascending: 0 → 9, A → Z
    Desc,  // Descending: 9 → 0, Z → A
}

/// Cardinality estimates used to order constraint evaluation.
#[derive(Debug, Clone, Default)]
pub struct CostModel;

impl CostModel {
    /// Upper bound on the number of ids a (prepared) criterion can produce.
    pub fn estimate(&self, index: &Index, criterion: &Criterion) -> u64 {
        let bucket = |key: &IndexKey| index.get(key).map_or(0, |ids| ids.len());
        match criterion {
            Criterion::Value(key) => bucket(key),
            Criterion::Op(Operator::Or(values)) | Criterion::Op(Operator::Not(values)) => {
                values.iter().map(bucket).sum()
            }
            Criterion::Op(Operator::And(values)) => values.iter().map(bucket).min().unwrap_or(0),
            // A range may cover the whole index; evaluate it late.
            Criterion::Op(Operator::In { .. }) => index.by_object.len() as u64,
        }
    }
}
