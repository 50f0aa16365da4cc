use crate::catalog::catalog::Catalog;
use crate::core::error::{Error, Result};
use crate::index::inverted::Index;
use crate::query::criteria::Criterion;
use crate::query::types::CostModel;

/// One constraint, bound to its index and already in the index's key space.
#[derive(Debug)]
pub struct PlanStep<'a> {
    pub attribute: &'a str,
    pub index: &'a Index,
    pub criterion: Criterion,
    pub estimate: u64,
}

/// Positive steps narrow the running result, cheapest first; negative steps
/// are subtracted at the end.
#[derive(Debug)]
pub struct SearchPlan<'a> {
    pub positive: Vec<PlanStep<'a>>,
    pub negative: Vec<PlanStep<'a>>,
}

pub struct QueryPlanner<'a> {
    pub catalog: &'a Catalog,
    pub cost_model: CostModel,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        QueryPlanner {
            catalog,
            cost_model: CostModel,
        }
    }

    pub fn plan<I>(&self, constraints: I) -> Result<SearchPlan<'a>>
    where
        I: IntoIterator<Item = (&'a str, &'a Criterion)>,
    {
        let mut positive = Vec::new();
        let mut negative = Vec::new();

        for (attribute, criterion) in constraints {
            let index = self.catalog.indexes.get(attribute).ok_or_else(|| {
                Error::not_found(format!(
                    "catalog '{}' has no index '{}'",
                    self.catalog.class_name, attribute
                ))
            })?;
            let criterion = index.kind.prepare_search(criterion).into_owned();
            let estimate = self.cost_model.estimate(index, &criterion);
            let step = PlanStep { attribute, index, criterion, estimate };
            if step.criterion.is_negative() {
                negative.push(step);
            } else {
                positive.push(step);
            }
        }

        // Stable: equal estimates keep attribute order.
        positive.sort_by_key(|step| step.estimate);

        Ok(SearchPlan { positive, negative })
    }
}
