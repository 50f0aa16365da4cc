use roaring::RoaringTreemap;

/// Sorted set of durable object ids.
pub type IdSet = RoaringTreemap;

/// Result-set algorithms shared by the operators and the catalog.
pub struct SetOps;

impl SetOps {
    /// Union of every set, without touching the inputs.
    pub fn union_all<'a, I>(sets: I) -> IdSet
    where
        I: IntoIterator<Item = &'a IdSet>,
    {
        let mut result = IdSet::new();
        for set in sets {
            result |= set;
        }
        result
    }

    /// Intersect each set with `filter` before the union. Cheaper than a full
    /// union followed by one intersection when `filter` is small.
    pub fn union_filtered<'a, I>(sets: I, filter: &IdSet) -> IdSet
    where
        I: IntoIterator<Item = &'a IdSet>,
    {
        let mut result = IdSet::new();
        for set in sets {
            result |= set & filter;
        }
        result
    }

    /// Successive intersection, smallest set first. `start` seeds the running
    /// result. Returns `None` as soon as the running result becomes empty.
    pub fn intersect_smallest_first(mut sets: Vec<&IdSet>, start: Option<&IdSet>) -> Option<IdSet> {
        sets.sort_by_key(|set| set.len());

        let mut iter = sets.into_iter();
        let mut running = match start {
            Some(start) => start.clone(),
            None => iter.next()?.clone(),
        };

        for set in iter {
            running &= set;
            if running.is_empty() {
                return None;
            }
        }

        if running.is_empty() { None } else { Some(running) }
    }

    pub fn non_empty(set: IdSet) -> Option<IdSet> {
        if set.is_empty() { None } else { Some(set) }
    }
}
