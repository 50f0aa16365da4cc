use serde::{Deserialize, Serialize};
use crate::mvcc::write_set::{SlotKey, WriteSet};

/// The two monotonic id counters of the root.
///
/// Values are never handed out twice, even after the object that held them is
/// deleted. Every allocation writes its counter slot, so two sessions that
/// allocate concurrently conflict at commit; the caller may retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub last_id: u64,
    pub last_temp_id: u64,
}

impl Counters {
    /// Next durable id (positive) or transient id (negative).
    pub fn allocate(&mut self, temp: bool, writes: &mut WriteSet) -> i64 {
        if temp {
            self.last_temp_id += 1;
            writes.write(SlotKey::LastTempId);
            -(self.last_temp_id as i64)
        } else {
            self.last_id += 1;
            writes.write(SlotKey::LastId);
            self.last_id as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_are_independent() {
        let mut counters = Counters::default();
        let mut writes = WriteSet::new();
        assert_eq!(counters.allocate(false, &mut writes), 1);
        assert_eq!(counters.allocate(true, &mut writes), -1);
        assert_eq!(counters.allocate(true, &mut writes), -2);
        assert_eq!(counters.allocate(false, &mut writes), 2);
        assert!(writes.writes.contains(&SlotKey::LastId));
        assert!(writes.writes.contains(&SlotKey::LastTempId));
    }
}
