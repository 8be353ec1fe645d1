use serde::{Deserialize, Serialize};

/// Least chain state (block index and timestamp) at which a transaction becomes includable
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EligibleIndex {
    pub height: u32,
    pub timestamp: u64,
}

impl EligibleIndex {
    pub const ALWAYS: EligibleIndex = EligibleIndex {
        height: 0,
        timestamp: 0,
    };

    pub const NEVER: EligibleIndex = EligibleIndex {
        height: u32::MAX,
        timestamp: u64::MAX,
    };

    pub const fn new(height: u32, timestamp: u64) -> Self {
        Self { height, timestamp }
    }

    /// Componentwise maximum, satisfied exactly when both inputs are
    pub fn lower_bound(a: EligibleIndex, b: EligibleIndex) -> EligibleIndex {
        EligibleIndex {
            height: std::cmp::max(a.height, b.height),
            timestamp: std::cmp::max(a.timestamp, b.timestamp),
        }
    }

    pub fn is_satisfied_by(&self, index: &EligibleIndex) -> bool {
        self.height <= index.height && self.timestamp <= index.timestamp
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_satisfied() {
        let index = EligibleIndex::new(10, 1_000);
        assert!(index.is_satisfied_by(&EligibleIndex::new(10, 1_000)));
        assert!(index.is_satisfied_by(&EligibleIndex::new(11, 2_000)));
        assert!(!index.is_satisfied_by(&EligibleIndex::new(9, 2_000)));
        assert!(!index.is_satisfied_by(&EligibleIndex::new(11, 999)));

        assert!(EligibleIndex::ALWAYS.is_satisfied_by(&EligibleIndex::ALWAYS));
        assert!(!EligibleIndex::NEVER.is_satisfied_by(&EligibleIndex::new(u32::MAX - 1, 0)));
    }

    #[test]
    fn test_lower_bound() {
        let a = EligibleIndex::new(10, 0);
        let b = EligibleIndex::new(0, 500);
        let bound = EligibleIndex::lower_bound(a, b);
        assert_eq!(bound, EligibleIndex::new(10, 500));
        assert_eq!(EligibleIndex::lower_bound(bound, EligibleIndex::ALWAYS), bound);
    }
}
