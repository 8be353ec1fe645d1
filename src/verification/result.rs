use super::EligibleIndex;
use crate::primitives::{Hash, KeyImage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Key images spent by a set of transactions, kept for each pushed block
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorState {
    pub spent_key_images: HashSet<KeyImage>,
}

impl ValidatorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key_image: &KeyImage) -> bool {
        self.spent_key_images.contains(key_image)
    }

    pub fn len(&self) -> usize {
        self.spent_key_images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spent_key_images.is_empty()
    }
}

/// Outcome of validating one or more transactions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransactionValidationResult {
    pub transactions: HashSet<Hash>,
    pub key_images: HashSet<KeyImage>,
    pub eligible_index: EligibleIndex,
    pub fee: u64,
}

impl TransactionValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges another result into this one. Fails without touching `self` when the key
    /// images overlap or the fees overflow.
    pub fn emplace(&mut self, other: TransactionValidationResult) -> bool {
        if !self.key_images.is_disjoint(&other.key_images) {
            return false;
        }
        let fee = match self.fee.checked_add(other.fee) {
            Some(fee) => fee,
            None => return false,
        };
        self.fee = fee;
        self.transactions.extend(other.transactions);
        self.key_images.extend(other.key_images);
        self.eligible_index = EligibleIndex::lower_bound(self.eligible_index, other.eligible_index);
        true
    }

    pub fn into_state(self) -> ValidatorState {
        ValidatorState {
            spent_key_images: self.key_images,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::hashset;

    fn result(hash: u8, key_images: &[u8], fee: u64, height: u32) -> TransactionValidationResult {
        TransactionValidationResult {
            transactions: hashset! {Hash([hash; 32])},
            key_images: key_images.iter().map(|k| KeyImage([*k; 32])).collect(),
            eligible_index: EligibleIndex::new(height, 0),
            fee,
        }
    }

    #[test]
    fn test_emplace() {
        let mut merged = TransactionValidationResult::new();
        assert!(merged.emplace(result(1, &[1, 2], 10, 5)));
        assert!(merged.emplace(result(2, &[3], 20, 2)));
        assert_eq!(merged.fee, 30);
        assert_eq!(merged.key_images.len(), 3);
        assert_eq!(merged.eligible_index, EligibleIndex::new(5, 0));

        // shares key image 2, nothing changes
        let before = merged.clone();
        assert!(!merged.emplace(result(3, &[2, 4], 5, 9)));
        assert_eq!(merged, before);
    }
}
