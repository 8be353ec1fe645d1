use super::segment::{CachedBlockInfo, CachedTransactionInfo, PushedBlockInfo, Segment, SegmentId};
use super::tree::ChainTree;
use crate::error::ExtractOutputKeysError;
use crate::primitives::{CachedTransaction, Hash, KeyImage, PaymentId, PublicKey};
use crate::protocol::DifficultyAlgorithm;
use crate::util::now;
use std::collections::HashSet;
use std::sync::Arc;

/// An output referenced by a ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyOutputInfo {
    pub key: PublicKey,
    pub unlock_time: u64,
    pub transaction_hash: Hash,
}

/// Read access to the chain ending at the top of a segment. Every query transparently
/// continues into the parent segments.
#[derive(Clone, Copy)]
pub struct SegmentView<'a> {
    tree: &'a ChainTree,
    id: SegmentId,
}

impl<'a> SegmentView<'a> {
    pub(crate) fn new(tree: &'a ChainTree, id: SegmentId) -> Self {
        Self { tree, id }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// This segment followed by its ancestors down to the root
    pub fn segments(&self) -> impl Iterator<Item = &'a Segment> + 'a {
        let tree = self.tree;
        let mut next = Some(self.id);
        std::iter::from_fn(move || {
            let segment = tree.segment(next?)?;
            next = segment.parent;
            Some(segment)
        })
    }

    fn segment_for_index(&self, index: u32) -> Option<&'a Segment> {
        self.segments().find(|segment| segment.contains_index(index))
    }

    pub fn top_index(&self) -> u32 {
        self.tree
            .segment(self.id)
            .map_or(0, |segment| segment.top_index())
    }

    pub fn top_block(&self) -> Option<&'a CachedBlockInfo> {
        self.get_block_info(self.top_index())
    }

    pub fn top_hash(&self) -> Hash {
        self.top_block().map_or_else(Hash::zero, |info| info.hash)
    }

    pub fn get_block_info(&self, index: u32) -> Option<&'a CachedBlockInfo> {
        self.segment_for_index(index)?.block_info(index)
    }

    pub fn get_block_hash(&self, index: u32) -> Option<Hash> {
        self.get_block_info(index).map(|info| info.hash)
    }

    pub fn get_block_index(&self, hash: &Hash) -> Option<u32> {
        self.segments()
            .find_map(|segment| segment.block_index_by_hash.get(hash).copied())
    }

    pub fn has_block(&self, hash: &Hash) -> bool {
        self.get_block_index(hash).is_some()
    }

    pub fn get_pushed_block_info(&self, index: u32) -> Option<&'a PushedBlockInfo> {
        self.segment_for_index(index)?.pushed_info(index)
    }

    /// Block infos for `start..end` in chain order, stops at the top
    pub fn get_block_infos(&self, start: u32, end: u32) -> Vec<&'a CachedBlockInfo> {
        (start..end)
            .map_while(|index| self.get_block_info(index))
            .collect()
    }

    pub fn get_block_hashes(&self, start: u32, max: usize) -> Vec<Hash> {
        let end = start.saturating_add(max as u32);
        self.get_block_infos(start, end)
            .into_iter()
            .map(|info| info.hash)
            .collect()
    }

    /// All transactions of a block, coinbase first
    pub fn get_block_transactions(&self, index: u32) -> Vec<Arc<CachedTransaction>> {
        let segment = match self.segment_for_index(index) {
            Some(segment) => segment,
            None => return vec![],
        };
        segment
            .transaction_hashes(index)
            .unwrap_or_default()
            .iter()
            .filter_map(|hash| segment.transactions.get(hash))
            .map(|info| Arc::clone(&info.transaction))
            .collect()
    }

    /// Whether the key image was spent at or below `block_index`
    pub fn check_if_spent(&self, key_image: &KeyImage, block_index: u32) -> bool {
        self.segments().any(|segment| {
            segment
                .spent_key_images
                .get(key_image)
                .map_or(false, |index| *index <= block_index)
        })
    }

    pub fn check_if_any_spent(&self, key_images: &HashSet<KeyImage>, block_index: u32) -> bool {
        key_images
            .iter()
            .any(|key_image| self.check_if_spent(key_image, block_index))
    }

    fn locate_output(
        &self,
        amount: u64,
        global_index: u32,
        block_index: u32,
    ) -> Result<KeyOutputInfo, ExtractOutputKeysError> {
        for segment in self.segments() {
            let outputs = match segment.key_outputs.get(&amount) {
                Some(outputs) => outputs,
                None => continue,
            };
            if global_index < outputs.start_index {
                continue;
            }
            let packed = outputs
                .outputs
                .get((global_index - outputs.start_index) as usize)
                .ok_or(ExtractOutputKeysError::InvalidGlobalIndex)?;
            if packed.block_index > block_index {
                return Err(ExtractOutputKeysError::InvalidGlobalIndex);
            }
            let transaction_hash = segment
                .transaction_hashes(packed.block_index)
                .and_then(|hashes| hashes.get(packed.transaction_index as usize))
                .ok_or(ExtractOutputKeysError::InvalidGlobalIndex)?;
            let info = segment
                .transactions
                .get(transaction_hash)
                .ok_or(ExtractOutputKeysError::InvalidGlobalIndex)?;
            let output = info
                .transaction
                .transaction()
                .outputs
                .get(packed.output_index as usize)
                .ok_or(ExtractOutputKeysError::InvalidGlobalIndex)?;
            return Ok(KeyOutputInfo {
                key: output.key,
                unlock_time: info.transaction.transaction().unlock_time,
                transaction_hash: *transaction_hash,
            });
        }
        Err(ExtractOutputKeysError::InvalidGlobalIndex)
    }

    /// Resolves global indexes of an amount to outputs created at or below `block_index`
    pub fn extract_key_outputs(
        &self,
        amount: u64,
        block_index: u32,
        global_indexes: &[u32],
    ) -> Result<Vec<KeyOutputInfo>, ExtractOutputKeysError> {
        global_indexes
            .iter()
            .map(|global_index| self.locate_output(amount, *global_index, block_index))
            .collect()
    }

    /// Like [`extract_key_outputs`](Self::extract_key_outputs) but also requires every
    /// output to be unlocked, at `timestamp` when given or at `block_index` otherwise
    pub fn extract_key_output_keys(
        &self,
        amount: u64,
        block_index: u32,
        timestamp: Option<u64>,
        global_indexes: &[u32],
    ) -> Result<Vec<PublicKey>, ExtractOutputKeysError> {
        let outputs = self.extract_key_outputs(amount, block_index, global_indexes)?;
        let currency = self.tree.currency();
        outputs
            .into_iter()
            .map(|output| {
                let unlocked = match timestamp {
                    Some(timestamp) => currency.is_spend_time_unlocked_explicit(
                        output.unlock_time,
                        block_index,
                        timestamp,
                    ),
                    None => self.is_spend_time_unlocked_at(output.unlock_time, block_index),
                };
                if unlocked {
                    Ok(output.key)
                } else {
                    Err(ExtractOutputKeysError::OutputLocked)
                }
            })
            .collect()
    }

    /// Number of outputs of an amount created at or below `block_index`
    pub fn get_key_outputs_count_for_amount(&self, amount: u64, block_index: u32) -> u32 {
        for segment in self.segments() {
            if segment.start_index > block_index {
                continue;
            }
            if let Some(outputs) = segment.key_outputs.get(&amount) {
                let count = outputs
                    .outputs
                    .partition_point(|output| output.block_index <= block_index);
                return outputs.start_index + count as u32;
            }
        }
        0
    }

    /// Number of unlocked outputs of an amount at `block_index`, counting stops at `threshold`
    pub fn get_available_mixins_count(&self, amount: u64, block_index: u32, threshold: u64) -> u64 {
        let count = self.get_key_outputs_count_for_amount(amount, block_index);
        let mut available = 0;
        for global_index in (0..count).rev() {
            if available >= threshold {
                break;
            }
            if let Ok(output) = self.locate_output(amount, global_index, block_index) {
                if self.is_spend_time_unlocked_at(output.unlock_time, block_index) {
                    available += 1;
                }
            }
        }
        available
    }

    /// Height locks compare with `block_index`. Timestamp locks use the block's timestamp,
    /// or the current time for indexes above the top.
    pub fn is_spend_time_unlocked_at(&self, unlock_time: u64, block_index: u32) -> bool {
        let currency = self.tree.currency();
        if currency.is_height_lock(unlock_time) {
            return currency.is_spend_time_unlocked_explicit(unlock_time, block_index, 0);
        }
        let timestamp = if block_index > self.top_index() {
            now()
        } else {
            self.get_block_info(block_index)
                .map_or_else(now, |info| info.timestamp)
        };
        currency.is_spend_time_unlocked_explicit(unlock_time, block_index, timestamp)
    }

    fn last_values<T>(
        &self,
        count: usize,
        block_index: u32,
        use_genesis: bool,
        value: impl Fn(&CachedBlockInfo) -> T,
    ) -> Vec<T> {
        let first = if use_genesis { 0 } else { 1 };
        let start = std::cmp::max(
            first,
            (block_index as u64 + 1).saturating_sub(count as u64) as u32,
        );
        if start > block_index {
            return vec![];
        }
        self.get_block_infos(start, block_index + 1)
            .into_iter()
            .map(value)
            .collect()
    }

    pub fn get_last_timestamps(&self, count: usize, block_index: u32, use_genesis: bool) -> Vec<u64> {
        self.last_values(count, block_index, use_genesis, |info| info.timestamp)
    }

    pub fn get_last_blocks_sizes(
        &self,
        count: usize,
        block_index: u32,
        use_genesis: bool,
    ) -> Vec<u64> {
        self.last_values(count, block_index, use_genesis, |info| info.block_size)
    }

    pub fn get_last_cumulative_difficulties(
        &self,
        count: usize,
        block_index: u32,
        use_genesis: bool,
    ) -> Vec<u64> {
        self.last_values(count, block_index, use_genesis, |info| {
            info.cumulative_difficulty
        })
    }

    pub fn get_already_generated_coins(&self, index: u32) -> u64 {
        self.get_block_info(index)
            .map_or(0, |info| info.already_generated_coins)
    }

    pub fn get_already_generated_transactions(&self, index: u32) -> u64 {
        self.get_block_info(index)
            .map_or(0, |info| info.already_generated_transactions)
    }

    /// Difficulty of the block at `index`
    pub fn get_block_difficulty(&self, index: u32) -> Option<u64> {
        let cumulative = self.get_block_info(index)?.cumulative_difficulty;
        let previous = match index {
            0 => 0,
            _ => self.get_block_info(index - 1)?.cumulative_difficulty,
        };
        Some(cumulative - previous)
    }

    /// First block index whose timestamp is at least `timestamp`
    pub fn get_timestamp_lower_bound_block_index(&self, timestamp: u64) -> Option<u32> {
        (0..=self.top_index()).find(|index| {
            self.get_block_info(*index)
                .map_or(false, |info| info.timestamp >= timestamp)
        })
    }

    /// Difficulty required for the block after `block_index`
    pub fn get_difficulty_for_next_block(
        &self,
        algorithm: &dyn DifficultyAlgorithm,
        version: u8,
        block_index: u32,
    ) -> u64 {
        let currency = self.tree.currency();
        let params = currency.difficulty_params(version);
        let count = params.window as usize + 1;
        let timestamps = self.get_last_timestamps(count, block_index, false);
        let difficulties = self.get_last_cumulative_difficulties(count, block_index, false);
        if timestamps.len() < count {
            return params.initial;
        }
        algorithm.next_difficulty(&timestamps, &difficulties, params.window, currency.block_time)
    }

    pub fn get_transaction(&self, hash: &Hash) -> Option<&'a CachedTransactionInfo> {
        self.segments()
            .find_map(|segment| segment.transactions.get(hash))
    }

    pub fn has_transaction(&self, hash: &Hash) -> bool {
        self.get_transaction(hash).is_some()
    }

    pub fn get_transaction_global_indexes(&self, hash: &Hash) -> Option<Vec<u32>> {
        self.get_transaction(hash)
            .map(|info| info.global_indexes.clone())
    }

    pub fn get_transaction_hashes_by_payment_id(&self, payment_id: &PaymentId) -> Vec<Hash> {
        let mut hashes: Vec<Hash> = self
            .segments()
            .filter_map(|segment| segment.payment_ids.get(payment_id))
            .flatten()
            .copied()
            .collect();
        hashes.sort();
        hashes
    }
}
