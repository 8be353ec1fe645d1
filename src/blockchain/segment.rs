use crate::primitives::{CachedTransaction, Hash, KeyImage, PaymentId, RawBlock};
use crate::verification::ValidatorState;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;

/// Index of a segment in the chain tree arena
pub type SegmentId = usize;

/// Transaction positions inside a block are packed into 16 bits
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = u16::MAX as usize + 1;
/// Output positions inside a transaction are packed into 16 bits
pub const MAX_OUTPUTS_PER_TRANSACTION: usize = u16::MAX as usize + 1;

/// Per block data every query needs, cumulative values include the block itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlockInfo {
    pub hash: Hash,
    pub timestamp: u64,
    pub block_size: u64,
    pub cumulative_difficulty: u64,
    pub already_generated_coins: u64,
    pub already_generated_transactions: u64,
}

/// Everything needed to replay or persist a block
#[derive(Debug, Clone)]
pub struct PushedBlockInfo {
    pub raw_block: RawBlock,
    pub validator_state: ValidatorState,
    pub block_size: u64,
    pub generated_coins: u64,
    pub block_difficulty: u64,
}

#[derive(Debug, Clone)]
pub struct CachedTransactionInfo {
    pub block_index: u32,
    pub transaction_index: u16,
    pub transaction: Arc<CachedTransaction>,
    /// Global index of each output within its amount
    pub global_indexes: Vec<u32>,
}

/// Location of an output in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedOutIndex {
    pub block_index: u32,
    pub transaction_index: u16,
    pub output_index: u16,
}

/// Outputs of one amount created in a segment. Global indexes continue from the parent
/// chain, the first output here has global index `start_index`.
#[derive(Debug, Clone, Default)]
pub struct OutputsForAmount {
    pub start_index: u32,
    pub outputs: Vec<PackedOutIndex>,
}

/// A contiguous run of blocks. Blocks below `start_index` live in the parent chain and
/// every child starts right after the last block of this segment.
#[derive(Debug)]
pub struct Segment {
    pub(crate) start_index: u32,
    pub(crate) parent: Option<SegmentId>,
    pub(crate) children: Vec<SegmentId>,
    /// Creation order, older chains win difficulty ties
    pub(crate) sequence: u64,
    pub(crate) blocks: Vec<CachedBlockInfo>,
    pub(crate) pushed: Vec<PushedBlockInfo>,
    /// Transaction hashes of each block, coinbase first
    pub(crate) block_transactions: Vec<Vec<Hash>>,
    pub(crate) block_index_by_hash: HashMap<Hash, u32>,
    pub(crate) spent_key_images: HashMap<KeyImage, u32>,
    pub(crate) transactions: HashMap<Hash, CachedTransactionInfo>,
    pub(crate) key_outputs: HashMap<u64, OutputsForAmount>,
    pub(crate) payment_ids: HashMap<PaymentId, Vec<Hash>>,
}

impl Segment {
    pub fn new(start_index: u32, parent: Option<SegmentId>, sequence: u64) -> Self {
        Self {
            start_index,
            parent,
            children: vec![],
            sequence,
            blocks: vec![],
            pushed: vec![],
            block_transactions: vec![],
            block_index_by_hash: HashMap::new(),
            spent_key_images: HashMap::new(),
            transactions: HashMap::new(),
            key_outputs: HashMap::new(),
            payment_ids: HashMap::new(),
        }
    }

    pub fn start_index(&self) -> u32 {
        self.start_index
    }

    /// One past the last block of the segment
    pub fn end_index(&self) -> u32 {
        self.start_index + self.blocks.len() as u32
    }

    /// Last block, for an empty segment the parent's last block
    pub fn top_index(&self) -> u32 {
        self.end_index().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn parent(&self) -> Option<SegmentId> {
        self.parent
    }

    pub fn children(&self) -> &[SegmentId] {
        &self.children
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn contains_index(&self, index: u32) -> bool {
        index >= self.start_index && index < self.end_index()
    }

    pub fn block_info(&self, index: u32) -> Option<&CachedBlockInfo> {
        if !self.contains_index(index) {
            return None;
        }
        self.blocks.get((index - self.start_index) as usize)
    }

    pub fn pushed_info(&self, index: u32) -> Option<&PushedBlockInfo> {
        if !self.contains_index(index) {
            return None;
        }
        self.pushed.get((index - self.start_index) as usize)
    }

    pub fn transaction_hashes(&self, index: u32) -> Option<&[Hash]> {
        if !self.contains_index(index) {
            return None;
        }
        self.block_transactions
            .get((index - self.start_index) as usize)
            .map(Vec::as_slice)
    }

    pub fn top_block(&self) -> Option<&CachedBlockInfo> {
        self.blocks.last()
    }

    /// Appends a block on top. `transactions` holds the coinbase first, `output_counts` the
    /// number of outputs per amount in the parent chain for amounts this segment hasn't
    /// seen yet. Returns None, leaving the segment untouched, when a position doesn't fit
    /// its packed width.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn push_block(
        &mut self,
        info: CachedBlockInfo,
        pushed: PushedBlockInfo,
        transactions: Vec<Arc<CachedTransaction>>,
        output_counts: &HashMap<u64, u32>,
    ) -> Option<()> {
        let block_index = self.end_index();
        debug_assert!(!self.block_index_by_hash.contains_key(&info.hash));

        if transactions.len() > MAX_TRANSACTIONS_PER_BLOCK
            || transactions
                .iter()
                .any(|tx| tx.transaction().outputs.len() > MAX_OUTPUTS_PER_TRANSACTION)
        {
            return None;
        }

        for key_image in &pushed.validator_state.spent_key_images {
            self.spent_key_images.insert(*key_image, block_index);
        }

        let mut hashes = Vec::with_capacity(transactions.len());
        for (transaction_index, transaction) in transactions.into_iter().enumerate() {
            let transaction_index = u16::try_from(transaction_index).ok()?;
            let hash = transaction.hash();
            let mut global_indexes = Vec::with_capacity(transaction.transaction().outputs.len());

            for (output_index, output) in transaction.transaction().outputs.iter().enumerate() {
                let output_index = u16::try_from(output_index).ok()?;
                let outputs = self
                    .key_outputs
                    .entry(output.amount)
                    .or_insert_with(|| OutputsForAmount {
                        start_index: output_counts.get(&output.amount).copied().unwrap_or(0),
                        outputs: vec![],
                    });
                global_indexes.push(outputs.start_index + outputs.outputs.len() as u32);
                outputs.outputs.push(PackedOutIndex {
                    block_index,
                    transaction_index,
                    output_index,
                });
            }

            if let Some(payment_id) = transaction.payment_id() {
                self.payment_ids.entry(payment_id).or_default().push(hash);
            }

            self.transactions.insert(
                hash,
                CachedTransactionInfo {
                    block_index,
                    transaction_index,
                    transaction,
                    global_indexes,
                },
            );
            hashes.push(hash);
        }

        self.block_index_by_hash.insert(info.hash, block_index);
        self.block_transactions.push(hashes);
        self.blocks.push(info);
        self.pushed.push(pushed);
        Some(())
    }

    /// Moves every block at or above `split_index` with its derived data into a new segment.
    /// Links between the two segments are left to the caller.
    pub(crate) fn split_off(&mut self, split_index: u32, sequence: u64) -> Segment {
        debug_assert!(split_index > self.start_index && split_index < self.end_index());
        let offset = (split_index - self.start_index) as usize;

        let mut upper = Segment::new(split_index, None, sequence);
        upper.blocks = self.blocks.split_off(offset);
        upper.pushed = self.pushed.split_off(offset);
        upper.block_transactions = self.block_transactions.split_off(offset);

        for info in &upper.blocks {
            if let Some(index) = self.block_index_by_hash.remove(&info.hash) {
                upper.block_index_by_hash.insert(info.hash, index);
            }
        }

        let moved_key_images: Vec<KeyImage> = self
            .spent_key_images
            .iter()
            .filter(|(_, index)| **index >= split_index)
            .map(|(key_image, _)| *key_image)
            .collect();
        for key_image in moved_key_images {
            if let Some(index) = self.spent_key_images.remove(&key_image) {
                upper.spent_key_images.insert(key_image, index);
            }
        }

        for hash in upper.block_transactions.iter().flatten() {
            let info = match self.transactions.remove(hash) {
                Some(info) => info,
                None => continue,
            };
            if let Some(payment_id) = info.transaction.payment_id() {
                if let Some(hashes) = self.payment_ids.get_mut(&payment_id) {
                    hashes.retain(|h| h != hash);
                    if hashes.is_empty() {
                        self.payment_ids.remove(&payment_id);
                    }
                }
                upper.payment_ids.entry(payment_id).or_default().push(*hash);
            }
            upper.transactions.insert(*hash, info);
        }

        let mut emptied = vec![];
        for (amount, outputs) in self.key_outputs.iter_mut() {
            let position = outputs
                .outputs
                .partition_point(|output| output.block_index < split_index);
            let moved = outputs.outputs.split_off(position);
            if !moved.is_empty() {
                upper.key_outputs.insert(
                    *amount,
                    OutputsForAmount {
                        start_index: outputs.start_index + position as u32,
                        outputs: moved,
                    },
                );
            }
            if outputs.outputs.is_empty() {
                emptied.push(*amount);
            }
        }
        for amount in emptied {
            self.key_outputs.remove(&amount);
        }

        upper
    }

    /// Appends a segment that starts right after this one
    pub(crate) fn append(&mut self, upper: Segment) {
        debug_assert_eq!(upper.start_index, self.end_index());

        self.blocks.extend(upper.blocks);
        self.pushed.extend(upper.pushed);
        self.block_transactions.extend(upper.block_transactions);
        self.block_index_by_hash.extend(upper.block_index_by_hash);
        self.spent_key_images.extend(upper.spent_key_images);
        self.transactions.extend(upper.transactions);

        for (amount, outputs) in upper.key_outputs {
            match self.key_outputs.get_mut(&amount) {
                Some(existing) => {
                    debug_assert_eq!(
                        existing.start_index + existing.outputs.len() as u32,
                        outputs.start_index
                    );
                    existing.outputs.extend(outputs.outputs);
                }
                None => {
                    self.key_outputs.insert(amount, outputs);
                }
            }
        }

        for (payment_id, hashes) in upper.payment_ids {
            self.payment_ids.entry(payment_id).or_default().extend(hashes);
        }
    }
}
