use super::events::{AdditionReason, ChainContext, ChainListener, Event, EventBus};
use super::segment::{PushedBlockInfo, SegmentId, MAX_TRANSACTIONS_PER_BLOCK};
use super::storage::MainChainStorage;
use super::tree::ChainTree;
use super::view::SegmentView;
use crate::checkpoints::Checkpoints;
use crate::crypto::{check_hash, SignatureVerifier};
use crate::db::Database;
use crate::error::{
    BlockValidationError, CoreError, DBError, PoolError, TransactionValidationError,
};
use crate::mempool::{PoolSnapshot, TransactionPool};
use crate::primitives::{CachedBlock, CachedTransaction, Hash, PaymentId, PublicKey, RawBlock};
use crate::protocol::{Currency, DifficultyAlgorithm, Lwma3};
use crate::util::{median, ms_since, now};
use crate::verification::{
    BlockValidation, BlockVerifier, TransactionValidationResult, TransactionValidator,
    ValidatorState,
};
use bytes::Bytes;
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of offering a block to the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddBlockResult {
    AddedToMain,
    AddedToAlternative,
    AddedToAlternativeAndSwitched,
    AlreadyExists,
    BlockValidationFailed(BlockValidationError),
    TransactionValidationFailed(Hash, TransactionValidationError),
    RejectedAsOrphan,
}

impl AddBlockResult {
    pub fn is_added(&self) -> bool {
        matches!(
            self,
            AddBlockResult::AddedToMain
                | AddBlockResult::AddedToAlternative
                | AddBlockResult::AddedToAlternativeAndSwitched
        )
    }
}

impl From<BlockValidationError> for AddBlockResult {
    fn from(err: BlockValidationError) -> Self {
        AddBlockResult::BlockValidationFailed(err)
    }
}

/// What changed in the pool since a peer last synced it
#[derive(Debug, Clone)]
pub struct PoolChanges {
    /// The peer's last seen top block is still the top
    pub is_tail_actual: bool,
    pub added: Vec<Arc<CachedTransaction>>,
    /// Hashes the peer knows that left the pool
    pub deleted: Vec<Hash>,
}

/// Main chain hashes a peer is missing, starting at the last block it shares with us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSupplement {
    pub start_index: u32,
    pub total_block_count: u32,
    pub hashes: Vec<Hash>,
}

pub struct CoreOptions {
    pub currency: Currency,
    pub checkpoints: Checkpoints,
    pub database: Arc<dyn Database>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub difficulty: Box<dyn DifficultyAlgorithm>,
}

impl CoreOptions {
    pub fn new(
        currency: Currency,
        database: Arc<dyn Database>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            currency,
            checkpoints: Checkpoints::new(),
            database,
            verifier,
            difficulty: Box::new(Lwma3),
        }
    }
}

/// A block that passed every check, ready to be pushed
struct ValidatedBlock {
    hash: Hash,
    index: u32,
    timestamp: u64,
    /// segment holding the previous block
    segment: SegmentId,
    add_on_top: bool,
    pushed: PushedBlockInfo,
    /// coinbase first
    transactions: Vec<Arc<CachedTransaction>>,
}

pub struct Core {
    currency: Arc<Currency>,
    checkpoints: Checkpoints,
    difficulty: Box<dyn DifficultyAlgorithm>,
    verifier: Arc<dyn SignatureVerifier>,
    tree: ChainTree,
    storage: MainChainStorage,
    pool: Arc<TransactionPool>,
    events: EventBus,
    listeners: Vec<Arc<dyn ChainListener>>,
}

impl Core {
    pub fn new(options: CoreOptions) -> Result<Self, CoreError> {
        let currency = Arc::new(options.currency);
        let events = EventBus::new();
        let pool = Arc::new(TransactionPool::new(events.clone()));
        let listeners: Vec<Arc<dyn ChainListener>> = vec![Arc::clone(&pool) as _];

        Ok(Self {
            tree: ChainTree::new(Arc::clone(&currency)),
            storage: MainChainStorage::open(options.database)?,
            currency,
            checkpoints: options.checkpoints,
            difficulty: options.difficulty,
            verifier: options.verifier,
            pool,
            events,
            listeners,
        })
    }

    /// Creates the genesis block, replays the persisted main chain and restores the pool
    pub fn load(&mut self) -> Result<(), CoreError> {
        if self.is_initialized() {
            return Ok(());
        }
        let start = Instant::now();

        let genesis = CachedBlock::new(self.currency.genesis_block())?;
        let genesis_raw = RawBlock {
            block: genesis.blob().clone(),
            transactions: vec![],
        };
        match self.storage.get_block(0)? {
            Some(stored) => {
                if CachedBlock::from_blob(stored.block)?.hash() != genesis.hash() {
                    return Err(CoreError::GenesisMismatch);
                }
            }
            None => self.storage.push_block(&genesis_raw)?,
        }

        let root = self.tree.create_root();
        let pushed = PushedBlockInfo {
            raw_block: genesis_raw,
            validator_state: ValidatorState::new(),
            block_size: genesis.coinbase().blob_size(),
            generated_coins: self.currency.genesis_block_reward,
            block_difficulty: 1,
        };
        self.tree.push_block(
            root,
            genesis.hash(),
            genesis.timestamp(),
            pushed,
            vec![Arc::clone(genesis.coinbase())],
        )
        .ok_or(CoreError::TreeInconsistency("genesis push"))?;
        info!("Genesis block {}.", genesis.hash());

        let count = self.storage.block_count();
        for index in 1..count {
            let raw = self
                .storage
                .get_block(index)?
                .ok_or(DBError::Other("missing main chain block"))?;
            match self.add_block_inner(raw, false)? {
                AddBlockResult::AddedToMain => {}
                other => {
                    return Err(CoreError::StoredBlockRejected {
                        index,
                        reason: format!("{:?}", other),
                    })
                }
            }
        }

        if let Some(json) = self.storage.load_pool_snapshot()? {
            match PoolSnapshot::from_json(&json) {
                Ok(snapshot) => {
                    let context = self.context()?;
                    self.pool.deserialize(&context, &snapshot);
                }
                Err(err) => warn!("Ignoring unreadable pool snapshot: {}", err),
            }
        }

        info!(
            "Loaded chain with top {} at {} (time={}ms).",
            self.top_block_hash(),
            self.top_block_index(),
            ms_since(&start)
        );
        Ok(())
    }

    /// Persists the pool contents
    pub fn save(&self) -> Result<(), CoreError> {
        let snapshot = self.pool.serialize();
        self.storage.save_pool_snapshot(&snapshot.to_json()?)?;
        debug!("Saved {} pool txs.", snapshot.len());
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        !self.tree.is_empty()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ChainListener>) {
        self.listeners.push(listener);
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        self.events.subscribe()
    }

    fn context(&self) -> Result<ChainContext<'_>, CoreError> {
        let main = self.tree.main_view().ok_or(CoreError::Uninitialized)?;
        Ok(ChainContext {
            main,
            currency: &self.currency,
            verifier: self.verifier.as_ref(),
        })
    }

    /// Validates a block and adds it to the chain tree. Rejections are reported in the
    /// result and leave every structure untouched.
    pub fn add_block(&mut self, raw: RawBlock) -> Result<AddBlockResult, CoreError> {
        if !self.is_initialized() {
            return Err(CoreError::Uninitialized);
        }
        self.add_block_inner(raw, true)
    }

    fn add_block_inner(&mut self, raw: RawBlock, persist: bool) -> Result<AddBlockResult, CoreError> {
        let start = Instant::now();
        let validated = match self.validate_block(raw) {
            Ok(validated) => validated,
            Err(result) => {
                debug!("Block rejected: {:?}", result);
                return Ok(result);
            }
        };
        let (hash, index) = (validated.hash, validated.index);
        let result = self.apply_block(validated, persist)?;
        debug!(
            "Block {} at {}: {:?} (time={}ms).",
            hash,
            index,
            result,
            ms_since(&start)
        );
        Ok(result)
    }

    fn validate_block(&self, raw: RawBlock) -> Result<ValidatedBlock, AddBlockResult> {
        use BlockValidationError::*;

        let block =
            CachedBlock::from_blob(raw.block.clone()).map_err(|_| AddBlockResult::from(Deserialization))?;
        let transactions = raw
            .transactions
            .iter()
            .map(|blob| CachedTransaction::from_blob(blob.clone()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| AddBlockResult::from(Deserialization))?;

        if block.block_index() == Some(0) {
            return Err(AddBlockResult::RejectedAsOrphan);
        }

        let previous_hash = block.previous_hash();
        let segment_id = self
            .tree
            .find_segment_containing_block(&previous_hash)
            .ok_or(AddBlockResult::RejectedAsOrphan)?;
        let view = self.tree.view(segment_id);
        let previous_index = view
            .get_block_index(&previous_hash)
            .ok_or(AddBlockResult::RejectedAsOrphan)?;
        let index = previous_index + 1;
        if block.block_index().map_or(false, |claimed| claimed != index) {
            return Err(WrongBlockIndex.into());
        }

        let segment = self
            .tree
            .segment(segment_id)
            .ok_or(AddBlockResult::RejectedAsOrphan)?;
        let add_on_top = segment.top_index() == previous_index;
        let is_alternative = !add_on_top
            || !segment.children().is_empty()
            || self.tree.main_leaf() != Some(segment_id);
        if is_alternative
            && !self
                .checkpoints
                .is_alternative_block_allowed(self.top_block_index() + 1, index)
        {
            return Err(AlternativeBelowCheckpoint.into());
        }

        let hash = block.hash();
        if self.tree.find_segment_containing_block(&hash).is_some() {
            return Err(AddBlockResult::AlreadyExists);
        }

        // structure
        let transaction_hashes = &block.block().transaction_hashes;
        if transaction_hashes.len() >= MAX_TRANSACTIONS_PER_BLOCK {
            return Err(TooManyTransactions.into());
        }
        if transaction_hashes.len() != transactions.len()
            || transaction_hashes
                .iter()
                .zip(&transactions)
                .any(|(hash, transaction)| *hash != transaction.hash())
        {
            return Err(TransactionInconsistency.into());
        }
        let mut unique = HashSet::with_capacity(transactions.len() + 1);
        unique.insert(block.coinbase().hash());
        if !transaction_hashes.iter().all(|hash| unique.insert(*hash)) {
            return Err(TransactionDuplicates.into());
        }
        let coinbase_size = block.coinbase().blob_size();
        if coinbase_size > self.currency.coinbase_blob_reserved_size {
            return Err(CoinbaseTooLarge.into());
        }
        let cumulative_size = coinbase_size
            + transactions
                .iter()
                .map(|transaction| transaction.blob_size())
                .sum::<u64>();
        if cumulative_size > self.currency.max_block_cumulative_size(index) {
            return Err(CumulativeBlockSizeTooBig.into());
        }

        // semantics
        let currency = self.currency.as_ref();
        let verifier = self.verifier.as_ref();
        block.check_version(currency, index)?;
        let timestamps = view.get_last_timestamps(
            currency.timestamp_check_window as usize,
            previous_index,
            true,
        );
        block.check_timestamp(currency, now(), &timestamps)?;
        block.check_coinbase(currency, verifier, index)?;

        let difficulty =
            view.get_difficulty_for_next_block(self.difficulty.as_ref(), block.version(), previous_index);
        if difficulty == 0 {
            return Err(DifficultyOverhead.into());
        }
        let previous_cumulative = view
            .get_block_info(previous_index)
            .map_or(0, |info| info.cumulative_difficulty);
        if previous_cumulative.checked_add(difficulty).is_none() {
            return Err(DifficultyOverhead.into());
        }
        let in_checkpoint_zone = self.checkpoints.is_in_checkpoint_zone(index);
        if in_checkpoint_zone {
            if !self.checkpoints.check_block(index, &hash) {
                return Err(CheckpointMismatch.into());
            }
        } else if !check_hash(&block.pow_hash(verifier), difficulty) {
            return Err(ProofOfWorkTooWeak.into());
        }

        // transactions, all or nothing
        let validator = TransactionValidator::new(
            view,
            currency,
            verifier,
            BlockValidation {
                index,
                timestamp: block.timestamp(),
                version: block.version(),
                in_checkpoint_zone,
            },
        );
        let results: Vec<_> = transactions
            .par_iter()
            .map(|transaction| validator.validate(transaction))
            .collect();

        let mut merged = TransactionValidationResult::new();
        for (transaction, result) in transactions.iter().zip(results) {
            let result = result.map_err(|err| {
                AddBlockResult::TransactionValidationFailed(transaction.hash(), err)
            })?;
            if merged.fee.checked_add(result.fee).is_none() {
                return Err(FeeAmountOverflow.into());
            }
            if !merged.emplace(result) {
                return Err(DoubleSpending.into());
            }
        }
        if view.check_if_any_spent(&merged.key_images, previous_index) {
            return Err(DoubleSpending.into());
        }

        // reward
        let sizes = view.get_last_blocks_sizes(
            currency.reward_blocks_window as usize,
            previous_index,
            false,
        );
        let already_generated = view.get_already_generated_coins(previous_index);
        let (reward, emission) = currency
            .get_block_reward(median(&sizes), cumulative_size, already_generated, merged.fee)
            .ok_or(AddBlockResult::from(CumulativeBlockSizeTooBig))?;
        let claimed = block.get_claimed()?;
        if claimed != reward {
            return Err(BlockRewardMismatch {
                expected: reward,
                actual: claimed,
            }
            .into());
        }

        let mut all_transactions = Vec::with_capacity(transactions.len() + 1);
        all_transactions.push(Arc::clone(block.coinbase()));
        all_transactions.extend(transactions);

        Ok(ValidatedBlock {
            hash,
            index,
            timestamp: block.timestamp(),
            segment: segment_id,
            add_on_top,
            pushed: PushedBlockInfo {
                raw_block: raw,
                validator_state: merged.into_state(),
                block_size: cumulative_size,
                generated_coins: emission,
                block_difficulty: difficulty,
            },
            transactions: all_transactions,
        })
    }

    fn apply_block(
        &mut self,
        validated: ValidatedBlock,
        persist: bool,
    ) -> Result<AddBlockResult, CoreError> {
        let ValidatedBlock {
            hash,
            index,
            timestamp,
            segment,
            add_on_top,
            pushed,
            transactions,
        } = validated;

        let has_children = self
            .tree
            .segment(segment)
            .map_or(false, |segment| !segment.children().is_empty());
        let target = if add_on_top && !has_children {
            segment
        } else {
            if !add_on_top {
                self.tree
                    .split(segment, index)
                    .ok_or(CoreError::TreeInconsistency("split of missing segment"))?;
            }
            self.tree
                .create_child(segment)
                .ok_or(CoreError::TreeInconsistency("child of missing segment"))?
        };

        let main = self.tree.main_leaf();
        if main == Some(target) && persist {
            self.storage.push_block(&pushed.raw_block)?;
        }
        self.tree
            .push_block(target, hash, timestamp, pushed, transactions)
            .ok_or(CoreError::TreeInconsistency("push onto missing segment"))?;

        let result = if main == Some(target) {
            info!("Block {} added to main chain at {}.", hash, index);
            self.notify_block_added(index, &hash)?;
            if self.currency.block_version(index + 1) != self.currency.block_version(index) {
                let context = self.context()?;
                self.pool.evaluate_block_version_upgrade(&context);
            }
            AddBlockResult::AddedToMain
        } else if let Some((previous, current)) = self.tree.update_main_chain() {
            let split_index = self.tree.split_index(previous, current);
            info!(
                "Main chain switched at {}, new top {} at {}.",
                split_index, hash, index
            );
            if persist {
                self.rewrite_storage(split_index)?;
            }
            self.notify_main_chain_switched(previous, current, split_index)?;
            AddBlockResult::AddedToAlternativeAndSwitched
        } else {
            debug!("Block {} added to alternative chain at {}.", hash, index);
            AddBlockResult::AddedToAlternative
        };

        self.prune_alternative_chains();
        self.tree.merge_main_segments();
        Ok(result)
    }

    fn rewrite_storage(&mut self, split_index: u32) -> Result<(), CoreError> {
        let main = self.tree.main_view().ok_or(CoreError::Uninitialized)?;
        let blocks: Vec<RawBlock> = (split_index..=main.top_index())
            .filter_map(|index| main.get_pushed_block_info(index))
            .map(|pushed| pushed.raw_block.clone())
            .collect();
        self.storage.rewrite_from(split_index, &blocks)?;
        Ok(())
    }

    fn notify_block_added(&self, index: u32, hash: &Hash) -> Result<(), CoreError> {
        let context = self.context()?;
        for listener in &self.listeners {
            listener.block_added(&context, index, hash);
        }
        self.events.publish(Event::BlockAdded { index, hash: *hash });
        Ok(())
    }

    fn notify_main_chain_switched(
        &self,
        previous: SegmentId,
        current: SegmentId,
        split_index: u32,
    ) -> Result<(), CoreError> {
        let context = self.context()?;
        let previous_view: SegmentView = self.tree.view(previous);
        for listener in &self.listeners {
            listener.main_chain_switched(&context, previous_view, split_index);
        }
        self.events.publish(Event::MainChainSwitched {
            previous_leaf: previous,
            current_leaf: current,
            split_index,
        });
        Ok(())
    }

    /// Deletes alternative leaves that are too far behind to catch up, repeating while a
    /// deletion exposes a new prunable leaf
    fn prune_alternative_chains(&mut self) {
        let retention = self.currency.alternative_chain_retention_blocks;
        loop {
            let main = match self.tree.main_view() {
                Some(main) => main,
                None => return,
            };
            let top = main.top_index();
            let cumulative = main.top_block().map_or(0, |info| info.cumulative_difficulty);
            let catch_up = self
                .currency
                .alternative_chain_catch_up_blocks
                .saturating_mul(main.get_block_difficulty(top).unwrap_or(0));

            let prunable = self.tree.leaves().iter().skip(1).copied().find(|leaf| {
                let view = self.tree.view(*leaf);
                let leaf_cumulative = view.top_block().map_or(0, |info| info.cumulative_difficulty);
                top.saturating_sub(view.top_index()) > retention
                    && cumulative.saturating_sub(leaf_cumulative) > catch_up
            });

            match prunable {
                Some(leaf) => {
                    if self.tree.delete_leaf(leaf).is_none() {
                        return;
                    }
                }
                None => return,
            }
        }
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    pub fn pool(&self) -> &Arc<TransactionPool> {
        &self.pool
    }

    pub fn tree(&self) -> &ChainTree {
        &self.tree
    }

    pub fn top_block_index(&self) -> u32 {
        self.tree.main_view().map_or(0, |main| main.top_index())
    }

    pub fn top_block_hash(&self) -> Hash {
        self.tree
            .main_view()
            .map_or_else(Hash::zero, |main| main.top_hash())
    }

    pub fn top_block_version(&self) -> u8 {
        self.currency.block_version(self.top_block_index())
    }

    pub fn get_block_by_index(&self, index: u32) -> Option<RawBlock> {
        self.tree
            .main_view()?
            .get_pushed_block_info(index)
            .map(|pushed| pushed.raw_block.clone())
    }

    /// Looks in the main chain first, then in alternative chains
    pub fn get_block_by_hash(&self, hash: &Hash) -> Option<RawBlock> {
        let view = self.tree.view(self.tree.find_segment_containing_block(hash)?);
        let index = view.get_block_index(hash)?;
        view.get_pushed_block_info(index)
            .map(|pushed| pushed.raw_block.clone())
    }

    pub fn has_block(&self, hash: &Hash) -> bool {
        self.tree.find_segment_containing_block(hash).is_some()
    }

    pub fn get_block_hashes(&self, start: u32, max: usize) -> Vec<Hash> {
        self.tree
            .main_view()
            .map(|main| main.get_block_hashes(start, max))
            .unwrap_or_default()
    }

    pub fn get_block_difficulty(&self, index: u32) -> Option<u64> {
        self.tree.main_view()?.get_block_difficulty(index)
    }

    pub fn difficulty_for_next_block(&self) -> u64 {
        let top = self.top_block_index();
        self.tree.main_view().map_or(0, |main| {
            main.get_difficulty_for_next_block(
                self.difficulty.as_ref(),
                self.currency.block_version(top + 1),
                top,
            )
        })
    }

    /// Reward a block on top of `previous_hash` would have to claim
    pub fn get_block_reward_after(
        &self,
        previous_hash: &Hash,
        cumulative_size: u64,
        fee: u64,
    ) -> Option<u64> {
        let view = self
            .tree
            .view(self.tree.find_segment_containing_block(previous_hash)?);
        let previous_index = view.get_block_index(previous_hash)?;
        let sizes = view.get_last_blocks_sizes(
            self.currency.reward_blocks_window as usize,
            previous_index,
            false,
        );
        self.currency
            .get_block_reward(
                median(&sizes),
                cumulative_size,
                view.get_already_generated_coins(previous_index),
                fee,
            )
            .map(|(reward, _)| reward)
    }

    /// Main chain transactions first, then the pool
    pub fn get_transaction(&self, hash: &Hash) -> Option<Arc<CachedTransaction>> {
        self.tree
            .main_view()
            .and_then(|main| main.get_transaction(hash))
            .map(|info| Arc::clone(&info.transaction))
            .or_else(|| self.pool.get_transaction(hash))
    }

    pub fn has_transaction(&self, hash: &Hash) -> bool {
        self.tree
            .main_view()
            .map_or(false, |main| main.has_transaction(hash))
            || self.pool.contains_transaction(hash)
    }

    pub fn get_transaction_global_indexes(&self, hash: &Hash) -> Option<Vec<u32>> {
        self.tree
            .main_view()?
            .get_transaction_global_indexes(hash)
    }

    pub fn get_transaction_hashes_by_payment_id(&self, payment_id: &PaymentId) -> Vec<Hash> {
        let mut hashes = self
            .tree
            .main_view()
            .map(|main| main.get_transaction_hashes_by_payment_id(payment_id))
            .unwrap_or_default();
        hashes.extend(self.pool.get_transaction_hashes_by_payment_id(payment_id));
        hashes
    }

    pub fn alternative_block_count(&self) -> usize {
        self.tree.alternative_block_count()
    }

    pub fn get_alternative_blocks(&self) -> Vec<RawBlock> {
        self.tree
            .alternative_segments()
            .into_iter()
            .filter_map(|id| self.tree.segment(id))
            .flat_map(|segment| segment.pushed.iter())
            .map(|pushed| pushed.raw_block.clone())
            .collect()
    }

    /// Mixin a transaction spending `amount` has to use in the next block
    pub fn current_required_mixin(&self, amount: u64) -> u64 {
        let main = match self.tree.main_view() {
            Some(main) => main,
            None => return 0,
        };
        let version = self.currency.block_version(main.top_index() + 1);
        let threshold = self.currency.mixin_threshold(version);
        if threshold == 0 {
            return 0;
        }
        let available = main.get_available_mixins_count(amount, main.top_index(), threshold);
        self.currency.required_mixin(version, available)
    }

    /// Up to `count` random unlocked outputs of an amount for use as decoys, sorted by
    /// global index
    pub fn get_random_outputs(&self, amount: u64, count: usize) -> Vec<(u32, PublicKey)> {
        let main = match self.tree.main_view() {
            Some(main) => main,
            None => return vec![],
        };
        let top = main.top_index();
        let mut candidates: Vec<u32> =
            (0..main.get_key_outputs_count_for_amount(amount, top)).collect();
        candidates.shuffle(&mut rand::thread_rng());

        let mut outputs = Vec::with_capacity(count);
        for global_index in candidates {
            if outputs.len() >= count {
                break;
            }
            if let Ok(keys) = main.extract_key_output_keys(amount, top, None, &[global_index]) {
                if let Some(key) = keys.first() {
                    outputs.push((global_index, *key));
                }
            }
        }
        outputs.sort_by_key(|(global_index, _)| *global_index);
        outputs
    }

    pub fn add_transaction_to_pool(&self, blob: Bytes) -> Result<Hash, PoolError> {
        let transaction = CachedTransaction::from_blob(blob)?;
        self.add_cached_transaction_to_pool(Arc::new(transaction))
    }

    pub fn add_cached_transaction_to_pool(
        &self,
        transaction: Arc<CachedTransaction>,
    ) -> Result<Hash, PoolError> {
        let context = self
            .context()
            .map_err(|_| PoolError::BlockchainUninitialized)?;
        let hash = transaction.hash();
        self.pool
            .push_transaction(&context, transaction, AdditionReason::Incoming)?;
        Ok(hash)
    }

    pub fn get_pool_changes(&self, tail_hash: &Hash, known_hashes: &[Hash]) -> PoolChanges {
        let (added, deleted) = self.pool.difference(known_hashes);
        PoolChanges {
            is_tail_actual: self.top_block_hash() == *tail_hash,
            added,
            deleted,
        }
    }

    /// Main chain locator: the blocks 1, 2, 4, 8, ... below the top, then genesis
    pub fn build_sparse_chain(&self) -> Vec<Hash> {
        let main = match self.tree.main_view() {
            Some(main) => main,
            None => return vec![],
        };
        let top = main.top_index();

        let mut sparse = vec![];
        let mut offset = 1u32;
        while offset < top {
            sparse.extend(main.get_block_hash(top - offset));
            offset = offset.saturating_mul(2);
        }
        if let Some(genesis) = main.get_block_hash(0) {
            if sparse.last() != Some(&genesis) {
                sparse.push(genesis);
            }
        }
        sparse
    }

    /// Index of the first hash of a remote locator that is on our main chain. The locator
    /// must end with our genesis block.
    pub fn find_blockchain_supplement(&self, remote_sparse: &[Hash]) -> Result<u32, CoreError> {
        let main = self.tree.main_view().ok_or(CoreError::Uninitialized)?;
        if remote_sparse.last() != main.get_block_hash(0).as_ref() {
            return Err(CoreError::GenesisNotFound);
        }
        remote_sparse
            .iter()
            .find_map(|hash| main.get_block_index(hash))
            .ok_or(CoreError::GenesisNotFound)
    }

    /// Up to `max_count` main chain hashes, starting at the block shared with a remote locator
    pub fn get_blockchain_supplement(
        &self,
        remote_sparse: &[Hash],
        max_count: usize,
    ) -> Result<ChainSupplement, CoreError> {
        let start_index = self.find_blockchain_supplement(remote_sparse)?;
        Ok(ChainSupplement {
            start_index,
            total_block_count: self.top_block_index() + 1,
            hashes: self.get_block_hashes(start_index, max_count),
        })
    }

    /// First main chain block with a timestamp at or after `timestamp`
    pub fn get_timestamp_lower_bound_block_index(&self, timestamp: u64) -> Option<u32> {
        self.tree
            .main_view()?
            .get_timestamp_lower_bound_block_index(timestamp)
    }

    /// Number of transactions, coinbases included, up to and including block `index`
    pub fn get_already_generated_transactions(&self, index: u32) -> Option<u64> {
        let main = self.tree.main_view()?;
        if index > main.top_index() {
            return None;
        }
        Some(main.get_already_generated_transactions(index))
    }

    /// Evicts outdated and invalid pool transactions, returns their hashes
    pub fn transaction_pool_cleaning_procedure(&self) -> Vec<Hash> {
        match self.context() {
            Ok(context) => self
                .pool
                .sanity_check(&context, self.currency.pool_transaction_timeout),
            Err(_) => vec![],
        }
    }
}
