use super::comparator::priority_order;
use super::snapshot::PoolSnapshot;
use crate::blockchain::{
    AdditionReason, ChainContext, ChainListener, DeletionReason, Event, EventBus, SegmentView,
};
use crate::crypto::tree_hash;
use crate::error::PoolError;
use crate::primitives::{CachedTransaction, Hash, KeyImage, PaymentId};
use crate::util::{ms_since, now};
use crate::verification::{
    EligibleIndex, PoolLookup, PoolValidation, TransactionValidationResult, TransactionValidator,
};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PendingTransactionInfo {
    pub transaction: Arc<CachedTransaction>,
    /// least chain state at which every referenced output is unlocked
    pub eligible_index: EligibleIndex,
    pub receive_time: u64,
    /// amounts spent by the transaction that weren't fully mixed when it was admitted
    pub mixin_constraints: HashSet<u64>,
}

/// Contents of the pool. Every helper takes `&mut self`, the pool lock is taken exactly
/// once by the public entry points.
#[derive(Default)]
struct PoolState {
    transactions: HashMap<Hash, PendingTransactionInfo>,
    /// key image to the pooled transaction spending it
    key_images: HashMap<KeyImage, Hash>,
    payment_ids: HashMap<PaymentId, HashSet<Hash>>,
    /// amount to the pooled transactions constrained by it
    not_fully_mixed: HashMap<u64, HashSet<Hash>>,
    /// evicted transactions with their eviction time
    recently_deleted: HashMap<Hash, u64>,
    state_hash: Option<Hash>,
}

impl PoolLookup for PoolState {
    fn contains_transaction(&self, hash: &Hash) -> bool {
        self.transactions.contains_key(hash)
    }

    fn key_image_owner(&self, key_image: &KeyImage) -> Option<Hash> {
        self.key_images.get(key_image).copied()
    }
}

/// Smallest ring of the inputs spending `amount`, minus the real output
fn input_mixin(transaction: &CachedTransaction, amount: u64) -> u64 {
    transaction
        .transaction()
        .key_inputs()
        .filter(|input| input.amount == amount)
        .map(|input| input.ring_size().saturating_sub(1) as u64)
        .min()
        .unwrap_or(0)
}

impl PoolState {
    /// Validates against the main chain tip and the rest of the pool. `exclude` is set when
    /// revalidating a transaction that is already pooled.
    fn validate(
        &self,
        context: &ChainContext,
        transaction: &CachedTransaction,
        exclude: Option<Hash>,
    ) -> Result<TransactionValidationResult, PoolError> {
        let policy = PoolValidation {
            pool: self,
            exclude,
            top_index: context.top_index(),
            version: context.next_block_version(),
            size_limit: context.currency.pool_transaction_size_limit(),
        };
        let validator =
            TransactionValidator::new(context.main, context.currency, context.verifier, policy);
        let result = validator.validate(transaction)?;

        let current = EligibleIndex::new(context.top_index() + 1, now());
        if !result.eligible_index.is_satisfied_by(&current) {
            return Err(PoolError::InputUnlocksTooFarInFuture);
        }
        Ok(result)
    }

    fn mixin_constraints(context: &ChainContext, transaction: &CachedTransaction) -> HashSet<u64> {
        let threshold = context
            .currency
            .mixin_threshold(context.next_block_version());
        if threshold == 0 {
            return HashSet::new();
        }
        transaction
            .transaction()
            .key_inputs()
            .map(|input| input.amount)
            .filter(|amount| {
                context
                    .main
                    .get_available_mixins_count(*amount, context.top_index(), threshold)
                    < threshold
            })
            .collect()
    }

    fn insert(
        &mut self,
        context: &ChainContext,
        transaction: Arc<CachedTransaction>,
        reason: AdditionReason,
        receive_time: u64,
        events: &EventBus,
    ) -> Result<(), PoolError> {
        let start = Instant::now();
        let hash = transaction.hash();

        if context.main.has_transaction(&hash) {
            return Err(PoolError::AlreadyMined);
        }

        let result = self.validate(context, &transaction, None)?;
        let mixin_constraints = Self::mixin_constraints(context, &transaction);

        for key_image in transaction.key_images() {
            self.key_images.insert(*key_image, hash);
        }
        if let Some(payment_id) = transaction.payment_id() {
            self.payment_ids.entry(payment_id).or_default().insert(hash);
        }
        for amount in &mixin_constraints {
            self.not_fully_mixed.entry(*amount).or_default().insert(hash);
        }
        self.transactions.insert(
            hash,
            PendingTransactionInfo {
                transaction,
                eligible_index: result.eligible_index,
                receive_time,
                mixin_constraints,
            },
        );
        self.recently_deleted.remove(&hash);
        self.state_hash = None;

        debug!(
            "Added {} to pool (txs={}, key images={}, reason={:?}, time={}ms).",
            hash,
            self.transactions.len(),
            self.key_images.len(),
            reason,
            ms_since(&start)
        );

        if reason != AdditionReason::SkipNotify {
            events.publish(Event::TransactionAddedToPool { hash, reason });
        }
        Ok(())
    }

    fn remove(
        &mut self,
        hash: &Hash,
        reason: DeletionReason,
        events: &EventBus,
    ) -> Option<PendingTransactionInfo> {
        let info = self.transactions.remove(hash)?;

        for key_image in info.transaction.key_images() {
            if self.key_images.get(key_image) == Some(hash) {
                self.key_images.remove(key_image);
            }
        }
        if let Some(payment_id) = info.transaction.payment_id() {
            if let Some(hashes) = self.payment_ids.get_mut(&payment_id) {
                hashes.remove(hash);
                if hashes.is_empty() {
                    self.payment_ids.remove(&payment_id);
                }
            }
        }
        for amount in &info.mixin_constraints {
            if let Some(hashes) = self.not_fully_mixed.get_mut(amount) {
                hashes.remove(hash);
                if hashes.is_empty() {
                    self.not_fully_mixed.remove(amount);
                }
            }
        }
        self.recently_deleted.insert(*hash, now());
        self.state_hash = None;

        debug!("Removed {} from pool ({:?}).", hash, reason);
        events.publish(Event::TransactionDeletedFromPool {
            hash: *hash,
            reason,
        });
        Some(info)
    }

    /// Drops the transactions a main chain block mined or made double spends
    fn apply_block(&mut self, view: SegmentView, index: u32, events: &EventBus) {
        let mut mined = 0;
        let mut conflicting = 0;

        for transaction in view.get_block_transactions(index).iter().skip(1) {
            let hash = transaction.hash();
            if self
                .remove(&hash, DeletionReason::AddedToMainChain, events)
                .is_some()
            {
                mined += 1;
                continue;
            }
            for key_image in transaction.key_images() {
                if let Some(owner) = self.key_images.get(key_image).copied() {
                    if self
                        .remove(&owner, DeletionReason::KeyImageUsedInMainChain, events)
                        .is_some()
                    {
                        conflicting += 1;
                    }
                }
            }
        }

        if mined + conflicting > 0 {
            debug!(
                "Removed {} mined and {} conflicting txs from pool for block {}.",
                mined, conflicting, index
            );
        }
    }

    /// Lifts or enforces mixin constraints after the output counts changed
    fn recheck_mixins(&mut self, context: &ChainContext, events: &EventBus) {
        let version = context.next_block_version();
        let threshold = context.currency.mixin_threshold(version);

        let amounts: Vec<u64> = self.not_fully_mixed.keys().copied().collect();
        for amount in amounts {
            let available =
                context
                    .main
                    .get_available_mixins_count(amount, context.top_index(), threshold);
            let required = context.currency.required_mixin(version, available);
            let fully_mixed = available >= threshold;

            let hashes: Vec<Hash> = self
                .not_fully_mixed
                .get(&amount)
                .map(|hashes| hashes.iter().copied().collect())
                .unwrap_or_default();

            for hash in hashes {
                let mixin = match self.transactions.get(&hash) {
                    Some(info) => input_mixin(&info.transaction, amount),
                    None => continue,
                };
                if mixin < required {
                    self.remove(&hash, DeletionReason::Outdated, events);
                } else if fully_mixed {
                    if let Some(info) = self.transactions.get_mut(&hash) {
                        info.mixin_constraints.remove(&amount);
                    }
                    if let Some(hashes) = self.not_fully_mixed.get_mut(&amount) {
                        hashes.remove(&hash);
                    }
                }
            }

            if self
                .not_fully_mixed
                .get(&amount)
                .map_or(false, HashSet::is_empty)
            {
                self.not_fully_mixed.remove(&amount);
            }
        }
    }

    /// Newest first
    fn hashes_by_age(&self) -> Vec<Hash> {
        let mut entries: Vec<(u64, Hash)> = self
            .transactions
            .iter()
            .map(|(hash, info)| (info.receive_time, *hash))
            .collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|(_, hash)| hash).collect()
    }

    /// Revalidates every transaction, evicting failures with `reason`. A transaction
    /// older than `timeout` is evicted as outdated without revalidation.
    fn revalidate(
        &mut self,
        context: &ChainContext,
        timeout: Option<u64>,
        reason: DeletionReason,
        events: &EventBus,
    ) -> Vec<Hash> {
        let current = now();
        let mut deleted = vec![];

        for hash in self.hashes_by_age() {
            let (transaction, receive_time) = match self.transactions.get(&hash) {
                Some(info) => (Arc::clone(&info.transaction), info.receive_time),
                None => continue,
            };

            if let Some(timeout) = timeout {
                if current.saturating_sub(receive_time) >= timeout {
                    self.remove(&hash, DeletionReason::Outdated, events);
                    deleted.push(hash);
                    continue;
                }
            }

            match self.validate(context, &transaction, Some(hash)) {
                Ok(result) => {
                    if let Some(info) = self.transactions.get_mut(&hash) {
                        info.eligible_index = result.eligible_index;
                    }
                }
                Err(err) => {
                    debug!("Pooled transaction {} no longer valid: {}", hash, err);
                    self.remove(&hash, reason, events);
                    deleted.push(hash);
                }
            }
        }

        deleted
    }

    fn state_hash(&mut self) -> Hash {
        if let Some(hash) = self.state_hash {
            return hash;
        }
        let mut hashes: Vec<Hash> = self.transactions.keys().copied().collect();
        hashes.sort();
        let hash = tree_hash(&hashes);
        self.state_hash = Some(hash);
        hash
    }
}

/// Unconfirmed transactions waiting to be mined, kept valid against the main chain tip
#[derive(Default)]
pub struct TransactionPool {
    state: RwLock<PoolState>,
    events: EventBus,
}

impl TransactionPool {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: RwLock::new(PoolState::default()),
            events,
        }
    }

    pub fn push_transaction(
        &self,
        context: &ChainContext,
        transaction: Arc<CachedTransaction>,
        reason: AdditionReason,
    ) -> Result<(), PoolError> {
        self.push_transaction_at(context, transaction, reason, now())
    }

    /// Adds a transaction with an explicit receive time
    pub fn push_transaction_at(
        &self,
        context: &ChainContext,
        transaction: Arc<CachedTransaction>,
        reason: AdditionReason,
        receive_time: u64,
    ) -> Result<(), PoolError> {
        self.state
            .write()
            .insert(context, transaction, reason, receive_time, &self.events)
    }

    /// Evicts outdated and no longer valid transactions, returns the evicted hashes
    pub fn sanity_check(&self, context: &ChainContext, timeout: u64) -> Vec<Hash> {
        let mut state = self.state.write();
        let current = now();
        state
            .recently_deleted
            .retain(|_, deleted_at| current.saturating_sub(*deleted_at) < timeout);

        let deleted = state.revalidate(
            context,
            Some(timeout),
            DeletionReason::PoolCleanupProcedure,
            &self.events,
        );
        if !deleted.is_empty() {
            info!(
                "Pool cleanup removed {} txs, {} left.",
                deleted.len(),
                state.transactions.len()
            );
        }
        deleted
    }

    /// Revalidates everything under the rules of a new block major version
    pub fn evaluate_block_version_upgrade(&self, context: &ChainContext) -> Vec<Hash> {
        let deleted = self.state.write().revalidate(
            context,
            None,
            DeletionReason::BlockMajorVersionUpgrade,
            &self.events,
        );
        info!(
            "Block version {} removed {} txs from pool.",
            context.next_block_version(),
            deleted.len()
        );
        deleted
    }

    /// Transactions that may be mined at `index`, best first
    pub fn eligible_pool_transactions(&self, index: &EligibleIndex) -> Vec<Arc<CachedTransaction>> {
        let state = self.state.read();
        let mut eligible: Vec<&PendingTransactionInfo> = state
            .transactions
            .values()
            .filter(|info| info.eligible_index.is_satisfied_by(index))
            .collect();
        eligible.sort_by(|a, b| priority_order(a, b));
        eligible
            .into_iter()
            .map(|info| Arc::clone(&info.transaction))
            .collect()
    }

    /// Identifies the pool contents, zero for an empty pool
    pub fn state_hash(&self) -> Hash {
        if let Some(hash) = self.state.read().state_hash {
            return hash;
        }
        self.state.write().state_hash()
    }

    pub fn force_flush(&self) -> usize {
        let mut state = self.state.write();
        let hashes: Vec<Hash> = state.transactions.keys().copied().collect();
        for hash in &hashes {
            state.remove(hash, DeletionReason::Forced, &self.events);
        }
        hashes.len()
    }

    pub fn force_erasure(&self, hash: &Hash) -> bool {
        self.state
            .write()
            .remove(hash, DeletionReason::Forced, &self.events)
            .is_some()
    }

    pub fn remove_transaction(&self, hash: &Hash) -> bool {
        self.state
            .write()
            .remove(hash, DeletionReason::PoolCleanupProcedure, &self.events)
            .is_some()
    }

    pub fn contains_transaction(&self, hash: &Hash) -> bool {
        self.state.read().transactions.contains_key(hash)
    }

    pub fn contains_key_image(&self, key_image: &KeyImage) -> bool {
        self.state.read().key_images.contains_key(key_image)
    }

    pub fn get_transaction(&self, hash: &Hash) -> Option<Arc<CachedTransaction>> {
        self.state
            .read()
            .transactions
            .get(hash)
            .map(|info| Arc::clone(&info.transaction))
    }

    pub fn get_pending_info(&self, hash: &Hash) -> Option<PendingTransactionInfo> {
        self.state.read().transactions.get(hash).cloned()
    }

    /// Pooled transactions missing from `known`, and the hashes in `known` that are not
    /// pooled, both sorted by hash
    pub fn difference(&self, known: &[Hash]) -> (Vec<Arc<CachedTransaction>>, Vec<Hash>) {
        let state = self.state.read();
        let known: HashSet<&Hash> = known.iter().collect();

        let mut added: Vec<Arc<CachedTransaction>> = state
            .transactions
            .iter()
            .filter(|(hash, _)| !known.contains(hash))
            .map(|(_, info)| Arc::clone(&info.transaction))
            .collect();
        added.sort_by_key(|transaction| transaction.hash());

        let mut deleted: Vec<Hash> = known
            .into_iter()
            .filter(|hash| !state.transactions.contains_key(*hash))
            .copied()
            .collect();
        deleted.sort();
        (added, deleted)
    }

    pub fn transaction_hashes(&self) -> Vec<Hash> {
        let mut hashes: Vec<Hash> = self.state.read().transactions.keys().copied().collect();
        hashes.sort();
        hashes
    }

    pub fn transactions(&self) -> Vec<Arc<CachedTransaction>> {
        self.state
            .read()
            .transactions
            .values()
            .map(|info| Arc::clone(&info.transaction))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.state.read().transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn receive_time(&self, hash: &Hash) -> Option<u64> {
        self.state
            .read()
            .transactions
            .get(hash)
            .map(|info| info.receive_time)
    }

    pub fn get_transaction_hashes_by_payment_id(&self, payment_id: &PaymentId) -> Vec<Hash> {
        let mut hashes: Vec<Hash> = self
            .state
            .read()
            .payment_ids
            .get(payment_id)
            .map(|hashes| hashes.iter().copied().collect())
            .unwrap_or_default();
        hashes.sort();
        hashes
    }

    pub fn is_recently_deleted(&self, hash: &Hash) -> bool {
        self.state.read().recently_deleted.contains_key(hash)
    }

    /// Amounts the pool is waiting on to become fully mixed
    pub fn not_fully_mixed_amounts(&self) -> Vec<u64> {
        let mut amounts: Vec<u64> = self.state.read().not_fully_mixed.keys().copied().collect();
        amounts.sort_unstable();
        amounts
    }

    pub fn serialize(&self) -> PoolSnapshot {
        let state = self.state.read();
        let mut entries: Vec<&PendingTransactionInfo> = state.transactions.values().collect();
        entries.sort_by_key(|info| (info.receive_time, info.transaction.hash()));

        let mut snapshot = PoolSnapshot::default();
        for info in entries {
            snapshot.push(&info.transaction, info.receive_time);
        }
        snapshot
    }

    /// Re-admits the snapshot's transactions with their original receive times, returns the
    /// number admitted
    pub fn deserialize(&self, context: &ChainContext, snapshot: &PoolSnapshot) -> usize {
        let mut state = self.state.write();
        let mut admitted = 0;

        for (transaction, receive_time) in snapshot.entries() {
            let transaction = match transaction {
                Ok(transaction) => Arc::new(transaction),
                Err(err) => {
                    warn!("Skipping undecodable pool snapshot entry: {}", err);
                    continue;
                }
            };
            let hash = transaction.hash();
            match state.insert(
                context,
                transaction,
                AdditionReason::Deserialization,
                receive_time,
                &self.events,
            ) {
                Ok(()) => admitted += 1,
                Err(err) => debug!("Dropping {} from pool snapshot: {}", hash, err),
            }
        }

        info!(
            "Loaded {} of {} txs from pool snapshot.",
            admitted,
            snapshot.len()
        );
        admitted
    }
}

impl ChainListener for TransactionPool {
    fn block_added(&self, context: &ChainContext, index: u32, _hash: &Hash) {
        let mut state = self.state.write();
        if state.transactions.is_empty() {
            return;
        }
        state.apply_block(context.main, index, &self.events);
        state.recheck_mixins(context, &self.events);
    }

    fn main_chain_switched(&self, context: &ChainContext, previous: SegmentView, split_index: u32) {
        let mut state = self.state.write();
        let upgraded =
            context.currency.block_version(previous.top_index() + 1) != context.next_block_version();

        let mut readded = 0;
        for index in split_index..=previous.top_index() {
            for transaction in previous.get_block_transactions(index).into_iter().skip(1) {
                let hash = transaction.hash();
                match state.insert(
                    context,
                    transaction,
                    AdditionReason::MainChainSwitch,
                    now(),
                    &self.events,
                ) {
                    Ok(()) => readded += 1,
                    Err(err) => debug!("Not re-adding {} to pool: {}", hash, err),
                }
            }
        }
        if readded > 0 {
            info!(
                "Added {} txs back into the pool after switch at {}.",
                readded, split_index
            );
        }

        for index in split_index..=context.top_index() {
            state.apply_block(context.main, index, &self.events);
        }
        state.recheck_mixins(context, &self.events);

        // the new chain may cross a version boundary the old one hadn't
        let reason = if upgraded {
            DeletionReason::BlockMajorVersionUpgrade
        } else {
            DeletionReason::PoolCleanupProcedure
        };
        let deleted = state.revalidate(
            context,
            Some(context.currency.pool_transaction_timeout),
            reason,
            &self.events,
        );
        if upgraded {
            info!(
                "Block version {} after switch removed {} txs from pool.",
                context.next_block_version(),
                deleted.len()
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::primitives::{
        KeyInput, PublicKey, Transaction, TransactionExtra, TransactionInput, TransactionOutput,
    };

    fn transaction(key_image: u8, fee: u64) -> Arc<CachedTransaction> {
        let transaction = Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TransactionInput::Key(KeyInput {
                amount: 1000,
                output_offsets: vec![0],
                key_image: KeyImage([key_image; 32]),
            })],
            outputs: vec![TransactionOutput {
                amount: 1000 - fee,
                key: PublicKey::zero(),
            }],
            extra: TransactionExtra::default(),
            signatures: vec![],
        };
        Arc::new(CachedTransaction::new(transaction).unwrap())
    }

    fn add(state: &mut PoolState, transaction: Arc<CachedTransaction>, receive_time: u64) {
        let hash = transaction.hash();
        for key_image in transaction.key_images() {
            state.key_images.insert(*key_image, hash);
        }
        state.transactions.insert(
            hash,
            PendingTransactionInfo {
                transaction,
                eligible_index: EligibleIndex::ALWAYS,
                receive_time,
                mixin_constraints: HashSet::new(),
            },
        );
        state.state_hash = None;
    }

    #[test]
    fn test_state_hash() {
        let mut state = PoolState::default();
        assert_eq!(state.state_hash(), Hash::zero());

        let first = transaction(1, 10);
        add(&mut state, Arc::clone(&first), 0);
        assert_eq!(state.state_hash(), first.hash());

        let second = transaction(2, 10);
        add(&mut state, Arc::clone(&second), 0);
        let mut sorted = vec![first.hash(), second.hash()];
        sorted.sort();
        assert_eq!(state.state_hash(), tree_hash(&sorted));
        assert!(state.state_hash.is_some());

        let events = EventBus::new();
        state.remove(&second.hash(), DeletionReason::Forced, &events);
        assert!(state.state_hash.is_none());
        assert_eq!(state.state_hash(), first.hash());
    }

    #[test]
    fn test_remove_cleans_indexes() {
        let events = EventBus::new();
        let receiver = events.subscribe();
        let mut state = PoolState::default();
        let tx = transaction(7, 10);
        add(&mut state, Arc::clone(&tx), 0);
        assert_eq!(state.key_image_owner(&KeyImage([7; 32])), Some(tx.hash()));

        let removed = state.remove(&tx.hash(), DeletionReason::Outdated, &events);
        assert!(removed.is_some());
        assert!(!state.contains_transaction(&tx.hash()));
        assert!(state.key_images.is_empty());
        assert!(state.recently_deleted.contains_key(&tx.hash()));
        assert_eq!(
            receiver.try_recv().unwrap(),
            Event::TransactionDeletedFromPool {
                hash: tx.hash(),
                reason: DeletionReason::Outdated
            }
        );
        assert!(state
            .remove(&tx.hash(), DeletionReason::Outdated, &events)
            .is_none());
    }

    #[test]
    fn test_hashes_by_age() {
        let mut state = PoolState::default();
        let old = transaction(1, 10);
        let new = transaction(2, 10);
        add(&mut state, Arc::clone(&old), 100);
        add(&mut state, Arc::clone(&new), 200);
        assert_eq!(state.hashes_by_age(), vec![new.hash(), old.hash()]);
    }
}
