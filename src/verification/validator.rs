use super::{EligibleIndex, TransactionValidationResult, TransactionVerifier};
use crate::blockchain::SegmentView;
use crate::crypto::SignatureVerifier;
use crate::error::TransactionValidationError;
use crate::primitives::{CachedTransaction, Hash, KeyImage, PublicKey};
use crate::protocol::Currency;

type TxResult<T> = Result<T, TransactionValidationError>;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ValidationFlags: u32 {
        const NONE = 0;
        /// Reject transactions paying less than the minimum fee
        const CHECK_FEE = 1 << 0;
        /// Resolve ring members and verify ring signatures
        const CHECK_INPUTS = 1 << 1;
        /// Apply the pool's size limit on top of the consensus limit
        const CHECK_POOL_SIZE = 1 << 2;
        /// Referenced outputs must be unlocked at the inclusion index
        const REQUIRE_UNLOCKED = 1 << 3;
    }
}

/// Pool contents consulted while validating a transaction for the pool
pub trait PoolLookup {
    fn contains_transaction(&self, hash: &Hash) -> bool;
    /// Transaction in the pool spending this key image
    fn key_image_owner(&self, key_image: &KeyImage) -> Option<Hash>;
}

/// The points where block and pool validation differ
pub trait ValidationPolicy {
    fn flags(&self) -> ValidationFlags;

    fn block_version(&self) -> u8;

    /// Index of the last block the transaction is validated against
    fn validation_index(&self) -> u32;

    fn pre_validate(&self, _transaction: &CachedTransaction) -> TxResult<()> {
        Ok(())
    }

    fn is_key_image_spent(
        &self,
        view: &SegmentView,
        key_image: &KeyImage,
        transaction_hash: &Hash,
    ) -> bool;

    /// Chain state the transaction is included at, checked when unlocked outputs are required
    fn inclusion_index(&self) -> EligibleIndex {
        EligibleIndex::NEVER
    }
}

/// Validation of a transaction contained in a block at `index`
#[derive(Debug, Clone, Copy)]
pub struct BlockValidation {
    pub index: u32,
    pub timestamp: u64,
    pub version: u8,
    pub in_checkpoint_zone: bool,
}

impl ValidationPolicy for BlockValidation {
    fn flags(&self) -> ValidationFlags {
        if self.in_checkpoint_zone {
            ValidationFlags::REQUIRE_UNLOCKED
        } else {
            ValidationFlags::CHECK_INPUTS | ValidationFlags::REQUIRE_UNLOCKED
        }
    }

    fn block_version(&self) -> u8 {
        self.version
    }

    fn validation_index(&self) -> u32 {
        self.index.saturating_sub(1)
    }

    fn is_key_image_spent(&self, view: &SegmentView, key_image: &KeyImage, _: &Hash) -> bool {
        view.check_if_spent(key_image, self.validation_index())
    }

    fn inclusion_index(&self) -> EligibleIndex {
        EligibleIndex::new(self.index, self.timestamp)
    }
}

/// Validation of a transaction entering the pool on top of the main chain tip. `exclude`
/// names a pooled transaction being revalidated, its own entries don't count as conflicts.
pub struct PoolValidation<'p> {
    pub pool: &'p dyn PoolLookup,
    pub exclude: Option<Hash>,
    pub top_index: u32,
    pub version: u8,
    pub size_limit: u64,
}

impl<'p> ValidationPolicy for PoolValidation<'p> {
    fn flags(&self) -> ValidationFlags {
        ValidationFlags::CHECK_FEE | ValidationFlags::CHECK_INPUTS | ValidationFlags::CHECK_POOL_SIZE
    }

    fn block_version(&self) -> u8 {
        self.version
    }

    fn validation_index(&self) -> u32 {
        self.top_index
    }

    fn pre_validate(&self, transaction: &CachedTransaction) -> TxResult<()> {
        let hash = transaction.hash();
        if self.exclude != Some(hash) && self.pool.contains_transaction(&hash) {
            return Err(TransactionValidationError::ExistsInPool);
        }
        if transaction.blob_size() > self.size_limit {
            return Err(TransactionValidationError::TooLargeForPool);
        }
        Ok(())
    }

    fn is_key_image_spent(
        &self,
        view: &SegmentView,
        key_image: &KeyImage,
        transaction_hash: &Hash,
    ) -> bool {
        if view.check_if_spent(key_image, self.top_index) {
            return true;
        }
        match self.pool.key_image_owner(key_image) {
            Some(owner) => owner != *transaction_hash && Some(owner) != self.exclude,
            None => false,
        }
    }
}

/// Rule engine shared by block and pool validation
pub struct TransactionValidator<'a, P> {
    view: SegmentView<'a>,
    currency: &'a Currency,
    verifier: &'a dyn SignatureVerifier,
    policy: P,
}

impl<'a, P: ValidationPolicy> TransactionValidator<'a, P> {
    pub fn new(
        view: SegmentView<'a>,
        currency: &'a Currency,
        verifier: &'a dyn SignatureVerifier,
        policy: P,
    ) -> Self {
        Self {
            view,
            currency,
            verifier,
            policy,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn validate(&self, transaction: &CachedTransaction) -> TxResult<TransactionValidationResult> {
        self.policy.pre_validate(transaction)?;
        transaction.check_sanity(self.currency, self.verifier)?;

        let hash = transaction.hash();
        for key_image in transaction.key_images() {
            if self.policy.is_key_image_spent(&self.view, key_image, &hash) {
                return Err(TransactionValidationError::InputKeyImageAlreadySpent);
            }
        }

        self.validate_mixin(transaction)?;

        if transaction.input_amount() < transaction.output_amount() {
            return Err(TransactionValidationError::InputAmountInsufficient);
        }
        let fee = transaction.fee();
        let flags = self.policy.flags();
        if flags.contains(ValidationFlags::CHECK_FEE) && fee < self.currency.minimum_fee {
            return Err(TransactionValidationError::FeeInsufficient);
        }

        let eligible_index = if flags.contains(ValidationFlags::CHECK_INPUTS) {
            self.validate_inputs(transaction)?
        } else {
            EligibleIndex::ALWAYS
        };

        if flags.contains(ValidationFlags::REQUIRE_UNLOCKED)
            && !eligible_index.is_satisfied_by(&self.policy.inclusion_index())
        {
            return Err(TransactionValidationError::InputSpendLockedOut);
        }

        let mut result = TransactionValidationResult::new();
        result.transactions.insert(hash);
        result.key_images = transaction.key_image_set();
        result.eligible_index = eligible_index;
        result.fee = fee;
        Ok(result)
    }

    /// Mixin the chain currently requires when spending `amount`
    pub fn required_mixin(&self, amount: u64) -> u64 {
        let version = self.policy.block_version();
        let threshold = self.currency.mixin_threshold(version);
        if threshold == 0 {
            return 0;
        }
        let available =
            self.view
                .get_available_mixins_count(amount, self.policy.validation_index(), threshold);
        self.currency.required_mixin(version, available)
    }

    fn validate_mixin(&self, transaction: &CachedTransaction) -> TxResult<()> {
        let params = self.currency.mixin_params(self.policy.block_version());
        for input in transaction.transaction().key_inputs() {
            let mixin = input.ring_size().saturating_sub(1) as u64;
            if mixin > params.maximum {
                return Err(TransactionValidationError::InputMixinTooHigh);
            }
            if mixin < self.required_mixin(input.amount) {
                return Err(TransactionValidationError::InputMixinTooLow);
            }
        }
        Ok(())
    }

    /// Resolves every ring, checks the signatures and returns the least chain state at which
    /// all referenced outputs are unlocked
    fn validate_inputs(&self, transaction: &CachedTransaction) -> TxResult<EligibleIndex> {
        let tx = transaction.transaction();
        if tx.signatures.len() != tx.inputs.len() {
            return Err(TransactionValidationError::InputInvalidSignaturesCount);
        }

        let prefix_hash = transaction.prefix_hash();
        let mut eligible_index = EligibleIndex::ALWAYS;

        for (input, signatures) in tx.key_inputs().zip(&tx.signatures) {
            if input.output_offsets.is_empty() {
                return Err(TransactionValidationError::InputEmptyOutputUsage);
            }

            let outputs = self
                .view
                .extract_key_outputs(
                    input.amount,
                    self.policy.validation_index(),
                    &input.global_indexes(),
                )
                .map_err(|_| TransactionValidationError::InputInvalidGlobalIndex)?;

            if signatures.len() != outputs.len() {
                return Err(TransactionValidationError::InputInvalidSignaturesCount);
            }

            let keys: Vec<PublicKey> = outputs.iter().map(|output| output.key).collect();
            if !self.verifier.check_ring_signature(
                &prefix_hash,
                &input.key_image,
                &keys,
                signatures,
            ) {
                return Err(TransactionValidationError::InputInvalidSignatures);
            }

            for output in &outputs {
                eligible_index = EligibleIndex::lower_bound(
                    eligible_index,
                    self.currency.eligible_index_for_unlock(output.unlock_time),
                );
            }
        }

        Ok(eligible_index)
    }
}
