use super::tx::check_outputs;
use crate::crypto::SignatureVerifier;
use crate::error::{BlockValidationError, TransactionValidationError};
use crate::primitives::{CachedBlock, TransactionInput};
use crate::protocol::Currency;
use crate::util::median;

type BlockResult<T> = Result<T, BlockValidationError>;

/// Semantic checks of a block that don't involve its transactions
pub trait BlockVerifier {
    fn check_version(&self, currency: &Currency, index: u32) -> BlockResult<()>;
    /// `last_timestamps` are the timestamps of the blocks preceding this one in chain order
    fn check_timestamp(
        &self,
        currency: &Currency,
        adjusted_time: u64,
        last_timestamps: &[u64],
    ) -> BlockResult<()>;
    fn check_coinbase(
        &self,
        currency: &Currency,
        verifier: &dyn SignatureVerifier,
        index: u32,
    ) -> BlockResult<()>;
    /// Sum of the coinbase outputs
    fn get_claimed(&self) -> BlockResult<u64>;
}

impl BlockVerifier for CachedBlock {
    fn check_version(&self, currency: &Currency, index: u32) -> BlockResult<()> {
        if self.version() != currency.block_version(index) {
            return Err(BlockValidationError::WrongVersion);
        }
        Ok(())
    }

    fn check_timestamp(
        &self,
        currency: &Currency,
        adjusted_time: u64,
        last_timestamps: &[u64],
    ) -> BlockResult<()> {
        if self.timestamp() > adjusted_time.saturating_add(currency.block_future_time_limit) {
            return Err(BlockValidationError::TimestampTooFarInFuture);
        }

        let window = currency.timestamp_check_window as usize;
        if last_timestamps.len() < window {
            return Ok(());
        }
        let recent = &last_timestamps[last_timestamps.len() - window..];
        if self.timestamp() < median(recent) {
            return Err(BlockValidationError::TimestampTooFarInPast);
        }
        Ok(())
    }

    fn check_coinbase(
        &self,
        currency: &Currency,
        verifier: &dyn SignatureVerifier,
        index: u32,
    ) -> BlockResult<()> {
        let coinbase = &self.block().base_transaction;

        if coinbase.inputs.len() != 1 {
            return Err(TransactionValidationError::BaseInputWrongCount.into());
        }
        match coinbase.inputs[0] {
            TransactionInput::Base { block_index } if block_index != index => {
                return Err(TransactionValidationError::BaseInputWrongBlockIndex.into())
            }
            TransactionInput::Base { .. } => {}
            TransactionInput::Key(_) => {
                return Err(TransactionValidationError::BaseInputUnexpectedType.into())
            }
        }

        if coinbase.unlock_time != index as u64 + currency.mined_money_unlock_window as u64 {
            return Err(TransactionValidationError::BaseTransactionWrongUnlockTime.into());
        }
        if !coinbase.signatures.is_empty() {
            return Err(TransactionValidationError::BaseInvalidSignaturesCount.into());
        }

        check_outputs(&coinbase.outputs, verifier)?;
        self.get_claimed()?;
        Ok(())
    }

    fn get_claimed(&self) -> BlockResult<u64> {
        self.block()
            .base_transaction
            .checked_output_amount()
            .ok_or_else(|| TransactionValidationError::OutputsAmountOverflow.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::primitives::PublicKey;
    use crate::protocol::Network;

    struct AcceptAll;

    impl SignatureVerifier for AcceptAll {
        fn check_key(&self, _: &PublicKey) -> bool {
            true
        }

        fn check_ring_signature(
            &self,
            _: &crate::primitives::Hash,
            _: &crate::primitives::KeyImage,
            _: &[PublicKey],
            _: &[crate::primitives::Signature],
        ) -> bool {
            true
        }
    }

    fn block_at(currency: &Currency, index: u32, timestamp: u64) -> CachedBlock {
        let mut block = currency.genesis_block();
        block.header.timestamp = timestamp;
        block.base_transaction = currency.coinbase_transaction(index, 50, PublicKey([1; 32]));
        CachedBlock::new(block).unwrap()
    }

    #[test]
    fn test_coinbase() {
        let currency = Currency::from_network(Network::Regtest);
        let block = block_at(&currency, 5, 0);
        assert!(block.check_coinbase(&currency, &AcceptAll, 5).is_ok());
        assert_eq!(
            block.check_coinbase(&currency, &AcceptAll, 6),
            Err(TransactionValidationError::BaseInputWrongBlockIndex.into())
        );
        assert_eq!(block.get_claimed(), Ok(50));

        let mut wrong_unlock = block.block().clone();
        wrong_unlock.base_transaction.unlock_time = 0;
        let wrong_unlock = CachedBlock::new(wrong_unlock).unwrap();
        assert_eq!(
            wrong_unlock.check_coinbase(&currency, &AcceptAll, 5),
            Err(TransactionValidationError::BaseTransactionWrongUnlockTime.into())
        );
    }

    #[test]
    fn test_output_count() {
        use crate::blockchain::MAX_OUTPUTS_PER_TRANSACTION;
        use crate::primitives::TransactionOutput;

        let currency = Currency::from_network(Network::Regtest);
        let output = TransactionOutput {
            amount: 1,
            key: PublicKey([1; 32]),
        };
        let outputs = vec![output.clone(); MAX_OUTPUTS_PER_TRANSACTION];
        assert!(check_outputs(&outputs, &AcceptAll).is_ok());

        let mut block = block_at(&currency, 5, 0).block().clone();
        block.base_transaction.outputs = vec![output; MAX_OUTPUTS_PER_TRANSACTION + 1];
        let block = CachedBlock::new(block).unwrap();
        assert_eq!(
            block.check_coinbase(&currency, &AcceptAll, 5),
            Err(TransactionValidationError::TooManyOutputs.into())
        );
    }

    #[test]
    fn test_timestamp() {
        let mut currency = Currency::from_network(Network::Regtest);
        currency.block_future_time_limit = 100;
        currency.timestamp_check_window = 3;

        let block = block_at(&currency, 1, 1_000);
        assert!(block.check_timestamp(&currency, 900, &[]).is_ok());
        assert_eq!(
            block.check_timestamp(&currency, 899, &[]),
            Err(BlockValidationError::TimestampTooFarInFuture)
        );

        // fewer timestamps than the window skip the median rule
        assert!(block.check_timestamp(&currency, 1_000, &[2_000, 2_000]).is_ok());
        assert!(block
            .check_timestamp(&currency, 1_000, &[0, 900, 1_000, 1_100])
            .is_ok());
        assert_eq!(
            block.check_timestamp(&currency, 1_000, &[1_001, 1_002, 1_003]),
            Err(BlockValidationError::TimestampTooFarInPast)
        );
    }
}
