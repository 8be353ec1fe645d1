use crate::blockchain::MAX_OUTPUTS_PER_TRANSACTION;
use crate::crypto::SignatureVerifier;
use crate::error::TransactionValidationError;
use crate::primitives::{CachedTransaction, TransactionInput, TransactionOutput};
use crate::protocol::Currency;
use std::collections::HashSet;

type TxResult = Result<(), TransactionValidationError>;

/// Checks that need nothing but the transaction and the currency
pub trait TransactionVerifier {
    fn check_sanity(&self, currency: &Currency, verifier: &dyn SignatureVerifier) -> TxResult;
    fn check_inputs_sanity(&self) -> TxResult;
    fn check_outputs(&self, verifier: &dyn SignatureVerifier) -> TxResult;
    fn check_amounts(&self) -> TxResult;
}

impl TransactionVerifier for CachedTransaction {
    fn check_sanity(&self, currency: &Currency, verifier: &dyn SignatureVerifier) -> TxResult {
        if self.blob_size() > currency.max_transaction_size {
            return Err(TransactionValidationError::TooLarge);
        }
        if !currency.is_transaction_version_supported(self.transaction().version) {
            return Err(TransactionValidationError::InvalidVersion);
        }
        self.check_inputs_sanity()?;
        self.check_outputs(verifier)?;
        self.check_amounts()?;

        let mut seen = HashSet::with_capacity(self.key_images().len());
        for key_image in self.key_images() {
            if !seen.insert(key_image) {
                return Err(TransactionValidationError::InputIdenticalKeyImages);
            }
        }
        Ok(())
    }

    fn check_inputs_sanity(&self) -> TxResult {
        let inputs = &self.transaction().inputs;
        if inputs.is_empty() {
            return Err(TransactionValidationError::EmptyInputs);
        }
        // transfers may only spend key outputs
        if inputs
            .iter()
            .any(|input| matches!(input, TransactionInput::Base { .. }))
        {
            return Err(TransactionValidationError::InputUnexpectedType);
        }
        Ok(())
    }

    fn check_outputs(&self, verifier: &dyn SignatureVerifier) -> TxResult {
        check_outputs(&self.transaction().outputs, verifier)
    }

    fn check_amounts(&self) -> TxResult {
        let transaction = self.transaction();
        if transaction.checked_input_amount().is_none() {
            return Err(TransactionValidationError::InputsAmountOverflow);
        }
        if transaction.checked_output_amount().is_none() {
            return Err(TransactionValidationError::OutputsAmountOverflow);
        }
        Ok(())
    }
}

/// Shared by transfers and coinbase transactions
pub fn check_outputs(outputs: &[TransactionOutput], verifier: &dyn SignatureVerifier) -> TxResult {
    if outputs.len() > MAX_OUTPUTS_PER_TRANSACTION {
        return Err(TransactionValidationError::TooManyOutputs);
    }
    for output in outputs {
        if output.amount == 0 {
            return Err(TransactionValidationError::OutputZeroAmount);
        }
        if !verifier.check_key(&output.key) {
            return Err(TransactionValidationError::OutputInvalidKey);
        }
    }
    Ok(())
}
