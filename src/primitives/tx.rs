use super::{KeyImage, PaymentId, PublicKey, Signature};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    pub amount: u64,
    /// Referenced outputs as offsets relative to the previous reference
    pub output_offsets: Vec<u32>,
    pub key_image: KeyImage,
}

impl KeyInput {
    /// Absolute global output indexes of the ring members
    pub fn global_indexes(&self) -> Vec<u32> {
        let mut current = 0u32;
        self.output_offsets
            .iter()
            .map(|offset| {
                current = current.saturating_add(*offset);
                current
            })
            .collect()
    }

    pub fn ring_size(&self) -> usize {
        self.output_offsets.len()
    }
}

/// Converts ascending absolute global indexes into the relative form stored in inputs
pub fn relative_output_offsets(global_indexes: &[u32]) -> Vec<u32> {
    let mut previous = 0;
    global_indexes
        .iter()
        .map(|index| {
            let offset = index.saturating_sub(previous);
            previous = *index;
            offset
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionInput {
    /// Coinbase input carrying the index of the block it mints
    Base { block_index: u32 },
    Key(KeyInput),
}

impl TransactionInput {
    pub fn amount(&self) -> u64 {
        match self {
            TransactionInput::Base { .. } => 0,
            TransactionInput::Key(input) => input.amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub amount: u64,
    pub key: PublicKey,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionExtra {
    pub public_key: Option<PublicKey>,
    pub payment_id: Option<PaymentId>,
    pub nonce: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u8,
    /// Block index when below the currency's max block height, unix timestamp otherwise
    pub unlock_time: u64,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub extra: TransactionExtra,
    /// One ring signature per input
    pub signatures: Vec<Vec<Signature>>,
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && matches!(self.inputs[0], TransactionInput::Base { .. })
    }

    pub fn key_inputs(&self) -> impl Iterator<Item = &KeyInput> {
        self.inputs.iter().filter_map(|input| match input {
            TransactionInput::Key(input) => Some(input),
            TransactionInput::Base { .. } => None,
        })
    }

    /// Sum of input amounts, `None` on overflow
    pub fn checked_input_amount(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |total, input| total.checked_add(input.amount()))
    }

    /// Sum of output amounts, `None` on overflow
    pub fn checked_output_amount(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |total, output| total.checked_add(output.amount))
    }

    pub(crate) fn prefix_fields(
        &self,
    ) -> (
        &u8,
        &u64,
        &Vec<TransactionInput>,
        &Vec<TransactionOutput>,
        &TransactionExtra,
    ) {
        (
            &self.version,
            &self.unlock_time,
            &self.inputs,
            &self.outputs,
            &self.extra,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_offsets() {
        let global = vec![3, 7, 8, 20];
        let relative = relative_output_offsets(&global);
        assert_eq!(relative, vec![3, 4, 1, 12]);

        let input = KeyInput {
            amount: 1,
            output_offsets: relative,
            key_image: KeyImage::zero(),
        };
        assert_eq!(input.global_indexes(), global);
        assert_eq!(input.ring_size(), 4);
    }
}
