use super::{decode, encode, Block, Hash, KeyImage, PaymentId, Transaction, TransactionInput};
use crate::crypto::{fast_hash, tree_hash, SignatureVerifier};
use crate::error::EncodeError;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

/// A decoded transaction together with its blob. Everything derived from the transaction
/// is computed on first use and cached.
#[derive(Debug)]
pub struct CachedTransaction {
    transaction: Transaction,
    blob: Bytes,
    hash: OnceLock<Hash>,
    prefix_hash: OnceLock<Hash>,
    key_images: OnceLock<Vec<KeyImage>>,
    input_amount: OnceLock<u64>,
    output_amount: OnceLock<u64>,
}

impl CachedTransaction {
    pub fn new(transaction: Transaction) -> Result<Self, EncodeError> {
        let blob = Bytes::from(encode(&transaction)?);
        Ok(Self::with_blob(transaction, blob))
    }

    pub fn from_blob(blob: Bytes) -> Result<Self, EncodeError> {
        let transaction = decode(&blob)?;
        Ok(Self::with_blob(transaction, blob))
    }

    fn with_blob(transaction: Transaction, blob: Bytes) -> Self {
        Self {
            transaction,
            blob,
            hash: OnceLock::new(),
            prefix_hash: OnceLock::new(),
            key_images: OnceLock::new(),
            input_amount: OnceLock::new(),
            output_amount: OnceLock::new(),
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn blob(&self) -> &Bytes {
        &self.blob
    }

    pub fn blob_size(&self) -> u64 {
        self.blob.len() as u64
    }

    pub fn hash(&self) -> Hash {
        *self.hash.get_or_init(|| fast_hash(&self.blob))
    }

    /// Hash of everything but the signatures, the message ring signatures sign
    pub fn prefix_hash(&self) -> Hash {
        *self.prefix_hash.get_or_init(|| {
            // encoding the prefix of an already encoded transaction cannot fail
            let prefix = encode(&self.transaction.prefix_fields()).unwrap_or_default();
            fast_hash(&prefix)
        })
    }

    pub fn key_images(&self) -> &[KeyImage] {
        self.key_images.get_or_init(|| {
            self.transaction
                .key_inputs()
                .map(|input| input.key_image)
                .collect()
        })
    }

    pub fn key_image_set(&self) -> HashSet<KeyImage> {
        self.key_images().iter().copied().collect()
    }

    /// Saturates on overflow, validation rejects such transactions separately
    pub fn input_amount(&self) -> u64 {
        *self.input_amount.get_or_init(|| {
            self.transaction
                .inputs
                .iter()
                .fold(0u64, |total, input| total.saturating_add(input.amount()))
        })
    }

    pub fn output_amount(&self) -> u64 {
        *self.output_amount.get_or_init(|| {
            self.transaction
                .outputs
                .iter()
                .fold(0u64, |total, output| total.saturating_add(output.amount))
        })
    }

    pub fn fee(&self) -> u64 {
        if self.transaction.is_coinbase() {
            return 0;
        }
        self.input_amount().saturating_sub(self.output_amount())
    }

    pub fn payment_id(&self) -> Option<PaymentId> {
        self.transaction.extra.payment_id
    }

}

/// A decoded block with its blob. Hashes are derived on first use.
#[derive(Debug)]
pub struct CachedBlock {
    block: Block,
    blob: Bytes,
    header_blob: Vec<u8>,
    coinbase: Arc<CachedTransaction>,
    hashing_blob: OnceLock<Vec<u8>>,
    hash: OnceLock<Hash>,
    pow_hash: OnceLock<Hash>,
}

impl CachedBlock {
    pub fn new(block: Block) -> Result<Self, EncodeError> {
        let blob = Bytes::from(encode(&block)?);
        Self::with_blob(block, blob)
    }

    pub fn from_blob(blob: Bytes) -> Result<Self, EncodeError> {
        let block = decode(&blob)?;
        Self::with_blob(block, blob)
    }

    fn with_blob(block: Block, blob: Bytes) -> Result<Self, EncodeError> {
        let header_blob = encode(&block.header)?;
        let coinbase = Arc::new(CachedTransaction::new(block.base_transaction.clone())?);
        Ok(Self {
            block,
            blob,
            header_blob,
            coinbase,
            hashing_blob: OnceLock::new(),
            hash: OnceLock::new(),
            pow_hash: OnceLock::new(),
        })
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn blob(&self) -> &Bytes {
        &self.blob
    }

    pub fn coinbase(&self) -> &Arc<CachedTransaction> {
        &self.coinbase
    }

    pub fn previous_hash(&self) -> Hash {
        self.block.header.previous_block_hash
    }

    pub fn version(&self) -> u8 {
        self.block.header.major_version
    }

    pub fn timestamp(&self) -> u64 {
        self.block.header.timestamp
    }

    /// Index claimed by the coinbase input
    pub fn block_index(&self) -> Option<u32> {
        match self.block.base_transaction.inputs.first() {
            Some(TransactionInput::Base { block_index }) => Some(*block_index),
            _ => None,
        }
    }

    /// Header, merkle root of all transaction hashes and the transaction count
    pub fn hashing_blob(&self) -> &[u8] {
        self.hashing_blob.get_or_init(|| {
            let mut hashes = Vec::with_capacity(self.block.transaction_hashes.len() + 1);
            hashes.push(self.coinbase.hash());
            hashes.extend_from_slice(&self.block.transaction_hashes);

            let mut blob = self.header_blob.clone();
            blob.extend_from_slice(tree_hash(&hashes).as_bytes());
            blob.extend_from_slice(&(hashes.len() as u32).to_le_bytes());
            blob
        })
    }

    pub fn hash(&self) -> Hash {
        *self.hash.get_or_init(|| fast_hash(self.hashing_blob()))
    }

    pub fn pow_hash(&self, verifier: &dyn SignatureVerifier) -> Hash {
        *self
            .pow_hash
            .get_or_init(|| verifier.pow_hash(self.hashing_blob()))
    }
}
