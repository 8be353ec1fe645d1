mod block;
mod cached;
mod hash;
mod tx;

pub use block::{Block, BlockHeader, RawBlock};
pub use cached::{CachedBlock, CachedTransaction};
pub use hash::{Hash, KeyImage, PaymentId, PublicKey, Signature};
pub use tx::{
    relative_output_offsets, KeyInput, Transaction, TransactionExtra, TransactionInput,
    TransactionOutput,
};

use crate::error::EncodeError;
use serde::{de::DeserializeOwned, Serialize};

/// Binary encoding used for blobs and persisted values
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EncodeError> {
    Ok(bincode::deserialize(bytes)?)
}
