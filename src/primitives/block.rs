use super::{Hash, Transaction};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub previous_block_hash: Hash,
    pub nonce: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub base_transaction: Transaction,
    /// Hashes of the non coinbase transactions in block order
    pub transaction_hashes: Vec<Hash>,
}

/// Encoded block with the blobs of its non coinbase transactions, the unit that is
/// relayed, persisted and ingested
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlock {
    pub block: Bytes,
    pub transactions: Vec<Bytes>,
}

impl RawBlock {
    /// Block blob plus every transaction blob
    pub fn size(&self) -> u64 {
        (self.block.len() + self.transactions.iter().map(Bytes::len).sum::<usize>()) as u64
    }
}
