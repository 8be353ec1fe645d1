use crate::error::EncodeError;
use crate::primitives::CachedTransaction;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Persisted pool contents, transaction blobs are hex encoded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub transactions: Vec<String>,
    pub receive_times: Vec<u64>,
}

impl PoolSnapshot {
    pub fn push(&mut self, transaction: &CachedTransaction, receive_time: u64) {
        self.transactions.push(hex::encode(transaction.blob()));
        self.receive_times.push(receive_time);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Decodes each entry on its own so one bad blob doesn't lose the rest. Entries
    /// without a receive time get zero.
    pub fn entries(&self) -> impl Iterator<Item = (Result<CachedTransaction, EncodeError>, u64)> + '_ {
        self.transactions.iter().enumerate().map(move |(i, blob)| {
            let transaction = hex::decode(blob)
                .map_err(EncodeError::from)
                .and_then(|bytes| CachedTransaction::from_blob(Bytes::from(bytes)));
            (transaction, self.receive_times.get(i).copied().unwrap_or(0))
        })
    }

    pub fn to_json(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EncodeError> {
        Ok(serde_json::from_str(json)?)
    }
}
