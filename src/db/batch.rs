use super::DBKey;
use crate::error::EncodeError;
use crate::primitives::encode;
use serde::Serialize;

#[derive(Default)]
pub struct Batch {
    pub operations: Vec<Operation>,
}

impl Batch {
    pub fn new() -> Self {
        Self { operations: vec![] }
    }

    pub fn insert<K: DBKey, V: Serialize>(&mut self, key: K, value: &V) -> Result<(), EncodeError> {
        self.operations
            .push(Operation::Insert(key.col(), key.encode(), encode(value)?));
        Ok(())
    }

    pub fn remove<K: DBKey>(&mut self, key: K) {
        self.operations
            .push(Operation::Remove(key.col(), key.encode()));
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

pub enum Operation {
    Insert(&'static str, Vec<u8>, Vec<u8>),
    Remove(&'static str, Vec<u8>),
}
