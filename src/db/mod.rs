mod batch;
mod disk;
mod key;
mod memory;

use crate::error::DBError;
use crate::primitives::decode;
pub use batch::{Batch, Operation};
pub use disk::DiskDatabase;
pub use key::{DBKey, Key};
pub use memory::MemoryDatabase;
use serde::{de::DeserializeOwned, Serialize};

pub const COL_MAIN_CHAIN: &str = "0";
pub const COL_MISC: &str = "1";

pub const COLUMNS: [&str; 2] = [COL_MAIN_CHAIN, COL_MISC];

pub enum IterMode {
    Start,
    End,
    From(Vec<u8>, IterDirection),
}

pub enum IterDirection {
    Forward,
    Reverse,
}

pub type RawEntry = (Vec<u8>, Vec<u8>);

/// Entries are read from the store as the iterator advances
pub type RawIter<'a> = Box<dyn Iterator<Item = Result<RawEntry, DBError>> + 'a>;

/// Key value store with named columns
pub trait Database: Send + Sync {
    fn get_raw(&self, col: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, DBError>;
    fn write_batch(&self, batch: Batch) -> Result<(), DBError>;
    /// Entries of a column in key order starting at `mode`
    fn iter_raw(&self, col: &'static str, mode: IterMode) -> Result<RawIter<'_>, DBError>;

    /// Highest key of a column without reading the rest of it
    fn last_key(&self, col: &'static str) -> Result<Option<Vec<u8>>, DBError> {
        match self.iter_raw(col, IterMode::End)?.next() {
            Some(entry) => Ok(Some(entry?.0)),
            None => Ok(None),
        }
    }
}

impl<'a> dyn Database + 'a {
    pub fn get<K: DBKey, V: DeserializeOwned>(&self, key: K) -> Result<Option<V>, DBError> {
        match self.get_raw(key.col(), &key.encode())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn has<K: DBKey>(&self, key: K) -> Result<bool, DBError> {
        Ok(self.get_raw(key.col(), &key.encode())?.is_some())
    }

    pub fn insert<K: DBKey, V: Serialize>(&self, key: K, value: &V) -> Result<(), DBError> {
        let mut batch = Batch::new();
        batch.insert(key, value)?;
        self.write_batch(batch)
    }

    pub fn remove<K: DBKey>(&self, key: K) -> Result<(), DBError> {
        let mut batch = Batch::new();
        batch.remove(key);
        self.write_batch(batch)
    }

    pub fn iter<'b, V: DeserializeOwned + 'b>(
        &'b self,
        col: &'static str,
        mode: IterMode,
    ) -> Result<Box<dyn Iterator<Item = Result<(Vec<u8>, V), DBError>> + 'b>, DBError> {
        Ok(Box::new(self.iter_raw(col, mode)?.map(|entry| {
            let (key, value) = entry?;
            Ok((key, decode(&value)?))
        })))
    }

}
