use super::{batch::Operation, Batch, Database, IterDirection, IterMode, RawEntry, RawIter, COLUMNS};
use crate::error::DBError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

type Column = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile database for tests and nodes that don't persist
pub struct MemoryDatabase {
    columns: RwLock<HashMap<&'static str, Column>>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self {
            columns: RwLock::new(COLUMNS.iter().map(|col| (*col, Column::new())).collect()),
        }
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Database for MemoryDatabase {
    fn get_raw(&self, col: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, DBError> {
        let columns = self.columns.read();
        let column = columns.get(col).ok_or(DBError::Other("bad column"))?;
        Ok(column.get(key).cloned())
    }

    fn write_batch(&self, batch: Batch) -> Result<(), DBError> {
        let mut columns = self.columns.write();
        if batch.operations.iter().any(|operation| {
            let col = match operation {
                Operation::Insert(col, _, _) | Operation::Remove(col, _) => col,
            };
            !columns.contains_key(col)
        }) {
            return Err(DBError::Other("bad column"));
        }
        for operation in batch.operations {
            match operation {
                Operation::Insert(col, key, value) => {
                    if let Some(column) = columns.get_mut(col) {
                        column.insert(key, value);
                    }
                }
                Operation::Remove(col, key) => {
                    if let Some(column) = columns.get_mut(col) {
                        column.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    /// Copies the entries out so the column lock is not held by the iterator
    fn iter_raw(&self, col: &'static str, mode: IterMode) -> Result<RawIter<'_>, DBError> {
        let columns = self.columns.read();
        let column = columns.get(col).ok_or(DBError::Other("bad column"))?;
        let clone = |(key, value): (&Vec<u8>, &Vec<u8>)| (key.clone(), value.clone());
        let entries: Vec<RawEntry> = match mode {
            IterMode::Start => column.iter().map(clone).collect(),
            IterMode::End => column.iter().rev().map(clone).collect(),
            IterMode::From(key, IterDirection::Forward) => {
                column.range(key..).map(clone).collect()
            }
            IterMode::From(key, IterDirection::Reverse) => {
                column.range(..=key).rev().map(clone).collect()
            }
        };
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn last_key(&self, col: &'static str) -> Result<Option<Vec<u8>>, DBError> {
        let columns = self.columns.read();
        let column = columns.get(col).ok_or(DBError::Other("bad column"))?;
        Ok(column.keys().next_back().cloned())
    }
}
