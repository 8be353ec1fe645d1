use crate::db::{Batch, Database, Key, COL_MAIN_CHAIN};
use crate::error::DBError;
use crate::primitives::RawBlock;
use log::{debug, info};
use std::sync::Arc;

/// Bumped whenever the persisted layout changes
pub const SCHEMA_VERSION: u32 = 1;

/// Raw blocks of the main chain by index, plus the pool snapshot
pub struct MainChainStorage {
    db: Arc<dyn Database>,
    count: u32,
}

impl MainChainStorage {
    /// Opens the storage, stamping the schema version into an empty database
    pub fn open(db: Arc<dyn Database>) -> Result<Self, DBError> {
        match db.get::<_, u32>(Key::SchemaVersion)? {
            Some(found) if found != SCHEMA_VERSION => {
                return Err(DBError::SchemaMismatch {
                    expected: SCHEMA_VERSION,
                    found,
                })
            }
            Some(_) => {}
            None => db.insert(Key::SchemaVersion, &SCHEMA_VERSION)?,
        }

        let count = match db.last_key(COL_MAIN_CHAIN)? {
            Some(key) => {
                let mut bytes = [0u8; 4];
                if key.len() != 4 {
                    return Err(DBError::Other("bad main chain key"));
                }
                bytes.copy_from_slice(&key);
                u32::from_be_bytes(bytes) + 1
            }
            None => 0,
        };
        info!("Main chain storage holds {} blocks", count);

        Ok(Self { db, count })
    }

    pub fn block_count(&self) -> u32 {
        self.count
    }

    pub fn push_block(&mut self, block: &RawBlock) -> Result<(), DBError> {
        self.db.insert(Key::MainChainBlock(self.count), block)?;
        self.count += 1;
        Ok(())
    }

    /// Removes every block at or above `index`
    pub fn truncate(&mut self, index: u32) -> Result<(), DBError> {
        if index >= self.count {
            return Ok(());
        }
        let mut batch = Batch::new();
        for removed in index..self.count {
            batch.remove(Key::MainChainBlock(removed));
        }
        self.db.write_batch(batch)?;
        debug!("Truncated main chain storage from {} to {}", self.count, index);
        self.count = index;
        Ok(())
    }

    /// Replaces the blocks from `index` on with `blocks` in one write
    pub fn rewrite_from(&mut self, index: u32, blocks: &[RawBlock]) -> Result<(), DBError> {
        let mut batch = Batch::new();
        for removed in index..self.count {
            batch.remove(Key::MainChainBlock(removed));
        }
        for (offset, block) in blocks.iter().enumerate() {
            batch.insert(Key::MainChainBlock(index + offset as u32), block)?;
        }
        self.db.write_batch(batch)?;
        self.count = index + blocks.len() as u32;
        Ok(())
    }

    pub fn get_block(&self, index: u32) -> Result<Option<RawBlock>, DBError> {
        if index >= self.count {
            return Ok(None);
        }
        self.db.get(Key::MainChainBlock(index))
    }

    pub fn save_pool_snapshot(&self, snapshot: &str) -> Result<(), DBError> {
        self.db.insert(Key::PoolSnapshot, &snapshot.to_string())
    }

    pub fn load_pool_snapshot(&self) -> Result<Option<String>, DBError> {
        self.db.get(Key::PoolSnapshot)
    }
}
