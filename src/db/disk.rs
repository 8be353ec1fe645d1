use super::{batch::Operation, Batch, Database, IterDirection, IterMode, RawIter, COLUMNS};
use crate::error::DBError;
use log::info;
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::PathBuf;

pub struct DiskDatabase {
    db: DB,
}

impl DiskDatabase {
    pub fn new(path: PathBuf) -> Result<Self, DBError> {
        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        db_options.create_missing_column_families(true);
        db_options.increase_parallelism(4);
        db_options.set_compression_type(rocksdb::DBCompressionType::Snappy);

        info!("Opening database at {}", path.display());
        let db = Self {
            db: DB::open_cf(&db_options, path, COLUMNS)?,
        };

        db.compact()?;

        Ok(db)
    }

    fn compact(&self) -> Result<(), DBError> {
        for column in &COLUMNS {
            let col = self.col(column)?;
            self.db
                .compact_range_cf::<Vec<u8>, Vec<u8>>(col, None, None);
        }
        Ok(())
    }

    fn col(&self, col: &'static str) -> Result<&ColumnFamily, DBError> {
        self.db
            .cf_handle(col)
            .ok_or(DBError::Other("bad column"))
    }
}

impl Database for DiskDatabase {
    fn get_raw(&self, col: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, DBError> {
        let col = self.col(col)?;
        let raw = self.db.get_pinned_cf(col, key)?;
        Ok(raw.map(|raw| raw.to_vec()))
    }

    fn write_batch(&self, batch: Batch) -> Result<(), DBError> {
        let mut write_batch = WriteBatch::default();
        for operation in batch.operations {
            match operation {
                Operation::Insert(col, key, value) => {
                    write_batch.put_cf(self.col(col)?, key, value);
                }
                Operation::Remove(col, key) => {
                    write_batch.delete_cf(self.col(col)?, key);
                }
            }
        }
        self.db.write(write_batch)?;
        Ok(())
    }

    fn iter_raw(&self, col: &'static str, mode: IterMode) -> Result<RawIter<'_>, DBError> {
        let col = self.col(col)?;

        let from_key = match &mode {
            IterMode::From(key, _) => key.clone(),
            _ => vec![],
        };

        let mode = match mode {
            IterMode::End => IteratorMode::End,
            IterMode::Start => IteratorMode::Start,
            IterMode::From(_, direction) => {
                let direction = match direction {
                    IterDirection::Forward => Direction::Forward,
                    IterDirection::Reverse => Direction::Reverse,
                };
                IteratorMode::From(&from_key, direction)
            }
        };

        let iter = self.db.iterator_cf(col, mode);
        Ok(Box::new(iter.map(|item| {
            let (key, value) = item?;
            Ok((key.into_vec(), value.into_vec()))
        })))
    }
}
