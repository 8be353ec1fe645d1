use crate::error::CheckpointError;
use crate::primitives::Hash;
use log::{info, warn};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

/// Pinned block hashes at fixed indexes. Blocks at or below the last checkpoint are trusted
/// by hash and alternative chains may not fork below it.
#[derive(Debug, Clone)]
pub struct Checkpoints {
    points: BTreeMap<u32, Hash>,
    enabled: bool,
}

impl Default for Checkpoints {
    fn default() -> Self {
        Self {
            points: BTreeMap::new(),
            enabled: true,
        }
    }
}

impl Checkpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disabled checkpoints accept every block and never restrict alternative chains
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Adding the same pair twice is a no op, a different hash at an existing index is an error
    pub fn add_checkpoint(&mut self, index: u32, hash: Hash) -> Result<(), CheckpointError> {
        match self.points.get(&index) {
            Some(existing) if *existing != hash => Err(CheckpointError::Conflict {
                index,
                existing: *existing,
            }),
            Some(_) => Ok(()),
            None => {
                self.points.insert(index, hash);
                Ok(())
            }
        }
    }

    /// Reads `index,hash` lines. Blank lines and lines starting with `#` are skipped.
    pub fn load_from_csv(&mut self, path: impl AsRef<Path>) -> Result<usize, CheckpointError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let count = self.load_from_str(&content)?;
        info!(
            "Loaded {} checkpoints from {}",
            count,
            path.as_ref().display()
        );
        Ok(count)
    }

    pub fn load_from_str(&mut self, content: &str) -> Result<usize, CheckpointError> {
        let line_regex = Regex::new(r"^(\d+),([0-9a-fA-F]{64})$")?;
        let mut count = 0;
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_error = || CheckpointError::Parse {
                line: number + 1,
                content: line.to_string(),
            };
            let captures = line_regex.captures(line).ok_or_else(parse_error)?;
            let index: u32 = captures[1].parse().map_err(|_| parse_error())?;
            let hash: Hash = captures[2].parse().map_err(|_| parse_error())?;
            self.add_checkpoint(index, hash)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn top_checkpoint_index(&self) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        self.points.keys().next_back().copied()
    }

    pub fn is_in_checkpoint_zone(&self, index: u32) -> bool {
        self.top_checkpoint_index()
            .map_or(false, |top| index <= top)
    }

    pub fn get(&self, index: u32) -> Option<Hash> {
        self.points.get(&index).copied()
    }

    /// True unless a checkpoint exists at `index` with a different hash
    pub fn check_block(&self, index: u32, hash: &Hash) -> bool {
        if !self.enabled {
            return true;
        }
        match self.points.get(&index) {
            Some(expected) if expected == hash => {
                info!("Checkpoint passed for block {} {}", index, hash);
                true
            }
            Some(expected) => {
                warn!(
                    "Checkpoint failed for block {}, expected {} got {}",
                    index, expected, hash
                );
                false
            }
            None => true,
        }
    }

    /// An alternative block at `block_index` is allowed only above the last checkpoint below
    /// the current chain size
    pub fn is_alternative_block_allowed(&self, chain_size: u32, block_index: u32) -> bool {
        if block_index == 0 {
            return false;
        }
        if !self.enabled {
            return true;
        }
        match self.points.range(..chain_size).next_back() {
            Some((checkpoint_index, _)) => *checkpoint_index < block_index,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
