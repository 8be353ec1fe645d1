use crate::error::EncodeError;
use crate::primitives::{
    Block, BlockHeader, Hash, PublicKey, Transaction, TransactionExtra, TransactionInput,
    TransactionOutput,
};
use crate::verification::EligibleIndex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MixinParams {
    pub minimum: u64,
    pub maximum: u64,
    /// Number of available outputs of an amount needed per required mixin
    pub upgrade_size: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyParams {
    pub window: u32,
    pub initial: u64,
}

/// Consensus constants of a network. Values that change with block versions are stored
/// as `(first version, value)` lists in ascending version order.
#[derive(Debug, Clone)]
pub struct Currency {
    pub network: Network,
    /// Heights at which block major versions 2, 3, ... activate
    pub upgrade_heights: Vec<u32>,
    pub block_time: u64,
    pub difficulty: Vec<(u8, DifficultyParams)>,
    pub mixin: Vec<(u8, MixinParams)>,
    pub min_transaction_version: u8,
    pub max_transaction_version: u8,
    /// Unlock times below this value are block indexes, otherwise unix timestamps
    pub max_block_height: u64,
    pub mined_money_unlock_window: u32,
    pub locked_tx_allowed_delta_blocks: u64,
    pub locked_tx_allowed_delta_seconds: u64,
    pub block_future_time_limit: u64,
    pub timestamp_check_window: u32,
    pub money_supply: u64,
    pub emission_speed_factor: u32,
    pub genesis_block_reward: u64,
    pub reward_blocks_window: u32,
    pub full_reward_zone: u64,
    pub coinbase_blob_reserved_size: u64,
    pub max_block_size_initial: u64,
    pub max_block_size_growth_numerator: u64,
    pub max_block_size_growth_denominator: u64,
    pub max_transaction_size: u64,
    pub minimum_fee: u64,
    /// Alternative leaves further than this below the main tip become prunable
    pub alternative_chain_retention_blocks: u32,
    /// Alternative leaves that would need more than this many blocks of the main tip's
    /// difficulty to catch up become prunable
    pub alternative_chain_catch_up_blocks: u64,
    pub pool_transaction_timeout: u64,
    pub genesis_timestamp: u64,
    pub genesis_coinbase_key: PublicKey,
}

impl Default for Currency {
    fn default() -> Self {
        Currency::from_network(Network::Mainnet)
    }
}

impl Currency {
    pub fn from_network(network: Network) -> Self {
        let base = Self {
            network,
            upgrade_heights: vec![],
            block_time: 120,
            difficulty: vec![(
                1,
                DifficultyParams {
                    window: 60,
                    initial: 100_000,
                },
            )],
            mixin: vec![(
                1,
                MixinParams {
                    minimum: 2,
                    maximum: 8,
                    upgrade_size: 4,
                },
            )],
            min_transaction_version: 1,
            max_transaction_version: 1,
            max_block_height: 500_000_000,
            mined_money_unlock_window: 10,
            locked_tx_allowed_delta_blocks: 1,
            locked_tx_allowed_delta_seconds: 120,
            block_future_time_limit: 2 * 60 * 60,
            timestamp_check_window: 60,
            money_supply: u64::MAX,
            emission_speed_factor: 20,
            genesis_block_reward: 0,
            reward_blocks_window: 100,
            full_reward_zone: 100_000,
            coinbase_blob_reserved_size: 600,
            max_block_size_initial: 1_000_000,
            max_block_size_growth_numerator: 100 * 1024,
            max_block_size_growth_denominator: 365 * 24 * 60 * 60 / 120,
            max_transaction_size: 100_000,
            minimum_fee: 100,
            alternative_chain_retention_blocks: 720,
            alternative_chain_catch_up_blocks: 60,
            pool_transaction_timeout: 24 * 60 * 60,
            genesis_timestamp: 1_546_300_800,
            genesis_coinbase_key: PublicKey::zero(),
        };

        match network {
            Network::Mainnet => base,
            Network::Testnet => Self {
                upgrade_heights: vec![],
                genesis_timestamp: 1_546_300_801,
                ..base
            },
            Network::Regtest => Self {
                block_time: 60,
                difficulty: vec![(
                    1,
                    DifficultyParams {
                        window: 720,
                        initial: 1,
                    },
                )],
                mixin: vec![(
                    1,
                    MixinParams {
                        minimum: 0,
                        maximum: 10,
                        upgrade_size: 1,
                    },
                )],
                mined_money_unlock_window: 3,
                locked_tx_allowed_delta_seconds: 60,
                block_future_time_limit: u32::MAX as u64,
                timestamp_check_window: 11,
                minimum_fee: 10,
                alternative_chain_retention_blocks: 10,
                alternative_chain_catch_up_blocks: 5,
                genesis_timestamp: 1_000_000,
                ..base
            },
        }
    }

    /// Expected major version of the block at `index`
    pub fn block_version(&self, index: u32) -> u8 {
        1 + self
            .upgrade_heights
            .iter()
            .filter(|height| **height <= index)
            .count() as u8
    }

    fn for_version<T: Copy + Default>(values: &[(u8, T)], version: u8) -> T {
        values
            .iter()
            .rev()
            .find(|(first, _)| *first <= version)
            .or_else(|| values.first())
            .map(|(_, value)| *value)
            .unwrap_or_default()
    }

    pub fn difficulty_params(&self, version: u8) -> DifficultyParams {
        Self::for_version(&self.difficulty, version)
    }

    pub fn mixin_params(&self, version: u8) -> MixinParams {
        Self::for_version(&self.mixin, version)
    }

    pub fn is_transaction_version_supported(&self, version: u8) -> bool {
        version >= self.min_transaction_version && version <= self.max_transaction_version
    }

    pub fn is_height_lock(&self, unlock_time: u64) -> bool {
        unlock_time < self.max_block_height
    }

    /// Unlock check when both the block index and the timestamp are known
    pub fn is_spend_time_unlocked_explicit(
        &self,
        unlock_time: u64,
        block_index: u32,
        timestamp: u64,
    ) -> bool {
        if self.is_height_lock(unlock_time) {
            block_index as u64 + self.locked_tx_allowed_delta_blocks >= unlock_time
        } else {
            timestamp + self.locked_tx_allowed_delta_seconds >= unlock_time
        }
    }

    /// Least chain state at which an output with this unlock time can be spent
    pub fn eligible_index_for_unlock(&self, unlock_time: u64) -> EligibleIndex {
        if self.is_height_lock(unlock_time) {
            let height = unlock_time.saturating_sub(self.locked_tx_allowed_delta_blocks);
            EligibleIndex::new(height as u32, 0)
        } else {
            EligibleIndex::new(
                0,
                unlock_time.saturating_sub(self.locked_tx_allowed_delta_seconds),
            )
        }
    }

    /// Reward minus penalty for blocks above the median size. Returns `None` when the
    /// block is more than twice the median, otherwise `(reward, emission)` where emission
    /// is the amount of newly generated coins.
    pub fn get_block_reward(
        &self,
        median_size: u64,
        current_block_size: u64,
        already_generated_coins: u64,
        fee: u64,
    ) -> Option<(u64, u64)> {
        let mut base_reward =
            self.money_supply.saturating_sub(already_generated_coins) >> self.emission_speed_factor;
        if already_generated_coins == 0 && self.genesis_block_reward != 0 {
            base_reward = self.genesis_block_reward;
        }

        let median_size = std::cmp::max(median_size, self.full_reward_zone);
        if current_block_size > 2 * median_size {
            return None;
        }

        let penalized_base_reward =
            Self::penalized_amount(base_reward, median_size, current_block_size);
        let penalized_fee = Self::penalized_amount(fee, median_size, current_block_size);

        Some((penalized_base_reward + penalized_fee, penalized_base_reward))
    }

    fn penalized_amount(amount: u64, median_size: u64, current_block_size: u64) -> u64 {
        if amount == 0 || current_block_size <= median_size {
            return amount;
        }
        let median = median_size as u128;
        let size = current_block_size as u128;
        let product = amount as u128 * (2 * median - size) * size;
        (product / (median * median)) as u64
    }

    pub fn max_block_cumulative_size(&self, index: u32) -> u64 {
        self.max_block_size_initial
            + (index as u64 * self.max_block_size_growth_numerator)
                / self.max_block_size_growth_denominator
    }

    /// Largest transaction the pool accepts, leaves room for the coinbase in a block of
    /// full reward zone size
    pub fn pool_transaction_size_limit(&self) -> u64 {
        self.full_reward_zone
            .saturating_sub(self.coinbase_blob_reserved_size)
    }

    /// Amount of available outputs needed for an amount to count as fully mixed
    pub fn mixin_threshold(&self, version: u8) -> u64 {
        let params = self.mixin_params(version);
        params.minimum * params.upgrade_size
    }

    /// Mixin a transaction spending an amount with `available` unlocked outputs must use
    pub fn required_mixin(&self, version: u8, available: u64) -> u64 {
        let params = self.mixin_params(version);
        if params.upgrade_size == 0 {
            return params.minimum;
        }
        std::cmp::min(available / params.upgrade_size, params.minimum)
    }

    pub fn genesis_block(&self) -> Block {
        Block {
            header: BlockHeader {
                major_version: 1,
                minor_version: 0,
                timestamp: self.genesis_timestamp,
                previous_block_hash: Hash::zero(),
                nonce: 0,
            },
            base_transaction: self.coinbase_transaction(
                0,
                self.genesis_block_reward,
                self.genesis_coinbase_key,
            ),
            transaction_hashes: vec![],
        }
    }

    /// Coinbase paying `reward` to `key` in a single output, no outputs for a zero reward
    pub fn coinbase_transaction(&self, index: u32, reward: u64, key: PublicKey) -> Transaction {
        let outputs = if reward == 0 {
            vec![]
        } else {
            vec![TransactionOutput {
                amount: reward,
                key,
            }]
        };
        Transaction {
            version: self.max_transaction_version,
            unlock_time: index as u64 + self.mined_money_unlock_window as u64,
            inputs: vec![TransactionInput::Base { block_index: index }],
            outputs,
            extra: TransactionExtra {
                public_key: Some(key),
                ..Default::default()
            },
            signatures: vec![],
        }
    }

    pub fn genesis_block_hash(&self) -> Result<Hash, EncodeError> {
        Ok(crate::primitives::CachedBlock::new(self.genesis_block())?.hash())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_block_version() {
        let mut currency = Currency::from_network(Network::Regtest);
        currency.upgrade_heights = vec![10, 20];
        assert_eq!(currency.block_version(0), 1);
        assert_eq!(currency.block_version(9), 1);
        assert_eq!(currency.block_version(10), 2);
        assert_eq!(currency.block_version(25), 3);
    }

    #[test]
    fn test_unlock() {
        let currency = Currency::from_network(Network::Regtest);
        // height lock
        assert!(!currency.is_spend_time_unlocked_explicit(100, 98, 0));
        assert!(currency.is_spend_time_unlocked_explicit(100, 99, 0));
        assert_eq!(
            currency.eligible_index_for_unlock(100),
            EligibleIndex::new(99, 0)
        );

        // timestamp lock
        let unlock = 1_600_000_000;
        assert!(!currency.is_spend_time_unlocked_explicit(unlock, 0, unlock - 61));
        assert!(currency.is_spend_time_unlocked_explicit(unlock, 0, unlock - 60));
        assert_eq!(
            currency.eligible_index_for_unlock(unlock),
            EligibleIndex::new(0, unlock - 60)
        );
    }

    #[test]
    fn test_block_reward() {
        let currency = Currency::from_network(Network::Regtest);
        let base = u64::MAX >> 20;
        assert_eq!(currency.get_block_reward(0, 1_000, 0, 5), Some((base + 5, base)));

        // twice the full reward zone is the hard limit
        let zone = currency.full_reward_zone;
        assert!(currency.get_block_reward(0, 2 * zone + 1, 0, 0).is_none());

        // penalty above the median
        let (reward, _) = currency.get_block_reward(0, zone * 3 / 2, 0, 0).unwrap();
        assert!(reward < base);
    }

    #[test]
    fn test_required_mixin() {
        let mut currency = Currency::from_network(Network::Regtest);
        currency.mixin = vec![(
            1,
            MixinParams {
                minimum: 3,
                maximum: 10,
                upgrade_size: 2,
            },
        )];
        assert_eq!(currency.mixin_threshold(1), 6);
        assert_eq!(currency.required_mixin(1, 0), 0);
        assert_eq!(currency.required_mixin(1, 3), 1);
        assert_eq!(currency.required_mixin(1, 6), 3);
        assert_eq!(currency.required_mixin(1, 100), 3);
    }
}
