//! Validating full node core for a CryptoNote style cryptocurrency

/// Chain tree, block ingestion and chain events
pub mod blockchain;
/// Hard coded block hashes that every chain has to agree with
pub mod checkpoints;
pub mod crypto;
/// Persistence of the main chain
pub mod db;
pub mod error;
/// Unconfirmed transactions waiting to be mined
pub mod mempool;
pub mod node;
pub mod primitives;
/// Consensus parameters and difficulty
pub mod protocol;
pub mod util;
/// Transaction and block validation rules
pub mod verification;

pub use blockchain::{AddBlockResult, ChainListener, Core, CoreOptions, Event};
pub use mempool::TransactionPool;
pub use node::{Node, NodeConfig};
