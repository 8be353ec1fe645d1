mod comparator;
mod mempool;
mod snapshot;

pub use comparator::priority_order;
pub use mempool::{PendingTransactionInfo, TransactionPool};
pub use snapshot::PoolSnapshot;
