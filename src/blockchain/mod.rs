mod core;
mod events;
mod segment;
mod storage;
mod tree;
mod view;

pub use self::core::{AddBlockResult, ChainSupplement, Core, CoreOptions, PoolChanges};
pub use events::{
    AdditionReason, ChainContext, ChainListener, DeletionReason, Event, EventBus,
};
pub use segment::{
    CachedBlockInfo, CachedTransactionInfo, OutputsForAmount, PackedOutIndex, PushedBlockInfo,
    Segment, SegmentId, MAX_OUTPUTS_PER_TRANSACTION, MAX_TRANSACTIONS_PER_BLOCK,
};
pub use storage::{MainChainStorage, SCHEMA_VERSION};
pub use tree::ChainTree;
pub use view::{KeyOutputInfo, SegmentView};
