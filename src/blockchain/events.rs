use super::view::SegmentView;
use super::SegmentId;
use crate::crypto::SignatureVerifier;
use crate::primitives::Hash;
use crate::protocol::Currency;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditionReason {
    Incoming,
    /// Re-admitted from a block that left the main chain
    MainChainSwitch,
    /// Restored from a pool snapshot
    Deserialization,
    /// Added without publishing an event
    SkipNotify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionReason {
    AddedToMainChain,
    KeyImageUsedInMainChain,
    PoolCleanupProcedure,
    BlockMajorVersionUpgrade,
    Outdated,
    Forced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BlockAdded {
        index: u32,
        hash: Hash,
    },
    MainChainSwitched {
        previous_leaf: SegmentId,
        current_leaf: SegmentId,
        split_index: u32,
    },
    TransactionAddedToPool {
        hash: Hash,
        reason: AdditionReason,
    },
    TransactionDeletedFromPool {
        hash: Hash,
        reason: DeletionReason,
    },
}

/// Fans events out to every subscriber, subscribers that went away are dropped
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    pub fn publish(&self, event: Event) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// State of the main chain handed to listeners
pub struct ChainContext<'a> {
    pub main: SegmentView<'a>,
    pub currency: &'a Currency,
    pub verifier: &'a dyn SignatureVerifier,
}

impl<'a> ChainContext<'a> {
    pub fn top_index(&self) -> u32 {
        self.main.top_index()
    }

    /// Major version of the block that would be mined next
    pub fn next_block_version(&self) -> u8 {
        self.currency.block_version(self.top_index() + 1)
    }
}

/// Trait that handles chain events. Called synchronously, in order, while the chain is
/// being mutated.
pub trait ChainListener: Send + Sync {
    /// Called when a block is added on top of the main chain
    fn block_added(&self, _context: &ChainContext, _index: u32, _hash: &Hash) {}
    /// Called after an alternative chain became main. `previous` is the old main chain,
    /// blocks from `split_index` on differ between the two.
    fn main_chain_switched(
        &self,
        _context: &ChainContext,
        _previous: SegmentView,
        _split_index: u32,
    ) {
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_publish_drops_closed() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();
        drop(second);

        let event = Event::BlockAdded {
            index: 1,
            hash: Hash::zero(),
        };
        bus.publish(event.clone());
        assert_eq!(first.try_recv().unwrap(), event);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
