use super::segment::{CachedBlockInfo, PushedBlockInfo, Segment, SegmentId};
use super::view::SegmentView;
use crate::primitives::{CachedTransaction, Hash};
use crate::protocol::Currency;
use log::debug;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Arena of chain segments. `leaves[0]` is the top of the main chain, the other leaves are
/// the tops of alternative chains.
pub struct ChainTree {
    segments: Vec<Option<Segment>>,
    /// emptied slots, reused by the next insert
    free: Vec<SegmentId>,
    leaves: Vec<SegmentId>,
    next_sequence: u64,
    currency: Arc<Currency>,
}

impl ChainTree {
    pub fn new(currency: Arc<Currency>) -> Self {
        Self {
            segments: vec![],
            free: vec![],
            leaves: vec![],
            next_sequence: 0,
            currency,
        }
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id).and_then(Option::as_ref)
    }

    fn segment_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.segments.get_mut(id).and_then(Option::as_mut)
    }

    pub fn view(&self, id: SegmentId) -> SegmentView<'_> {
        SegmentView::new(self, id)
    }

    pub fn main_leaf(&self) -> Option<SegmentId> {
        self.leaves.first().copied()
    }

    pub fn main_view(&self) -> Option<SegmentView<'_>> {
        self.main_leaf().map(|id| self.view(id))
    }

    pub fn leaves(&self) -> &[SegmentId] {
        &self.leaves
    }

    pub fn is_leaf(&self, id: SegmentId) -> bool {
        self.leaves.contains(&id)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.iter().filter(|segment| segment.is_some()).count()
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Id the next inserted segment gets
    fn next_id(&self) -> SegmentId {
        self.free.last().copied().unwrap_or(self.segments.len())
    }

    fn insert(&mut self, segment: Segment) -> SegmentId {
        match self.free.pop() {
            Some(id) => {
                self.segments[id] = Some(segment);
                id
            }
            None => {
                self.segments.push(Some(segment));
                self.segments.len() - 1
            }
        }
    }

    fn release(&mut self, id: SegmentId) -> Option<Segment> {
        let segment = self.segments.get_mut(id)?.take()?;
        self.free.push(id);
        Some(segment)
    }

    /// Creates the root segment, which becomes the main leaf
    pub fn create_root(&mut self) -> SegmentId {
        debug_assert!(self.is_empty());
        let sequence = self.next_sequence();
        let id = self.insert(Segment::new(0, None, sequence));
        self.leaves.push(id);
        id
    }

    /// Creates an empty leaf starting right after the last block of `parent`
    pub fn create_child(&mut self, parent: SegmentId) -> Option<SegmentId> {
        let start_index = self.segment(parent)?.end_index();
        let sequence = self.next_sequence();
        let id = self.insert(Segment::new(start_index, Some(parent), sequence));
        self.segment_mut(parent)?.children.push(id);
        if let Some(position) = self.leaves.iter().position(|leaf| *leaf == parent) {
            self.leaves.remove(position);
        }
        self.leaves.push(id);
        Some(id)
    }

    /// Splits a segment so that `split_index` becomes the first block of a new upper
    /// segment. The upper part takes over the children and the leaf role.
    pub fn split(&mut self, id: SegmentId, split_index: u32) -> Option<SegmentId> {
        let sequence = self.segment(id)?.sequence;
        let new_id = self.next_id();

        let lower = self.segment_mut(id)?;
        let mut upper = lower.split_off(split_index, sequence);
        upper.parent = Some(id);
        upper.children = std::mem::replace(&mut lower.children, vec![new_id]);
        let children = upper.children.clone();

        let inserted = self.insert(upper);
        debug_assert_eq!(inserted, new_id);

        for child in children {
            if let Some(child) = self.segment_mut(child) {
                child.parent = Some(new_id);
            }
        }
        for leaf in self.leaves.iter_mut() {
            if *leaf == id {
                *leaf = new_id;
            }
        }
        debug!("Split segment {} at {} into {}", id, split_index, new_id);
        Some(new_id)
    }

    /// Pushes a block on top of a segment. The previous block may live in a parent segment.
    /// Returns `None`, leaving the tree untouched, for a missing segment, when the
    /// cumulative difficulty would overflow or when a position exceeds its packed width.
    pub fn push_block(
        &mut self,
        id: SegmentId,
        hash: Hash,
        timestamp: u64,
        pushed: PushedBlockInfo,
        transactions: Vec<Arc<CachedTransaction>>,
    ) -> Option<&CachedBlockInfo> {
        let view = self.view(id);
        let segment = self.segment(id)?;
        let index = segment.end_index();

        let previous = match index {
            0 => None,
            _ => Some(view.get_block_info(index - 1)?.clone()),
        };

        let mut output_counts = HashMap::new();
        if let Some(parent) = segment.parent {
            let parent_view = self.view(parent);
            for transaction in &transactions {
                for output in &transaction.transaction().outputs {
                    if segment.key_outputs.contains_key(&output.amount) {
                        continue;
                    }
                    output_counts.entry(output.amount).or_insert_with(|| {
                        parent_view.get_key_outputs_count_for_amount(output.amount, index - 1)
                    });
                }
            }
        }

        let transaction_count = transactions.len() as u64;
        let info = match &previous {
            Some(previous) => CachedBlockInfo {
                hash,
                timestamp,
                block_size: pushed.block_size,
                cumulative_difficulty: previous
                    .cumulative_difficulty
                    .checked_add(pushed.block_difficulty)?,
                already_generated_coins: previous
                    .already_generated_coins
                    .saturating_add(pushed.generated_coins),
                already_generated_transactions: previous.already_generated_transactions
                    + transaction_count,
            },
            None => CachedBlockInfo {
                hash,
                timestamp,
                block_size: pushed.block_size,
                cumulative_difficulty: pushed.block_difficulty,
                already_generated_coins: pushed.generated_coins,
                already_generated_transactions: transaction_count,
            },
        };

        let segment = self.segment_mut(id)?;
        segment.push_block(info, pushed, transactions, &output_counts)?;
        segment.top_block()
    }

    /// Segment holding the block, main chain first
    pub fn find_segment_containing_block(&self, hash: &Hash) -> Option<SegmentId> {
        if let Some(main) = self.main_view() {
            if let Some(segment) = main
                .segments()
                .find(|segment| segment.block_index_by_hash.contains_key(hash))
            {
                return self.id_of(segment);
            }
        }
        self.segments.iter().enumerate().find_map(|(id, segment)| {
            segment
                .as_ref()
                .filter(|segment| segment.block_index_by_hash.contains_key(hash))
                .map(|_| id)
        })
    }

    fn id_of(&self, target: &Segment) -> Option<SegmentId> {
        self.segments.iter().position(|segment| {
            segment
                .as_ref()
                .map_or(false, |segment| std::ptr::eq(segment, target))
        })
    }

    /// Ids of this segment and its ancestors
    pub fn ancestry(&self, id: SegmentId) -> Vec<SegmentId> {
        let mut ids = vec![];
        let mut next = Some(id);
        while let Some(current) = next {
            ids.push(current);
            next = self.segment(current).and_then(|segment| segment.parent);
        }
        ids
    }

    pub fn is_main_chain_segment(&self, id: SegmentId) -> bool {
        self.main_leaf()
            .map_or(false, |main| self.ancestry(main).contains(&id))
    }

    pub fn leaf_cumulative_difficulty(&self, leaf: SegmentId) -> u64 {
        self.view(leaf)
            .top_block()
            .map_or(0, |info| info.cumulative_difficulty)
    }

    /// Picks the leaf with the most cumulative difficulty, ties keep the current main chain
    /// and then prefer the older chain. Returns `(previous, current)` when main changed.
    pub fn update_main_chain(&mut self) -> Option<(SegmentId, SegmentId)> {
        let current = self.main_leaf()?;
        let best = self.leaves.iter().copied().max_by_key(|leaf| {
            (
                self.leaf_cumulative_difficulty(*leaf),
                *leaf == current,
                Reverse(self.segment(*leaf).map_or(u64::MAX, |segment| segment.sequence)),
            )
        })?;
        if best == current {
            return None;
        }
        let position = self.leaves.iter().position(|leaf| *leaf == best)?;
        self.leaves.swap(0, position);
        Some((current, best))
    }

    /// First index not shared by the chains ending at the two leaves
    pub fn split_index(&self, a: SegmentId, b: SegmentId) -> u32 {
        let ancestors: HashSet<SegmentId> = self.ancestry(a).into_iter().collect();
        self.ancestry(b)
            .into_iter()
            .find(|id| ancestors.contains(id))
            .and_then(|common| {
                let end = self.segment(common)?.end_index();
                let top_a = self.segment(a)?.end_index();
                let top_b = self.segment(b)?.end_index();
                Some(end.min(top_a).min(top_b))
            })
            .unwrap_or(0)
    }

    /// Removes a leaf. A parent left without children becomes a leaf again.
    pub fn delete_leaf(&mut self, id: SegmentId) -> Option<Segment> {
        let position = self.leaves.iter().position(|leaf| *leaf == id)?;
        if position == 0 {
            return None;
        }
        self.leaves.remove(position);
        let segment = self.release(id)?;
        if let Some(parent_id) = segment.parent {
            if let Some(parent) = self.segment_mut(parent_id) {
                parent.children.retain(|child| *child != id);
                if parent.children.is_empty() {
                    self.leaves.push(parent_id);
                }
            }
        }
        debug!(
            "Deleted alternative segment {} with {} blocks",
            id,
            segment.len()
        );
        Some(segment)
    }

    /// Merges main chain segments into their parent where the parent has no other child
    pub fn merge_main_segments(&mut self) {
        loop {
            let main = match self.main_leaf() {
                Some(main) => main,
                None => return,
            };
            let mergeable = self.ancestry(main).into_iter().find(|id| {
                self.segment(*id)
                    .and_then(|segment| segment.parent)
                    .and_then(|parent| self.segment(parent))
                    .map_or(false, |parent| parent.children.len() == 1)
            });
            let id = match mergeable {
                Some(id) => id,
                None => return,
            };
            if self.merge_into_parent(id).is_none() {
                return;
            }
        }
    }

    fn merge_into_parent(&mut self, id: SegmentId) -> Option<()> {
        let upper = self.release(id)?;
        let parent_id = upper.parent?;
        let children = upper.children.clone();

        let parent = self.segment_mut(parent_id)?;
        parent.children = children.clone();
        parent.append(upper);

        for child in children {
            if let Some(child) = self.segment_mut(child) {
                child.parent = Some(parent_id);
            }
        }
        for leaf in self.leaves.iter_mut() {
            if *leaf == id {
                *leaf = parent_id;
            }
        }
        debug!("Merged segment {} into {}", id, parent_id);
        Some(())
    }

    /// Number of blocks outside the main chain
    pub fn alternative_block_count(&self) -> usize {
        let main: HashSet<SegmentId> = self
            .main_leaf()
            .map(|main| self.ancestry(main).into_iter().collect())
            .unwrap_or_default();
        self.segments
            .iter()
            .enumerate()
            .filter(|(id, _)| !main.contains(id))
            .filter_map(|(_, segment)| segment.as_ref())
            .map(Segment::len)
            .sum()
    }

    /// Ids of the segments outside the main chain
    pub fn alternative_segments(&self) -> Vec<SegmentId> {
        let main: HashSet<SegmentId> = self
            .main_leaf()
            .map(|main| self.ancestry(main).into_iter().collect())
            .unwrap_or_default();
        self.segments
            .iter()
            .enumerate()
            .filter(|(id, segment)| segment.is_some() && !main.contains(id))
            .map(|(id, _)| id)
            .collect()
    }
}
