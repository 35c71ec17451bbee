#![doc = include_str!("../README.md")]
//! The core, batch-oriented unrolled skiplist implementation.
//!
//! This module provides [`SkipList`], an ordered in-memory index whose whole
//! API takes *batches*: slices or vectors of keys and items, pre-sorted
//! ascending under the list's comparator.
//!
//! # Internals
//!
//! -   **Nodes:** Each node holds a small sorted array of items (default 32)
//!     plus a tower of forward pointers whose height is a geometric random
//!     draw. Nodes live in a slot arena; forward pointers are slot indices.
//! -   **Batched traversal:** A batch descends from the head once, for its
//!     first key, then walks the cursor forward for every later key. For
//!     inserts, a per-height vector of the latest pointing node lets a
//!     freshly split tall node be stitched into the upper levels without
//!     re-descending from the head.
//! -   **Lazy removal:** Deleting the last item of a node marks the node.
//!     Marked nodes stay in place until later traversals splice them out of
//!     each level; once a node is unlinked from every level, its slot goes
//!     back to the arena.
//! -   **Exclusion:** Every batch runs under one list-wide mutex, so the
//!     observable state is a linear sequence of completed batches (strict
//!     serializable).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crossbeam_utils::CachePadded;
use log::{debug, trace};

pub mod comparator;
pub mod error;

mod arena;
mod height;
mod node;

pub use crate::comparator::{Comparator, DefaultComparator, FnComparator};
pub use crate::error::BatchError;

use crate::arena::{Arena, NodeId};
use crate::height::HeightSource;
use crate::node::Node;

/// Default number of items a node holds before it splits.
pub const DEFAULT_NODE_CAPACITY: usize = 32;
/// Default maximum tower height.
pub const DEFAULT_MAX_HEIGHT: usize = 32;

const MIN_NODE_CAPACITY: usize = 4;
const MIN_MAX_HEIGHT: usize = 8;

/// An ordered, in-memory key-value index for batched, sorted operations.
///
/// Keys are unique under the list's [`Comparator`]; values pass through by
/// identity. Mutations and reads are issued as batches sorted ascending by
/// key: the traversal reuses its cursor between consecutive keys instead of
/// restarting from the head, which is where batching pays off. Submitting
/// an unsorted batch never corrupts the list, but its per-item results are
/// unspecified.
///
/// Every batch executes under a single list-wide exclusion region and runs
/// to completion; per-item failures are reported in the returned vector and
/// never abort the rest of the batch.
pub struct SkipList<K, V, C = DefaultComparator> {
    cmp: C,
    node_capacity: usize,
    max_height: usize,
    /// Item count, kept outside the mutex so `len` doesn't serialize
    /// against running batches. Approximate only in the sense that it may
    /// trail a batch that is still executing.
    len: CachePadded<AtomicUsize>,
    core: Mutex<Core<K, V>>,
}

impl<K, V, C> SkipList<K, V, C>
where
    C: Comparator<K>,
{
    /// Creates an empty list with the default node capacity and height.
    pub fn new(cmp: C) -> Self {
        Self::with_node_capacity(cmp, DEFAULT_NODE_CAPACITY)
    }

    /// Creates an empty list with a specified per-node item capacity.
    pub fn with_node_capacity(cmp: C, node_capacity: usize) -> Self {
        Self::with_node_capacity_and_height(cmp, node_capacity, DEFAULT_MAX_HEIGHT)
    }

    /// Creates an empty list with a specified node capacity and maximum
    /// tower height.
    ///
    /// # Panics
    ///
    /// Panics when `node_capacity < 4` or `max_height < 8`; the traversal
    /// is insensitive to the exact values but degenerates below those.
    pub fn with_node_capacity_and_height(cmp: C, node_capacity: usize, max_height: usize) -> Self {
        assert!(
            node_capacity >= MIN_NODE_CAPACITY,
            "node capacity must be at least {}",
            MIN_NODE_CAPACITY
        );
        assert!(
            max_height >= MIN_MAX_HEIGHT,
            "max height must be at least {}",
            MIN_MAX_HEIGHT
        );

        let mut arena = Arena::new();
        // The head is a permanently empty sentinel of full height, so no
        // operation ever has to special-case an empty predecessor chain.
        let head = arena.insert(Node::new_empty(max_height, 0));

        SkipList {
            cmp,
            node_capacity,
            max_height,
            len: CachePadded::new(AtomicUsize::new(0)),
            core: Mutex::new(Core {
                arena,
                head,
                heights: HeightSource::new(max_height),
                latest: vec![head; max_height],
            }),
        }
    }

    /// Returns the number of items in the list.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns `true` if the list contains no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-node item capacity this list was built with.
    pub fn node_capacity(&self) -> usize {
        self.node_capacity
    }

    /// Maximum tower height this list was built with.
    pub fn max_height(&self) -> usize {
        self.max_height
    }

    /// Number of live nodes, the head sentinel excluded. Marked nodes that
    /// have not been fully spliced out yet still count. Diagnostic only.
    pub fn node_count(&self) -> usize {
        self.core.lock().unwrap().arena.live() - 1
    }

    /// Inserts a batch of items sorted ascending by key.
    ///
    /// Returns one result per input item, in input order. An item whose key
    /// is already present fails with [`BatchError::KeyExists`] and leaves
    /// the stored value unchanged. Full nodes are split and the insert
    /// retried internally, so callers never see [`BatchError::NodeFull`].
    pub fn insert(&self, items: Vec<(K, V)>) -> Vec<Result<(), BatchError>> {
        if items.is_empty() {
            return Vec::new();
        }
        let mut core = self.core.lock().unwrap();
        let results = core.insert_batch(&self.cmp, self.node_capacity, items);
        let added = results.iter().filter(|r| r.is_ok()).count();
        self.len.fetch_add(added, Ordering::Relaxed);
        results
    }

    /// Replaces the stored values for a batch of items sorted ascending by
    /// key.
    ///
    /// Missing keys fail with [`BatchError::NotFound`] (or
    /// [`BatchError::NodeEmpty`] when the whole target node was emptied
    /// earlier in the batch).
    pub fn update(&self, items: Vec<(K, V)>) -> Vec<Result<(), BatchError>> {
        if items.is_empty() {
            return Vec::new();
        }
        let mut core = self.core.lock().unwrap();
        core.update_batch(&self.cmp, self.node_capacity, items)
    }

    /// Deletes a batch of keys sorted ascending.
    ///
    /// A node emptied by the batch is marked for removal and spliced out of
    /// the tower lazily by later traversals.
    pub fn delete(&self, keys: &[K]) -> Vec<Result<(), BatchError>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let mut core = self.core.lock().unwrap();
        let results = core.delete_batch(&self.cmp, self.node_capacity, keys);
        let removed = results.iter().filter(|r| r.is_ok()).count();
        self.len.fetch_sub(removed, Ordering::Relaxed);
        results
    }

    /// Looks up a batch of keys sorted ascending, returning one value per
    /// key. Missing keys yield a clone of `default`.
    pub fn get(&self, keys: &[K], default: V) -> Vec<V>
    where
        V: Clone,
    {
        if keys.is_empty() {
            return Vec::new();
        }
        let mut core = self.core.lock().unwrap();
        core.get_batch(&self.cmp, self.node_capacity, keys, default)
    }

    /// Visits every item in ascending key order.
    ///
    /// The visitor runs under the list-wide exclusion region: it must not
    /// call back into the list (that deadlocks) and the borrowed item
    /// references are only valid for the duration of each call.
    pub fn scan_all<F: FnMut(&K, &V)>(&self, mut f: F) {
        let mut core = self.core.lock().unwrap();
        core.scan_all_inner(&mut f);
    }

    /// Visits every item with key greater than or equal to `key`,
    /// ascending. Same visitor rules as [`SkipList::scan_all`].
    pub fn scan_ge<F: FnMut(&K, &V)>(&self, key: &K, mut f: F) {
        let mut core = self.core.lock().unwrap();
        core.scan_ge_inner(&self.cmp, self.node_capacity, key, &mut f);
    }

    /// Visits every item with key strictly less than `key`, ascending.
    /// Same visitor rules as [`SkipList::scan_all`].
    pub fn scan_lt<F: FnMut(&K, &V)>(&self, key: &K, mut f: F) {
        let mut core = self.core.lock().unwrap();
        core.scan_lt_inner(&self.cmp, key, &mut f);
    }

    /// Visits every item with `from <= key < to`, ascending. Same visitor
    /// rules as [`SkipList::scan_all`].
    pub fn scan_range<F: FnMut(&K, &V)>(&self, from: &K, to: &K, mut f: F) {
        let mut core = self.core.lock().unwrap();
        core.scan_range_inner(&self.cmp, self.node_capacity, from, to, &mut f);
    }
}

impl<K, V, C> Default for SkipList<K, V, C>
where
    C: Comparator<K> + Default,
{
    fn default() -> Self {
        Self::new(C::default())
    }
}

/// Everything the exclusion region protects: the arena, the head sentinel,
/// the height source and the per-height insert scratch vector.
struct Core<K, V> {
    arena: Arena<K, V>,
    head: NodeId,
    heights: HeightSource,
    /// `latest[h]` is the most recently visited node whose tower reaches
    /// level `h`. Reset to the head when an insert batch starts and updated
    /// on every forward move; consulted only when a split produces a node
    /// taller than the node it split from.
    latest: Vec<NodeId>,
}

impl<K, V> Core<K, V> {
    fn next_of(&self, id: NodeId, level: usize) -> Option<NodeId> {
        self.arena[id]
            .next_at(level)
            .expect("forward pointer read outside node height; the list structure is corrupted")
    }

    fn connect(&mut self, id: NodeId, level: usize, next: Option<NodeId>) {
        self.arena[id]
            .connect(level, next)
            .expect("forward pointer write outside node height; the list structure is corrupted")
    }

    fn disconnect(&mut self, id: NodeId, level: usize) {
        self.arena[id]
            .disconnect(level)
            .expect("forward pointer clear outside node height; the list structure is corrupted")
    }

    fn reset_latest(&mut self) {
        self.latest.fill(self.head);
    }

    fn set_latest(&mut self, id: NodeId) {
        for level in 0..self.arena[id].height() {
            self.latest[level] = id;
        }
    }

    /// Walks past marked nodes at `level`, splicing each one out of the
    /// chain as it goes. Returns the first live successor, or `None` when
    /// the chain ends inside marked nodes.
    ///
    /// This is the only removal mechanism in the list: a marked node loses
    /// one level per traversal that passes it, and the slot of a node
    /// unlinked from every level is handed back to the arena.
    fn skip_marked_at(&mut self, level: usize, prev: NodeId, first: NodeId) -> Option<NodeId> {
        let mut next = first;
        while self.arena[next].is_marked_removed() {
            let after = self.next_of(next, level);
            self.connect(prev, level, after);
            self.disconnect(next, level);
            self.arena[next].note_level_unlinked();
            if self.arena[next].fully_unlinked() {
                self.arena.free(next);
                debug!("reclaimed fully unlinked node slot");
            }
            next = after?;
        }
        Some(next)
    }

    /// Finds the node a batch should start from for its first key,
    /// descending the head's levels from the top.
    ///
    /// When the list is empty this creates (and links) a fresh node, so
    /// callers always get a real node back. When the key orders before
    /// every stored key, the first node is returned and the per-node
    /// operation decides what that means for it.
    fn descend_from_head<C: Comparator<K>>(
        &mut self,
        cmp: &C,
        node_capacity: usize,
        key: &K,
    ) -> NodeId {
        let head = self.head;
        for level in (0..self.arena[head].height()).rev() {
            let Some(first) = self.next_of(head, level) else {
                continue;
            };
            let Some(next) = self.skip_marked_at(level, head, first) else {
                continue;
            };
            // An empty live node reads as "key before min" and we keep
            // descending; the level-0 fallthrough below settles it.
            if let Ok(false) = self.arena[next].key_below_min(cmp, key) {
                self.set_latest(next);
                return next;
            }
        }

        // Either the list is empty or the key orders before every stored
        // key. Level 0 was already swept clean of marked nodes above.
        if let Some(first) = self.next_of(head, 0) {
            self.set_latest(first);
            return first;
        }

        let height = self.heights.next_height();
        let id = self.arena.insert(Node::new_empty(height, node_capacity));
        trace!("list empty; created first node with height {}", height);
        for level in 0..height {
            self.connect(head, level, Some(id));
        }
        self.set_latest(id);
        id
    }

    /// Walks the cursor forward until it reaches the node that should own
    /// `key`. This is the batched-amortization move: consecutive keys of a
    /// sorted batch continue from wherever the previous key left off.
    fn advance_to_correct_node<C: Comparator<K>>(
        &mut self,
        cmp: &C,
        key: &K,
        mut current: NodeId,
    ) -> NodeId {
        'position: loop {
            // An empty (just-deleted) node cannot own any key, so an Err
            // here falls through to probing the successors.
            if let Ok(true) = self.arena[current].key_below_max(cmp, key) {
                return current;
            }
            // Probe from the highest level down; each node covers a lot of
            // keys, so the tall pointers skip most of the remaining walk.
            for level in (0..self.arena[current].height()).rev() {
                let Some(first) = self.next_of(current, level) else {
                    continue;
                };
                let Some(next) = self.skip_marked_at(level, current, first) else {
                    continue;
                };
                if let Ok(true) = self.arena[next].key_below_min(cmp, key) {
                    continue; // `next` starts past the key; try a lower level.
                }
                current = next;
                self.set_latest(current);
                continue 'position;
            }
            // No successor can own the key: it sorts past everything, so it
            // belongs to the last node.
            return current;
        }
    }

    /// Splits a full `current`, wires the new right half into the tower,
    /// re-inserts the item that hit `NodeFull` into whichever half owns it
    /// now, and returns the node the cursor continues from.
    fn split_full_node<C: Comparator<K>>(
        &mut self,
        cmp: &C,
        current: NodeId,
        item: (K, V),
    ) -> NodeId {
        let new_height = self.heights.next_height();
        let new_node = self.arena[current].split_into_new(new_height);
        let new_id = self.arena.insert(new_node);
        let current_height = self.arena[current].height();
        trace!(
            "split full node of height {} into new node of height {}",
            current_height,
            new_height
        );

        // Shared levels splice the new node directly behind `current`.
        let shared = new_height.min(current_height);
        for level in 0..shared {
            let succ = self.next_of(current, level);
            self.connect(new_id, level, succ);
            self.connect(current, level, Some(new_id));
        }
        self.set_latest(current);

        // Levels above `current` go through the most recent taller
        // predecessor seen this batch. The new node orders strictly between
        // that predecessor and its old successor, so carrying the successor
        // over keeps every level's chain intact.
        for level in current_height..new_height {
            let prev = self.latest[level];
            let succ = self.next_of(prev, level);
            self.connect(new_id, level, succ);
            self.connect(prev, level, Some(new_id));
        }

        let target = match self.arena[current].key_below_max(cmp, &item.0) {
            Ok(true) => current,
            _ => {
                self.set_latest(new_id);
                new_id
            }
        };
        if let Err((_, err)) = self.arena[target].insert(cmp, item) {
            panic!("insert after split failed ({err}); the list structure is corrupted");
        }
        target
    }

    fn insert_batch<C: Comparator<K>>(
        &mut self,
        cmp: &C,
        node_capacity: usize,
        items: Vec<(K, V)>,
    ) -> Vec<Result<(), BatchError>> {
        let mut results = Vec::with_capacity(items.len());
        self.reset_latest();
        let mut current = self.descend_from_head(cmp, node_capacity, &items[0].0);

        for item in items {
            current = self.advance_to_correct_node(cmp, &item.0, current);
            let result = match self.arena[current].insert(cmp, item) {
                Ok(()) => Ok(()),
                Err((item, BatchError::NodeFull)) => {
                    current = self.split_full_node(cmp, current, item);
                    Ok(())
                }
                Err((_, err)) => Err(err),
            };
            results.push(result);
        }
        results
    }

    fn update_batch<C: Comparator<K>>(
        &mut self,
        cmp: &C,
        node_capacity: usize,
        items: Vec<(K, V)>,
    ) -> Vec<Result<(), BatchError>> {
        let mut results = Vec::with_capacity(items.len());
        let mut current = self.descend_from_head(cmp, node_capacity, &items[0].0);

        for item in items {
            current = self.advance_to_correct_node(cmp, &item.0, current);
            results.push(self.arena[current].update(cmp, item));
        }
        results
    }

    fn delete_batch<C: Comparator<K>>(
        &mut self,
        cmp: &C,
        node_capacity: usize,
        keys: &[K],
    ) -> Vec<Result<(), BatchError>> {
        let mut results = Vec::with_capacity(keys.len());
        let mut current = self.descend_from_head(cmp, node_capacity, &keys[0]);

        for key in keys {
            current = self.advance_to_correct_node(cmp, key, current);
            let result = self.arena[current].delete(cmp, key);
            if self.arena[current].count() == 0 && !self.arena[current].is_marked_removed() {
                // The marked node keeps serving this batch until the cursor
                // moves past it; traversals splice it out later.
                self.arena[current].mark_removal();
                trace!("node emptied by delete; marked for removal");
            }
            results.push(result);
        }
        results
    }

    fn get_batch<C: Comparator<K>>(
        &mut self,
        cmp: &C,
        node_capacity: usize,
        keys: &[K],
        default: V,
    ) -> Vec<V>
    where
        V: Clone,
    {
        let mut values = Vec::with_capacity(keys.len());
        let mut current = self.descend_from_head(cmp, node_capacity, &keys[0]);

        for key in keys {
            current = self.advance_to_correct_node(cmp, key, current);
            let value = match self.arena[current].get(cmp, key) {
                Ok(v) => v.clone(),
                Err(_) => default.clone(),
            };
            values.push(value);
        }
        values
    }

    /// First live node of the level-0 chain, with marked nodes at the front
    /// spliced out on the way.
    fn first_live_node(&mut self) -> Option<NodeId> {
        let first = self.next_of(self.head, 0)?;
        self.skip_marked_at(0, self.head, first)
    }

    fn scan_all_inner<F: FnMut(&K, &V)>(&mut self, f: &mut F) {
        let Some(mut node) = self.first_live_node() else {
            return;
        };
        loop {
            self.arena[node].scan_all(f);
            let Some(first) = self.next_of(node, 0) else {
                break;
            };
            let Some(next) = self.skip_marked_at(0, node, first) else {
                break;
            };
            node = next;
        }
    }

    fn scan_ge_inner<C: Comparator<K>, F: FnMut(&K, &V)>(
        &mut self,
        cmp: &C,
        node_capacity: usize,
        key: &K,
        f: &mut F,
    ) {
        let node = self.descend_from_head(cmp, node_capacity, key);
        let mut node = self.advance_to_correct_node(cmp, key, node);
        self.arena[node].scan_ge(cmp, key, f);
        loop {
            let Some(first) = self.next_of(node, 0) else {
                break;
            };
            let Some(next) = self.skip_marked_at(0, node, first) else {
                break;
            };
            node = next;
            self.arena[node].scan_all(f);
        }
    }

    fn scan_lt_inner<C: Comparator<K>, F: FnMut(&K, &V)>(&mut self, cmp: &C, key: &K, f: &mut F) {
        let Some(mut node) = self.first_live_node() else {
            return;
        };
        loop {
            // Unless the bound orders strictly past this node's max, the
            // scan ends inside this node.
            let past_max = match self.arena[node].key_above_max(cmp, key) {
                Ok(past) => past,
                Err(_) => true,
            };
            if !past_max {
                self.arena[node].scan_lt(cmp, key, f);
                break;
            }
            self.arena[node].scan_all(f);
            let Some(first) = self.next_of(node, 0) else {
                break;
            };
            let Some(next) = self.skip_marked_at(0, node, first) else {
                break;
            };
            node = next;
        }
    }

    fn scan_range_inner<C: Comparator<K>, F: FnMut(&K, &V)>(
        &mut self,
        cmp: &C,
        node_capacity: usize,
        from: &K,
        to: &K,
        f: &mut F,
    ) {
        let node = self.descend_from_head(cmp, node_capacity, from);
        let mut node = self.advance_to_correct_node(cmp, from, node);

        // Fast path: the whole range ends inside the first node.
        let past_max = match self.arena[node].key_above_max(cmp, to) {
            Ok(past) => past,
            Err(_) => true,
        };
        if !past_max {
            self.arena[node].scan_range(cmp, from, to, f);
            return;
        }

        self.arena[node].scan_ge(cmp, from, f);
        loop {
            let Some(first) = self.next_of(node, 0) else {
                break;
            };
            let Some(next) = self.skip_marked_at(0, node, first) else {
                break;
            };
            node = next;
            let past_max = match self.arena[node].key_above_max(cmp, to) {
                Ok(past) => past,
                Err(_) => true,
            };
            if !past_max {
                self.arena[node].scan_lt(cmp, to, f);
                break;
            }
            self.arena[node].scan_all(f);
        }
    }
}
