//! Nodes of the unrolled skip list.
//!
//! A node is a bounded, sorted array of key-value items plus a tower of
//! forward pointers, one per level of the node's height. The list performs
//! every structural decision (which node a key belongs to, when to split,
//! how to rewire towers); the node only maintains its own sorted contents
//! and reports positions.
//!
//! Nodes are only ever touched under the list-wide exclusion region.

use std::cmp::Ordering;

use crate::arena::NodeId;
use crate::comparator::Comparator;
use crate::error::BatchError;

/// Lifecycle state of a node.
///
/// A node that a delete has emptied is marked and left in place; traversals
/// that later pass over it splice it out of each level they meet it at.
/// Marking is terminal: a marked node never becomes active again and its
/// items never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Active,
    MarkedRemoved,
}

/// One bounded sorted run of items plus its forward-pointer tower.
pub(crate) struct Node<K, V> {
    state: NodeState,
    /// Maximum number of items this node may hold.
    capacity: usize,
    /// Live items, strictly ascending by key.
    items: Vec<(K, V)>,
    height: usize,
    /// `next[i]` is the successor at level `i`, if any.
    next: Vec<Option<NodeId>>,
    /// How many levels this node has been spliced out of since it was
    /// marked. At `height` the node is unreachable and its slot can go
    /// back to the arena.
    unlinked_levels: usize,
}

impl<K, V> Node<K, V> {
    pub(crate) fn new_empty(height: usize, capacity: usize) -> Self {
        Node {
            state: NodeState::Active,
            capacity,
            items: Vec::with_capacity(capacity),
            height,
            next: vec![None; height],
            unlinked_levels: 0,
        }
    }

    /// Builds a node around an already-sorted run of items. Used by
    /// [`Node::split_into_new`]; the caller vouches for the ordering.
    fn from_sorted(height: usize, capacity: usize, items: Vec<(K, V)>) -> Self {
        let mut node = Node::new_empty(height, capacity);
        node.items = items;
        node
    }

    pub(crate) fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn count(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn mark_removal(&mut self) {
        self.state = NodeState::MarkedRemoved;
    }

    pub(crate) fn is_marked_removed(&self) -> bool {
        self.state == NodeState::MarkedRemoved
    }

    /// Records that one more level of this node's tower has been spliced
    /// out of its chain.
    pub(crate) fn note_level_unlinked(&mut self) {
        self.unlinked_levels += 1;
    }

    /// Whether every level of the tower has been spliced out, making the
    /// node unreachable.
    pub(crate) fn fully_unlinked(&self) -> bool {
        self.unlinked_levels == self.height
    }

    pub(crate) fn min_key(&self) -> Option<&K> {
        self.items.first().map(|(k, _)| k)
    }

    pub(crate) fn max_key(&self) -> Option<&K> {
        self.items.last().map(|(k, _)| k)
    }

    /// Binary-searches for `key`, returning its position if present.
    fn position_exact<C: Comparator<K>>(&self, cmp: &C, key: &K) -> Option<usize> {
        self.items
            .binary_search_by(|(k, _)| cmp.compare(k, key))
            .ok()
    }

    /// Returns the smallest index whose key orders greater than or equal to
    /// `key`, or `None` when every item orders below it.
    ///
    /// Nodes are small, so a linear scan is fine here; only the exact
    /// lookup warrants a binary search.
    fn lower_bound<C: Comparator<K>>(&self, cmp: &C, key: &K) -> Option<usize> {
        self.items
            .iter()
            .position(|(k, _)| cmp.compare(k, key) != Ordering::Less)
    }

    /// Splices `item` in at its sorted position.
    ///
    /// Fails with `KeyExists` when the key is already present (checked
    /// before capacity, so a full node still reports duplicates as such)
    /// and with `NodeFull` at capacity. On failure the item is handed back
    /// so the list can retry it after a split.
    pub(crate) fn insert<C: Comparator<K>>(
        &mut self,
        cmp: &C,
        item: (K, V),
    ) -> Result<(), ((K, V), BatchError)> {
        if self.exists(cmp, &item.0) {
            return Err((item, BatchError::KeyExists));
        }
        if self.items.len() == self.capacity {
            return Err((item, BatchError::NodeFull));
        }
        match self.lower_bound(cmp, &item.0) {
            Some(idx) => self.items.insert(idx, item),
            None => self.items.push(item),
        }
        Ok(())
    }

    /// Removes `key`, shifting later items left.
    pub(crate) fn delete<C: Comparator<K>>(&mut self, cmp: &C, key: &K) -> Result<(), BatchError> {
        if self.items.is_empty() {
            return Err(BatchError::NodeEmpty);
        }
        match self.position_exact(cmp, key) {
            Some(idx) => {
                self.items.remove(idx);
                Ok(())
            }
            None => Err(BatchError::NotFound),
        }
    }

    /// Replaces the stored value for the item's key in place.
    pub(crate) fn update<C: Comparator<K>>(
        &mut self,
        cmp: &C,
        item: (K, V),
    ) -> Result<(), BatchError> {
        if self.items.is_empty() {
            return Err(BatchError::NodeEmpty);
        }
        match self.position_exact(cmp, &item.0) {
            Some(idx) => {
                self.items[idx].1 = item.1;
                Ok(())
            }
            None => Err(BatchError::NotFound),
        }
    }

    pub(crate) fn get<C: Comparator<K>>(&self, cmp: &C, key: &K) -> Result<&V, BatchError> {
        if self.items.is_empty() {
            return Err(BatchError::NodeEmpty);
        }
        match self.position_exact(cmp, key) {
            Some(idx) => Ok(&self.items[idx].1),
            None => Err(BatchError::NotFound),
        }
    }

    pub(crate) fn exists<C: Comparator<K>>(&self, cmp: &C, key: &K) -> bool {
        self.position_exact(cmp, key).is_some()
    }

    /// Whether `key` orders strictly before this node's largest key.
    pub(crate) fn key_below_max<C: Comparator<K>>(
        &self,
        cmp: &C,
        key: &K,
    ) -> Result<bool, BatchError> {
        match self.max_key() {
            Some(max) => Ok(cmp.compare(key, max) == Ordering::Less),
            None => Err(BatchError::NodeEmpty),
        }
    }

    /// Whether `key` orders strictly after this node's largest key.
    pub(crate) fn key_above_max<C: Comparator<K>>(
        &self,
        cmp: &C,
        key: &K,
    ) -> Result<bool, BatchError> {
        match self.max_key() {
            Some(max) => Ok(cmp.compare(key, max) == Ordering::Greater),
            None => Err(BatchError::NodeEmpty),
        }
    }

    /// Whether `key` orders strictly before this node's smallest key.
    pub(crate) fn key_below_min<C: Comparator<K>>(
        &self,
        cmp: &C,
        key: &K,
    ) -> Result<bool, BatchError> {
        match self.min_key() {
            Some(min) => Ok(cmp.compare(key, min) == Ordering::Less),
            None => Err(BatchError::NodeEmpty),
        }
    }

    /// Sets the successor at `level`.
    pub(crate) fn connect(&mut self, level: usize, next: Option<NodeId>) -> Result<(), BatchError> {
        if level >= self.height {
            return Err(BatchError::HeightOutOfRange);
        }
        self.next[level] = next;
        Ok(())
    }

    /// Clears the successor at `level`.
    pub(crate) fn disconnect(&mut self, level: usize) -> Result<(), BatchError> {
        if level >= self.height {
            return Err(BatchError::HeightOutOfRange);
        }
        self.next[level] = None;
        Ok(())
    }

    /// Returns the successor at `level`.
    pub(crate) fn next_at(&self, level: usize) -> Result<Option<NodeId>, BatchError> {
        if level >= self.height {
            return Err(BatchError::HeightOutOfRange);
        }
        Ok(self.next[level])
    }

    pub(crate) fn scan_all<F: FnMut(&K, &V)>(&self, f: &mut F) {
        for (k, v) in &self.items {
            f(k, v);
        }
    }

    /// Visits every item whose key orders greater than or equal to `key`.
    pub(crate) fn scan_ge<C: Comparator<K>, F: FnMut(&K, &V)>(&self, cmp: &C, key: &K, f: &mut F) {
        if let Some(idx) = self.lower_bound(cmp, key) {
            for (k, v) in &self.items[idx..] {
                f(k, v);
            }
        }
    }

    /// Visits every item whose key orders strictly before `key`.
    pub(crate) fn scan_lt<C: Comparator<K>, F: FnMut(&K, &V)>(&self, cmp: &C, key: &K, f: &mut F) {
        for (k, v) in &self.items {
            if cmp.compare(k, key) != Ordering::Less {
                break;
            }
            f(k, v);
        }
    }

    /// Visits every item with `from <= key < to`, the node-local fast path
    /// for range scans that fit inside one node.
    pub(crate) fn scan_range<C: Comparator<K>, F: FnMut(&K, &V)>(
        &self,
        cmp: &C,
        from: &K,
        to: &K,
        f: &mut F,
    ) {
        let Some(start) = self.lower_bound(cmp, from) else {
            return;
        };
        for (k, v) in &self.items[start..] {
            if cmp.compare(k, to) != Ordering::Less {
                break;
            }
            f(k, v);
        }
    }

    /// Moves the upper half of this node's items into a fresh node of the
    /// given height and truncates this node to the lower half.
    ///
    /// Forward pointers of both halves are the caller's responsibility;
    /// this only redistributes items.
    pub(crate) fn split_into_new(&mut self, height: usize) -> Node<K, V> {
        let at = self.items.len() / 2;
        let upper = self.items.split_off(at);
        Node::from_sorted(height, self.capacity, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::DefaultComparator;

    const CMP: DefaultComparator = DefaultComparator;

    fn filled(height: usize, capacity: usize, keys: &[u32]) -> Node<u32, u32> {
        let mut node = Node::new_empty(height, capacity);
        for &k in keys {
            node.insert(&CMP, (k, k * 10)).unwrap();
        }
        node
    }

    #[test]
    fn insert_keeps_items_sorted() {
        let node = filled(1, 8, &[5, 1, 3, 9, 7]);
        assert_eq!(node.count(), 5);
        assert_eq!(node.min_key(), Some(&1));
        assert_eq!(node.max_key(), Some(&9));
        let mut keys = Vec::new();
        node.scan_all(&mut |k, _| keys.push(*k));
        assert_eq!(keys, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn insert_rejects_duplicates_and_overflow() {
        let mut node = filled(1, 4, &[1, 2, 3]);
        let ((k, _), err) = node.insert(&CMP, (2, 99)).unwrap_err();
        assert_eq!((k, err), (2, BatchError::KeyExists));
        assert_eq!(*node.get(&CMP, &2).unwrap(), 20);

        node.insert(&CMP, (4, 40)).unwrap();
        let ((k, _), err) = node.insert(&CMP, (5, 50)).unwrap_err();
        assert_eq!((k, err), (5, BatchError::NodeFull));
        // A duplicate of a full node still reads as a duplicate.
        let (_, err) = node.insert(&CMP, (3, 30)).unwrap_err();
        assert_eq!(err, BatchError::KeyExists);
    }

    #[test]
    fn get_update_delete_report_missing_keys() {
        let mut node = filled(1, 8, &[2, 4, 6]);
        assert_eq!(node.get(&CMP, &5), Err(BatchError::NotFound));
        assert_eq!(node.update(&CMP, (5, 0)), Err(BatchError::NotFound));
        assert_eq!(node.delete(&CMP, &5), Err(BatchError::NotFound));

        node.update(&CMP, (4, 400)).unwrap();
        assert_eq!(*node.get(&CMP, &4).unwrap(), 400);

        node.delete(&CMP, &4).unwrap();
        assert!(!node.exists(&CMP, &4));
        assert_eq!(node.count(), 2);
    }

    #[test]
    fn empty_node_reports_node_empty() {
        let mut node: Node<u32, u32> = Node::new_empty(1, 8);
        assert_eq!(node.get(&CMP, &1), Err(BatchError::NodeEmpty));
        assert_eq!(node.delete(&CMP, &1), Err(BatchError::NodeEmpty));
        assert_eq!(node.update(&CMP, (1, 1)), Err(BatchError::NodeEmpty));
        assert_eq!(node.key_below_max(&CMP, &1), Err(BatchError::NodeEmpty));
        assert_eq!(node.key_above_max(&CMP, &1), Err(BatchError::NodeEmpty));
        assert_eq!(node.key_below_min(&CMP, &1), Err(BatchError::NodeEmpty));
    }

    #[test]
    fn bound_checks_are_strict() {
        let node = filled(1, 8, &[10, 20, 30]);
        assert_eq!(node.key_below_max(&CMP, &29), Ok(true));
        assert_eq!(node.key_below_max(&CMP, &30), Ok(false));
        assert_eq!(node.key_below_min(&CMP, &9), Ok(true));
        assert_eq!(node.key_below_min(&CMP, &10), Ok(false));
        assert_eq!(node.key_above_max(&CMP, &30), Ok(false));
        assert_eq!(node.key_above_max(&CMP, &31), Ok(true));
    }

    #[test]
    fn tower_levels_are_range_checked() {
        let mut node: Node<u32, u32> = Node::new_empty(3, 4);
        assert_eq!(node.next_at(2), Ok(None));
        assert_eq!(node.next_at(3), Err(BatchError::HeightOutOfRange));
        assert_eq!(node.connect(3, None), Err(BatchError::HeightOutOfRange));
        assert_eq!(node.disconnect(3), Err(BatchError::HeightOutOfRange));
    }

    #[test]
    fn connect_and_disconnect_round_trip() {
        let mut arena: crate::arena::Arena<u32, u32> = crate::arena::Arena::new();
        let other = arena.insert(Node::new_empty(1, 4));
        let mut node: Node<u32, u32> = Node::new_empty(2, 4);

        node.connect(1, Some(other)).unwrap();
        assert_eq!(node.next_at(1), Ok(Some(other)));
        node.disconnect(1).unwrap();
        assert_eq!(node.next_at(1), Ok(None));
    }

    #[test]
    fn mark_removal_is_terminal_state() {
        let mut node: Node<u32, u32> = Node::new_empty(2, 4);
        assert!(!node.is_marked_removed());
        node.mark_removal();
        assert!(node.is_marked_removed());

        assert!(!node.fully_unlinked());
        node.note_level_unlinked();
        node.note_level_unlinked();
        assert!(node.fully_unlinked());
    }

    #[test]
    fn scan_ge_includes_the_max_key() {
        let node = filled(1, 8, &[1, 3, 5]);
        let mut keys = Vec::new();
        node.scan_ge(&CMP, &5, &mut |k, _| keys.push(*k));
        assert_eq!(keys, vec![5]);

        keys.clear();
        node.scan_ge(&CMP, &2, &mut |k, _| keys.push(*k));
        assert_eq!(keys, vec![3, 5]);

        keys.clear();
        node.scan_ge(&CMP, &6, &mut |k, _| keys.push(*k));
        assert!(keys.is_empty());
    }

    #[test]
    fn scan_lt_excludes_the_bound() {
        let node = filled(1, 8, &[1, 3, 5]);
        let mut keys = Vec::new();
        node.scan_lt(&CMP, &5, &mut |k, _| keys.push(*k));
        assert_eq!(keys, vec![1, 3]);

        keys.clear();
        node.scan_lt(&CMP, &1, &mut |k, _| keys.push(*k));
        assert!(keys.is_empty());

        keys.clear();
        node.scan_lt(&CMP, &9, &mut |k, _| keys.push(*k));
        assert_eq!(keys, vec![1, 3, 5]);
    }

    #[test]
    fn scan_range_is_half_open() {
        let node = filled(1, 8, &[1, 2, 3, 4, 5]);
        let mut keys = Vec::new();
        node.scan_range(&CMP, &2, &4, &mut |k, _| keys.push(*k));
        assert_eq!(keys, vec![2, 3]);

        keys.clear();
        node.scan_range(&CMP, &5, &5, &mut |k, _| keys.push(*k));
        assert!(keys.is_empty());
    }

    #[test]
    fn split_moves_the_upper_half() {
        let mut node = filled(2, 8, &[1, 2, 3, 4, 5, 6]);
        let upper = node.split_into_new(5);

        assert_eq!(node.count(), 3);
        assert_eq!(node.max_key(), Some(&3));
        assert_eq!(upper.count(), 3);
        assert_eq!(upper.min_key(), Some(&4));
        assert_eq!(upper.height(), 5);

        // Items landed intact on both sides.
        assert_eq!(*node.get(&CMP, &2).unwrap(), 20);
        assert_eq!(*upper.get(&CMP, &6).unwrap(), 60);
    }

    #[test]
    fn split_of_odd_count_leaves_smaller_lower_half() {
        let mut node = filled(1, 8, &[1, 2, 3, 4, 5]);
        let upper = node.split_into_new(1);
        assert_eq!(node.count(), 2);
        assert_eq!(upper.count(), 3);
    }
}
