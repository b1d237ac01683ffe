//! Sparse set keyed by a dense non-negative integer.
//!
//! [`SparseSet`] stores values contiguously in a dense array and redirects
//! external indices (entity indices, in practice) through a sparse table.
//! Insert, lookup and erase are O(1). Erasing swaps the last element into the
//! vacated slot, so the dense order changes on every erase. Callers that hold
//! positions into [`SparseSet::data`] must treat them as invalidated by any
//! insert or erase.

use std::ops::{Index, IndexMut};

use crate::EcsError;

// ---------------------------------------------------------------------------
// SparseSet
// ---------------------------------------------------------------------------

/// Dense values plus a sparse index redirection table.
///
/// Invariant: `contains(i)` iff `i < sparse.len() && sparse[i] < len &&
/// dense[sparse[i]] == i`. `data` and `dense` always have the same length.
#[derive(Debug, Clone)]
pub struct SparseSet<T> {
    /// Packed values.
    data: Vec<T>,
    /// External index of the value at the same position in `data`.
    dense: Vec<usize>,
    /// External index -> position in `dense`/`data`. Stale entries are allowed.
    sparse: Vec<usize>,
}

impl<T> SparseSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            dense: Vec::new(),
            sparse: Vec::new(),
        }
    }

    /// Create an empty set with room for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            dense: Vec::with_capacity(capacity),
            sparse: Vec::with_capacity(capacity),
        }
    }

    /// Whether a value is stored at `index`.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.position(index).is_some()
    }

    /// Position of `index` in the dense arrays.
    #[inline]
    pub fn position(&self, index: usize) -> Option<usize> {
        let pos = *self.sparse.get(index)?;
        (pos < self.dense.len() && self.dense[pos] == index).then_some(pos)
    }

    /// Store `value` at `index`.
    ///
    /// Does nothing if `index` is already present: the first write wins.
    /// Returns `true` if the value was inserted.
    pub fn insert(&mut self, index: usize, value: T) -> bool {
        self.emplace(index, || value)
    }

    /// Build a value in place at `index`. `make` only runs when `index` is
    /// absent. Returns `true` if the value was inserted.
    pub fn emplace(&mut self, index: usize, make: impl FnOnce() -> T) -> bool {
        if self.contains(index) {
            return false;
        }
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, 0);
        }
        self.sparse[index] = self.dense.len();
        self.dense.push(index);
        self.data.push(make());
        true
    }

    /// Remove the value at `index` by swapping the last value into its slot.
    ///
    /// Returns `None` if `index` is absent.
    pub fn erase(&mut self, index: usize) -> Option<T> {
        let pos = self.position(index)?;
        self.dense.swap_remove(pos);
        let value = self.data.swap_remove(pos);
        if let Some(&moved) = self.dense.get(pos) {
            self.sparse[moved] = pos;
        }
        Some(value)
    }

    /// Exchange the dense positions of two present indices.
    ///
    /// Returns `false` (and does nothing) if the indices are equal or either
    /// is absent.
    pub fn swap(&mut self, a: usize, b: usize) -> bool {
        if a == b {
            return false;
        }
        let (Some(pa), Some(pb)) = (self.position(a), self.position(b)) else {
            return false;
        };
        self.dense.swap(pa, pb);
        self.data.swap(pa, pb);
        self.sparse.swap(a, b);
        true
    }

    /// Shared reference to the value at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.position(index).map(|pos| &self.data[pos])
    }

    /// Mutable reference to the value at `index`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.position(index).map(|pos| &mut self.data[pos])
    }

    /// Like [`get`](Self::get), failing with [`EcsError::MissingIndex`].
    pub fn at(&self, index: usize) -> Result<&T, EcsError> {
        self.get(index).ok_or(EcsError::MissingIndex { index })
    }

    /// Like [`get_mut`](Self::get_mut), failing with [`EcsError::MissingIndex`].
    pub fn at_mut(&mut self, index: usize) -> Result<&mut T, EcsError> {
        self.get_mut(index).ok_or(EcsError::MissingIndex { index })
    }

    /// The packed values, in dense order.
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// The packed values, in dense order, mutably.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// External indices, in dense order.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.dense
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Whether the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Remove every value. The sparse table keeps its allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.dense.clear();
    }

    /// Iterate `(index, &value)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.dense.iter().copied().zip(self.data.iter())
    }

    /// Iterate `(index, &mut value)` pairs in dense order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> + '_ {
        self.dense.iter().copied().zip(self.data.iter_mut())
    }
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for SparseSet<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => panic!("sparse set does not contain index {index}"),
        }
    }
}

impl<T> IndexMut<usize> for SparseSet<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("sparse set does not contain index {index}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pair {
        a: i32,
        b: i32,
    }

    #[test]
    fn insert_and_access() {
        let mut set = SparseSet::new();
        set.insert(0, 'x');
        set.insert(1, 'y');

        assert_eq!(set.at(0).unwrap(), &'x');
        assert_eq!(set[0], 'x');
        assert_eq!(set[1], 'y');
        assert_eq!(set.len(), 2);
        assert!(set.contains(0));
        assert!(set.contains(1));
        assert!(!set.contains(2));
    }

    #[test]
    fn sparse_indices() {
        let mut set = SparseSet::new();
        set.insert(0, 10);
        set.insert(5, 50);
        set.insert(10, 100);

        assert!(set.contains(5));
        assert!(!set.contains(1));
        assert!(!set.contains(11));
        assert_eq!(set.len(), 3);
        assert_eq!(set[10], 100);
    }

    #[test]
    fn duplicate_insert_keeps_first_value() {
        let mut set = SparseSet::new();
        assert!(set.insert(2, 'a'));
        assert!(!set.insert(2, 'b'));
        assert_eq!(set.len(), 1);
        assert_eq!(set[2], 'a');
    }

    #[test]
    fn emplace_skips_constructor_when_present() {
        let mut set = SparseSet::new();
        set.emplace(3, || Pair { a: 1, b: 2 });
        let inserted = set.emplace(3, || panic!("constructor must not run"));
        assert!(!inserted);
        assert_eq!(set[3], Pair { a: 1, b: 2 });
    }

    #[test]
    fn erase_swaps_last_into_hole() {
        let mut set = SparseSet::new();
        set.insert(0, 'a');
        set.insert(1, 'b');
        set.insert(2, 'c');

        assert_eq!(set.erase(1), Some('b'));

        assert_eq!(set.len(), 2);
        assert!(!set.contains(1));
        assert_eq!(set[0], 'a');
        assert_eq!(set[2], 'c');
        // The last element moved into position 1.
        assert_eq!(set.indices(), &[0, 2]);
        assert_eq!(set.data(), &['a', 'c']);
    }

    #[test]
    fn erase_last_and_missing() {
        let mut set = SparseSet::new();
        set.insert(4, 1);
        assert_eq!(set.erase(7), None);
        assert_eq!(set.erase(4), Some(1));
        assert!(set.is_empty());
        assert_eq!(set.erase(4), None);
    }

    #[test]
    fn reinsert_after_erase() {
        let mut set = SparseSet::new();
        set.insert(0, 1);
        set.erase(0);
        set.insert(0, 2);
        assert_eq!(set[0], 2);
    }

    #[test]
    fn swap_exchanges_positions() {
        let mut set = SparseSet::new();
        set.insert(7, "seven");
        set.insert(3, "three");

        assert!(set.swap(7, 3));
        assert_eq!(set.indices(), &[3, 7]);
        assert_eq!(set[7], "seven");
        assert_eq!(set[3], "three");

        assert!(!set.swap(3, 3));
        assert!(!set.swap(3, 99));
    }

    #[test]
    fn at_reports_missing_index() {
        let set = SparseSet::<u8>::new();
        match set.at(9) {
            Err(EcsError::MissingIndex { index }) => assert_eq!(index, 9),
            other => panic!("expected MissingIndex, got {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "does not contain index 4")]
    fn index_operator_panics_when_absent() {
        let set = SparseSet::<u8>::new();
        let _ = set[4];
    }

    #[test]
    fn iter_mut_updates_in_place() {
        let mut set = SparseSet::new();
        set.insert(1, 10);
        set.insert(2, 20);
        for (_, value) in set.iter_mut() {
            *value += 1;
        }
        let pairs: Vec<_> = set.iter().map(|(i, v)| (i, *v)).collect();
        assert_eq!(pairs, vec![(1, 11), (2, 21)]);
    }
}
