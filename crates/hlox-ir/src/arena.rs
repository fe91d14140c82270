//! Append-only storage addressed by typed handles.
//!
//! Instructions and computations are never moved once allocated, so a
//! [`Handle`] stays valid for the lifetime of its owner even after the value
//! it names has been unlinked from the graph.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed index into an [`Arena`].
pub struct Handle<T> {
    index: u32,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.index)
    }
}

impl<T> Handle<T> {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            _phantom: PhantomData,
        }
    }

    /// Returns the zero-based allocation index of this handle.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Append-only arena. Allocation order is the handle order.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    data: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Number of values ever allocated.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The handle the next [`append`](Self::append) will return.
    pub fn next_handle(&self) -> Handle<T> {
        Handle::new(self.checked_len())
    }

    /// Appends a value and returns its handle.
    pub fn append(&mut self, value: T) -> Handle<T> {
        let handle = self.next_handle();
        self.data.push(value);
        handle
    }

    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.data.get(handle.index())
    }

    pub fn try_get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.data.get_mut(handle.index())
    }

    /// Iterates over `(handle, &value)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        // Safety: arena size bounded by u32::MAX (enforced in append)
        self.data
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::new(i as u32), v))
    }

    /// Snapshot of every handle allocated so far.
    pub fn handles(&self) -> Vec<Handle<T>> {
        (0..self.checked_len()).map(Handle::new).collect()
    }

    fn checked_len(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap_or_else(|_| {
            panic!("arena overflow: {} items exceeds u32::MAX", self.data.len())
        })
    }
}

impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.data[handle.index()]
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.data[handle.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_index() {
        let mut arena = Arena::new();
        let a = arena.append("operand");
        let b = arena.append("indices");
        assert_eq!(arena[a], "operand");
        assert_eq!(arena[b], "indices");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn next_handle_matches_append() {
        let mut arena = Arena::<i64>::new();
        let predicted = arena.next_handle();
        let actual = arena.append(7);
        assert_eq!(predicted, actual);
        assert_eq!(arena.next_handle().index(), 1);
    }

    #[test]
    fn handles_snapshot_is_ordered() {
        let mut arena = Arena::new();
        arena.append(10);
        arena.append(20);
        arena.append(30);
        let handles = arena.handles();
        assert_eq!(handles.len(), 3);
        assert!(handles.windows(2).all(|w| w[0] < w[1]));
        let items: Vec<_> = arena.iter().map(|(h, &v)| (h.index(), v)).collect();
        assert_eq!(items, vec![(0, 10), (1, 20), (2, 30)]);
    }

    #[test]
    fn try_get_out_of_range() {
        let mut arena = Arena::new();
        let h = arena.append(42);
        assert_eq!(arena.try_get(h), Some(&42));
        assert_eq!(arena.try_get(Handle::new(99)), None);
        *arena.try_get_mut(h).unwrap() = 43;
        assert_eq!(arena[h], 43);
    }

    #[test]
    fn handle_debug_format() {
        let h: Handle<u8> = Handle::new(5);
        assert_eq!(format!("{h:?}"), "%5");
    }
}
