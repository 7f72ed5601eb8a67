//! A typed bump arena with stack-ordered bulk deallocation.
//!
//! Every HIR expression node for one compile lives in one `Arena`, addressed
//! by `Handle<T>` indices rather than owning pointers. `push`/`pop` give the
//! stack discipline the pipeline relies on: a `pop` releases exactly what was
//! allocated since the matching `push`, in one truncation.

use std::fmt;
use std::marker::PhantomData;

/// A typed index into an `Arena<T>`.
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32) -> Handle<T> {
        Handle {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

// Manual impls: the derived ones would bound on T unnecessarily.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Handle<T> {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Handle<T>) -> bool {
        self.index == other.index
    }
}
impl<T> Eq for Handle<T> {}
impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}
impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Bump arena over a growable store.
///
/// `lock()` turns further allocation into an implementation defect: any
/// `alloc` while locked panics. Stages that expect a frozen module lock the
/// arena to catch stray allocation early.
#[derive(Debug, Clone, Default)]
pub struct Arena<T> {
    items: Vec<T>,
    marks: Vec<usize>,
    locked: bool,
}

impl<T> Arena<T> {
    pub fn new() -> Arena<T> {
        Arena {
            items: Vec::new(),
            marks: Vec::new(),
            locked: false,
        }
    }

    pub fn alloc(&mut self, value: T) -> Handle<T> {
        assert!(!self.locked, "allocation from a locked arena");
        let index = self.items.len();
        assert!(index <= u32::MAX as usize, "arena exhausted");
        self.items.push(value);
        Handle::new(index as u32)
    }

    /// Marks a restore point for the next `pop`.
    pub fn push(&mut self) {
        self.marks.push(self.items.len());
    }

    /// Releases everything allocated since the matching `push`, or
    /// everything if no mark is outstanding.
    pub fn pop(&mut self) {
        let mark = self.marks.pop().unwrap_or(0);
        self.items.truncate(mark);
    }

    /// Unconditionally releases every allocation and mark.
    pub fn pop_all(&mut self) {
        self.marks.clear();
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index())
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> {
        (0..self.items.len() as u32).map(Handle::new)
    }
}

// Marks and the lock flag are transient pipeline state, not contents.
impl<T: PartialEq> PartialEq for Arena<T> {
    fn eq(&self, other: &Arena<T>) -> bool {
        self.items == other.items
    }
}

impl<T> std::ops::Index<Handle<T>> for Arena<T> {
    type Output = T;
    fn index(&self, handle: Handle<T>) -> &T {
        &self.items[handle.index()]
    }
}

impl<T> std::ops::IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.items[handle.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_index() {
        let mut arena = Arena::new();
        let a = arena.alloc(10);
        let b = arena.alloc(20);
        assert_eq!(arena[a], 10);
        assert_eq!(arena[b], 20);
        arena[a] = 11;
        assert_eq!(arena[a], 11);
    }

    #[test]
    fn stack_discipline() {
        let mut arena = Arena::new();
        arena.alloc(1);
        let live_before = arena.len();
        arena.push();
        arena.alloc(2);
        arena.alloc(3);
        arena.push();
        arena.alloc(4);
        arena.pop();
        assert_eq!(arena.len(), live_before + 2);
        arena.pop();
        assert_eq!(arena.len(), live_before);
    }

    #[test]
    fn pop_without_mark_clears() {
        let mut arena = Arena::new();
        arena.alloc(1);
        arena.alloc(2);
        arena.pop();
        assert!(arena.is_empty());
    }

    #[test]
    fn pop_all_discards_marks() {
        let mut arena = Arena::new();
        arena.push();
        arena.alloc(1);
        arena.push();
        arena.alloc(2);
        arena.pop_all();
        assert!(arena.is_empty());
        arena.alloc(3);
        arena.pop();
        assert!(arena.is_empty());
    }

    #[test]
    #[should_panic(expected = "locked arena")]
    fn locked_alloc_panics() {
        let mut arena = Arena::new();
        arena.alloc(1);
        arena.lock();
        arena.alloc(2);
    }

    #[test]
    fn unlock_allows_alloc_again() {
        let mut arena = Arena::new();
        arena.lock();
        arena.unlock();
        let h = arena.alloc(5);
        assert_eq!(arena[h], 5);
    }
}
