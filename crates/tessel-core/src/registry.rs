//! Slot table behind every resource handle
//!
//! Destroying a resource leaves a tombstone in its slot; the slot itself is
//! never removed, so outstanding handles keep pointing at the tombstone and
//! report invalid. Whether a tombstone may be handed out again depends on the
//! registry's [`ReusePolicy`].

use crate::error::{Result, TesselError};
use crate::handle::{Handle, HandleKind};
use std::marker::PhantomData;

/// Slot reuse strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReusePolicy {
    /// Reuse the lowest tombstoned slot, append only when there is none
    FirstFit,
    /// Always append; destroyed slots stay tombstones forever
    AppendOnly,
}

/// Generic slot table mapping handles to live resources
#[derive(Debug, Clone)]
pub struct Registry<K, T> {
    slots: Vec<Option<T>>,
    policy: ReusePolicy,
    live: usize,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandleKind, T> Registry<K, T> {
    pub fn new(policy: ReusePolicy) -> Self {
        Self {
            slots: Vec::new(),
            policy,
            live: 0,
            _kind: PhantomData,
        }
    }

    /// Registry whose destroyed slots are recycled
    pub fn first_fit() -> Self {
        Self::new(ReusePolicy::FirstFit)
    }

    /// Registry that never recycles slots
    pub fn append_only() -> Self {
        Self::new(ReusePolicy::AppendOnly)
    }

    pub fn policy(&self) -> ReusePolicy {
        self.policy
    }

    /// Store `value`, returning its handle
    pub fn allocate(&mut self, value: T) -> Handle<K> {
        self.live += 1;

        if self.policy == ReusePolicy::FirstFit {
            if let Some(index) = self.slots.iter().position(Option::is_none) {
                self.slots[index] = Some(value);
                return Handle::from_index(index as u32);
            }
        }

        debug_assert!(self.slots.len() < u32::MAX as usize);
        self.slots.push(Some(value));
        Handle::from_index((self.slots.len() - 1) as u32)
    }

    /// Tombstone the slot and hand back what was stored there
    pub fn destroy(&mut self, handle: Handle<K>) -> Option<T> {
        let removed = self.slot_mut(handle)?.take();
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    pub fn get(&self, handle: Handle<K>) -> Option<&T> {
        let index = handle.index()? as usize;
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<K>) -> Option<&mut T> {
        self.slot_mut(handle)?.as_mut()
    }

    /// Like [`Registry::get`] but reports a dead handle as an error
    pub fn try_get(&self, handle: Handle<K>) -> Result<&T> {
        self.get(handle).ok_or_else(|| Self::invalid(handle))
    }

    pub fn try_get_mut(&mut self, handle: Handle<K>) -> Result<&mut T> {
        self.get_mut(handle).ok_or_else(|| Self::invalid(handle))
    }

    /// Bounds check, then tombstone check
    pub fn is_valid(&self, handle: Handle<K>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots including tombstones
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (Handle::from_index(i as u32), v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<K>, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (Handle::from_index(i as u32), v)))
    }

    /// Tombstone every slot, returning the live entries
    ///
    /// Slots are kept, so an append-only registry still never hands out an
    /// index it has used before.
    pub fn take_all(&mut self) -> Vec<(Handle<K>, T)> {
        self.live = 0;
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.take().map(|v| (Handle::from_index(i as u32), v)))
            .collect()
    }

    fn slot_mut(&mut self, handle: Handle<K>) -> Option<&mut Option<T>> {
        let index = handle.index()? as usize;
        self.slots.get_mut(index)
    }

    fn invalid(handle: Handle<K>) -> TesselError {
        TesselError::InvalidHandle {
            kind: K::NAME,
            index: handle.index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    enum Item {}
    impl HandleKind for Item {
        const NAME: &'static str = "item";
    }

    fn indices(handles: &[Handle<Item>]) -> Vec<Option<u32>> {
        handles.iter().map(|h| h.index()).collect()
    }

    #[test]
    fn test_first_fit_reuses_destroyed_slot() {
        let mut registry: Registry<Item, &str> = Registry::first_fit();
        let a = registry.allocate("a");
        let _b = registry.allocate("b");

        assert_eq!(registry.destroy(a), Some("a"));
        let c = registry.allocate("c");

        assert_eq!(c, a);
        assert_eq!(registry.get(c), Some(&"c"));
        assert_eq!(registry.slot_count(), 2);
    }

    #[test]
    fn test_first_fit_picks_lowest_gap() {
        let mut registry: Registry<Item, u32> = Registry::first_fit();
        let handles: Vec<_> = (0..5).map(|i| registry.allocate(i)).collect();

        registry.destroy(handles[3]);
        registry.destroy(handles[1]);

        let first = registry.allocate(10);
        let second = registry.allocate(11);
        let third = registry.allocate(12);

        assert_eq!(
            indices(&[first, second, third]),
            vec![Some(1), Some(3), Some(5)]
        );
    }

    #[test]
    fn test_append_only_never_reuses() {
        let mut registry: Registry<Item, u32> = Registry::append_only();
        let a = registry.allocate(1);
        registry.destroy(a);

        let b = registry.allocate(2);
        assert_ne!(a, b);
        assert!(!registry.is_valid(a));
        assert_eq!(b.index(), Some(1));
    }

    #[test]
    fn test_invalid_lookups() {
        let mut registry: Registry<Item, u32> = Registry::first_fit();
        let a = registry.allocate(7);

        assert!(!registry.is_valid(Handle::INVALID));
        assert!(!registry.is_valid(Handle::from_index(42)));
        assert!(registry.is_valid(a));

        registry.destroy(a);
        assert!(!registry.is_valid(a));
        assert_eq!(registry.destroy(a), None);
        assert!(matches!(
            registry.try_get(a),
            Err(TesselError::InvalidHandle {
                kind: "item",
                index: Some(0)
            })
        ));
    }

    #[test]
    fn test_live_count_and_iteration() {
        let mut registry: Registry<Item, u32> = Registry::first_fit();
        let a = registry.allocate(1);
        registry.allocate(2);
        registry.allocate(3);
        registry.destroy(a);

        assert_eq!(registry.len(), 2);
        let values: Vec<_> = registry.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2, 3]);

        for (_, v) in registry.iter_mut() {
            *v *= 10;
        }
        let taken: Vec<_> = registry.take_all().into_iter().map(|(_, v)| v).collect();
        assert_eq!(taken, vec![20, 30]);
        assert!(registry.is_empty());
        assert_eq!(registry.slot_count(), 3);
    }

    #[test]
    fn test_append_only_after_take_all() {
        let mut registry: Registry<Item, u32> = Registry::append_only();
        registry.allocate(1);
        registry.take_all();
        assert_eq!(registry.allocate(2).index(), Some(1));
    }
}
