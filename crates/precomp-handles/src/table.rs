use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::raw::{RawHandle, MAX_INDEX};

/// One arena slot. The generation is bumped every time the slot is vacated so
/// handles minted for a previous occupant stop decoding.
#[derive(Debug, Clone)]
struct Slot<K> {
    generation: u32,
    value: Option<K>,
}

/// Arena mapping stable [`RawHandle`]s to engine-owned keys.
///
/// Keys are small `Copy`-like identities handed out by the host engine (type or
/// method keys); the table never owns the entities they denote.
#[derive(Debug, Clone)]
pub struct HandleTable<K> {
    slots: Vec<Slot<K>>,
    /// Vacated slot indices, reused LIFO.
    free: Vec<usize>,
    /// Reverse map used by [`HandleTable::intern`].
    interned: FxHashMap<K, RawHandle>,
    len: usize,
}

impl<K> Default for HandleTable<K> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            interned: FxHashMap::default(),
            len: 0,
        }
    }
}

impl<K: Clone + Eq + Hash> HandleTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `key` in a fresh slot, even if an equal key is already present.
    ///
    /// # Panics
    /// Panics if the table has exhausted the index space of a handle.
    pub fn insert(&mut self, key: K) -> RawHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = self.slots.len();
                assert!(index <= MAX_INDEX, "handle table is full");
                self.slots.push(Slot {
                    generation: 1,
                    value: None,
                });
                index
            }
        };
        let slot = &mut self.slots[index];
        slot.value = Some(key);
        self.len += 1;
        RawHandle::new(index, slot.generation)
    }

    /// Returns the handle already associated with `key`, or stores it.
    ///
    /// Equal keys always yield equal handles, which is what makes handle
    /// comparison equivalent to entity comparison.
    pub fn intern(&mut self, key: K) -> RawHandle {
        if let Some(handle) = self.interned.get(&key) {
            return *handle;
        }
        let handle = self.insert(key.clone());
        self.interned.insert(key, handle);
        handle
    }

    /// Decodes a handle. Sentinel, out-of-range and stale handles yield `None`.
    pub fn get(&self, handle: RawHandle) -> Option<&K> {
        let index = handle.index()?;
        let slot = self.slots.get(index)?;
        if RawHandle::truncate_generation(slot.generation) != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn contains(&self, handle: RawHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Vacates the slot behind `handle`. Any copy of the handle becomes stale.
    pub fn remove(&mut self, handle: RawHandle) -> Option<K> {
        // Validate first so a stale handle cannot evict the new occupant.
        self.get(handle)?;
        let index = handle.index()?;
        let slot = &mut self.slots[index];
        let key = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        if self.interned.get(&key) == Some(&handle) {
            self.interned.remove(&key);
        }
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (RawHandle, &K)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|key| (RawHandle::new(index, slot.generation), key))
        })
    }
}
