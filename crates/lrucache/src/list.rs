//! Recency list: intrusive doubly-linked list over a slot vector
//!
//! Entries live in a `Vec` of slots and link to each other by slot index,
//! so the list and the key index never both own a node. Handed-out
//! [`Handle`]s carry the slot generation; a slot bumps its generation when
//! freed, which turns any handle still pointing at it into a stale one.
//!
//! ```text
//!   head (MRU) ─► [s3] ◄──► [s0] ◄──► [s2] ◄── tail (LRU)
//! ```
//!
//! Not thread-safe on its own: the cache engine holds its mutex around
//! every call.

/// Generation-checked reference to an entry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Handle {
    slot: usize,
    generation: u64,
}

/// Cached key/value pair plus its list links
#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct Slot<K, V> {
    generation: u64,
    entry: Option<Entry<K, V>>,
}

/// Entries ordered from most- to least-recently used
#[derive(Debug)]
pub(crate) struct RecencyList<K, V> {
    slots: Vec<Slot<K, V>>,
    free_list: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<K, V> RecencyList<K, V> {
    /// Create an empty list with room for `capacity` entries
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Handle of the most-recently-used entry
    pub(crate) fn head(&self) -> Option<Handle> {
        self.head.map(|slot| self.handle_of(slot))
    }

    /// Returns `true` if `handle` still refers to a live entry
    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.entry(handle).is_some()
    }

    /// Get the value behind a handle
    pub(crate) fn get(&self, handle: Handle) -> Option<&V> {
        self.entry(handle).map(|entry| &entry.value)
    }

    /// Key, value and successor handle for the entry behind `handle`
    pub(crate) fn entry_at(&self, handle: Handle) -> Option<(&K, &V, Option<Handle>)> {
        self.entry(handle).map(|entry| {
            let next = entry.next.map(|slot| self.handle_of(slot));
            (&entry.key, &entry.value, next)
        })
    }

    /// Swap in a new value, returning the old one
    pub(crate) fn replace_value(&mut self, handle: Handle, value: V) -> Option<V> {
        self.entry_mut(handle)
            .map(|entry| std::mem::replace(&mut entry.value, value))
    }

    /// Insert a new entry at the head
    pub(crate) fn push_front(&mut self, key: K, value: V) -> Handle {
        let slot = self.alloc_slot();
        self.slots[slot].entry = Some(Entry {
            key,
            value,
            prev: None,
            next: None,
        });
        self.link_front(slot);
        self.len += 1;
        self.handle_of(slot)
    }

    /// Move an entry to the head.
    ///
    /// Returns `true` if the order changed, `false` if the entry was
    /// already the head or the handle is stale.
    pub(crate) fn move_to_front(&mut self, handle: Handle) -> bool {
        if !self.contains(handle) || self.head == Some(handle.slot) {
            return false;
        }

        self.detach(handle.slot);
        self.link_front(handle.slot);
        true
    }

    /// Remove an entry, returning its key and value
    pub(crate) fn unlink(&mut self, handle: Handle) -> Option<(K, V)> {
        if !self.contains(handle) {
            return None;
        }
        self.release(handle.slot)
    }

    /// The least-recently-used entry, if any
    pub(crate) fn peek_tail(&self) -> Option<(&K, &V)> {
        self.tail
            .and_then(|slot| self.slots[slot].entry.as_ref())
            .map(|entry| (&entry.key, &entry.value))
    }

    /// Remove and return the least-recently-used entry
    pub(crate) fn pop_tail(&mut self) -> Option<(K, V)> {
        let slot = self.tail?;
        self.release(slot)
    }

    /// Iterate from head (MRU) to tail (LRU)
    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            current: self.head,
        }
    }

    /// Drop every entry.
    ///
    /// Slots are recycled rather than truncated so that handles issued
    /// before the clear can never match a slot reused afterwards.
    pub(crate) fn clear(&mut self) {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.take().is_some() {
                slot.generation += 1;
                self.free_list.push(idx);
            }
        }
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    fn handle_of(&self, slot: usize) -> Handle {
        Handle {
            slot,
            generation: self.slots[slot].generation,
        }
    }

    fn entry(&self, handle: Handle) -> Option<&Entry<K, V>> {
        self.slots
            .get(handle.slot)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, handle: Handle) -> Option<&mut Entry<K, V>> {
        self.slots
            .get_mut(handle.slot)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    fn link_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(entry) = &mut self.slots[slot].entry {
            entry.prev = None;
            entry.next = old_head;
        }

        match old_head {
            Some(head_idx) => {
                if let Some(head) = &mut self.slots[head_idx].entry {
                    head.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }

        self.head = Some(slot);
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = match &self.slots[slot].entry {
            Some(entry) => (entry.prev, entry.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_entry) = &mut self.slots[prev_idx].entry {
                    prev_entry.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_entry) = &mut self.slots[next_idx].entry {
                    next_entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn release(&mut self, slot: usize) -> Option<(K, V)> {
        self.detach(slot);
        let cell = &mut self.slots[slot];
        let entry = cell.entry.take()?;
        cell.generation += 1;
        self.free_list.push(slot);
        self.len -= 1;
        Some((entry.key, entry.value))
    }

    fn alloc_slot(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.slots.len();
            self.slots.push(Slot {
                generation: 0,
                entry: None,
            });
            idx
        }
    }
}

/// Front-to-back iterator over a [`RecencyList`]
pub(crate) struct Iter<'a, K, V> {
    list: &'a RecencyList<K, V>,
    current: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.current?;
        let entry = self.list.slots[slot].entry.as_ref()?;
        self.current = entry.next;
        Some((&entry.key, &entry.value))
    }
}
