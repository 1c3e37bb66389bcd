//! Generational slab allocator.
//!
//! Values live in a vector of slots reused through a free list; the backing
//! storage doubles when the free list runs dry. Every slot carries a
//! generation counter bumped on removal, so a [`Key`] that outlived its value
//! is rejected instead of silently aliasing whatever took the slot next.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: usize,
    generation: u64,
}

impl Key {
    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

enum Slot<T> {
    Occupied { generation: u64, value: T },
    Vacant { generation: u64 },
}

pub(crate) struct Slab<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> Slab<T> {
    pub(crate) fn new(size: usize) -> Self {
        let slots = (0..size).map(|_| Slot::Vacant { generation: 0 }).collect();
        let free = (0..size).rev().collect();

        Self { slots, free }
    }

    pub(crate) fn insert(&mut self, value: T) -> Key {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let len = self.slots.len();
                let new_len = if len == 0 { 1 } else { 2 * len };

                self.slots
                    .extend((len..new_len).map(|_| Slot::Vacant { generation: 0 }));
                self.free.extend(((len + 1)..new_len).rev());

                len
            }
        };

        let generation = match self.slots[index] {
            Slot::Vacant { generation } => generation,
            Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
        };

        self.slots[index] = Slot::Occupied { generation, value };

        Key { index, generation }
    }

    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        match self.slots.get(key.index) {
            Some(Slot::Occupied { generation, value }) if *generation == key.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.slots.get_mut(key.index) {
            Some(Slot::Occupied { generation, value }) if *generation == key.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Looks a value up by raw index, ignoring generations.
    ///
    /// Used where only the index survives a round trip through the OS (poll tokens).
    pub(crate) fn get_by_index_mut(&mut self, index: usize) -> Option<&mut T> {
        match self.slots.get_mut(index) {
            Some(Slot::Occupied { value, .. }) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.slots.get_mut(key.index)?;

        match slot {
            Slot::Occupied { generation, .. } if *generation == key.generation => {}
            _ => return None,
        }

        let vacant = Slot::Vacant {
            generation: key.generation.wrapping_add(1),
        };

        match std::mem::replace(slot, vacant) {
            Slot::Occupied { value, .. } => {
                self.free.push(key.index);
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        })
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|slot| match slot {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_freed_slots_with_new_generation() {
        let mut slab = Slab::new(0);

        let first = slab.insert("a");
        assert_eq!(slab.remove(first), Some("a"));

        let second = slab.insert("b");
        assert_eq!(first.index(), second.index());
        assert_eq!(slab.get(first), None);
        assert_eq!(slab.get(second), Some(&"b"));
        assert_eq!(slab.remove(first), None);
    }

    #[test]
    fn grows_when_full() {
        let mut slab = Slab::new(2);
        let keys: Vec<_> = (0..5).map(|i| slab.insert(i)).collect();

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(slab.get(*key), Some(&i));
        }
        assert_eq!(slab.iter().count(), 5);
    }
}
