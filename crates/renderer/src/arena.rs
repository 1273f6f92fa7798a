//! Generational arena for render objects.
//!
//! Handles stay valid until their object is removed. A slot freed by
//! [`ObjectArena::remove`] is reused with a bumped generation, so an old
//! handle to it resolves to `None` instead of aliasing the new object.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl ObjectHandle {
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub struct ObjectArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> ObjectArena<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> ObjectHandle {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return ObjectHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        ObjectHandle {
            index,
            generation: 0,
        }
    }

    /// Removes and returns the object, or `None` for a stale handle.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live objects in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    ObjectHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|slot| slot.value.as_mut())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }
}

impl<T> Default for ObjectArena<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = ObjectArena::with_capacity(2);
        let a = arena.insert("triangle");
        let b = arena.insert("sprite");

        assert_eq!(arena.get(a), Some(&"triangle"));
        assert_eq!(arena.get(b), Some(&"sprite"));
        assert_eq!(arena.len(), 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_stale_handle_after_remove() {
        let mut arena = ObjectArena::with_capacity(1);
        let old = arena.insert(1);
        assert_eq!(arena.remove(old), Some(1));
        assert!(arena.is_empty());

        let new = arena.insert(2);
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());

        assert_eq!(arena.get(old), None);
        assert_eq!(arena.remove(old), None);
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let mut arena = ObjectArena::with_capacity(2);
        let handles: Vec<_> = (0..10).map(|i| arena.insert(i)).collect();

        assert_eq!(arena.len(), 10);
        assert!(arena.capacity() >= 10);
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(arena.get(*handle), Some(&i));
        }
    }

    #[test]
    fn test_iter_skips_removed() {
        let mut arena = ObjectArena::default();
        let a = arena.insert('a');
        let b = arena.insert('b');
        let c = arena.insert('c');
        arena.remove(b);

        let live: Vec<_> = arena.iter().collect();
        assert_eq!(live, vec![(a, &'a'), (c, &'c')]);

        for value in arena.iter_mut() {
            *value = value.to_ascii_uppercase();
        }
        assert_eq!(arena.get(c), Some(&'C'));
    }

    #[test]
    fn test_handle_display() {
        let mut arena = ObjectArena::default();
        let handle = arena.insert(());
        assert_eq!(handle.to_string(), "#0v0");
    }
}
