/// Generation-tagged handle table.
///
/// Maps opaque 32-bit IDs to owned values. The low 24 bits of an ID are the
/// slot index, the high 8 bits the generation of that slot when the ID was
/// issued. Removing a value bumps the slot generation, so an ID kept past
/// destruction no longer resolves even after the slot is reused (until the
/// 8-bit generation wraps around).
///
/// The all-ones value is reserved as the invalid sentinel: slot index
/// `0xFF_FFFF` is never allocated.
///
/// # Example
///
/// ```ignore
/// let mut table: HandleTable<BufferId, u64> = HandleTable::new();
/// let a = table.insert(64);
/// assert_eq!(*table.get(a), 64);
/// table.remove(a);
/// assert!(!table.contains(a));
/// ```

use std::fmt;
use std::marker::PhantomData;

/// Bits of an ID used by the slot index
pub const SLOT_BITS: u32 = 24;

/// Mask selecting the slot index of a raw ID
pub const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;

/// Number of allocatable slots (the last index belongs to the sentinel)
pub const MAX_SLOTS: u32 = SLOT_MASK;

/// Raw value of the invalid sentinel
pub const INVALID_RAW_HANDLE: u32 = u32::MAX;

/// A typed 32-bit handle stored in a [`HandleTable`]
pub trait Handle: Copy + Eq + fmt::Debug {
    /// Build a handle from its raw value
    fn from_raw(raw: u32) -> Self;

    /// Raw 32-bit value
    fn raw(self) -> u32;

    /// Slot index (what shaders index the global descriptor arrays with)
    fn slot(self) -> u32 {
        self.raw() & SLOT_MASK
    }

    /// Generation of the slot when this handle was issued
    fn generation(self) -> u8 {
        (self.raw() >> SLOT_BITS) as u8
    }

    /// Whether this is not the invalid sentinel
    fn is_valid(self) -> bool {
        self.raw() != INVALID_RAW_HANDLE
    }
}

/// Declare a typed handle: a `u32` newtype implementing [`Handle`], with
/// `INVALID` as its default value.
#[macro_export]
macro_rules! define_handle {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        $vis struct $name(u32);

        impl $name {
            /// Sentinel meaning "unset"
            pub const INVALID: Self = Self($crate::utils::INVALID_RAW_HANDLE);

            /// Slot index, as seen by shaders
            pub fn slot(self) -> u32 {
                $crate::utils::Handle::slot(self)
            }

            /// Whether this is not the invalid sentinel
            pub fn is_valid(self) -> bool {
                $crate::utils::Handle::is_valid(self)
            }
        }

        impl $crate::utils::Handle for $name {
            fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            fn raw(self) -> u32 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                if self.is_valid() {
                    write!(
                        f,
                        "{}({}v{})",
                        stringify!($name),
                        $crate::utils::Handle::slot(*self),
                        $crate::utils::Handle::generation(*self)
                    )
                } else {
                    write!(f, "{}(INVALID)", stringify!($name))
                }
            }
        }
    };
}

struct Entry<T> {
    generation: u8,
    value: Option<T>,
}

/// Dense slot storage keyed by generation-tagged handles
pub struct HandleTable<K: Handle, T> {
    entries: Vec<Entry<T>>,
    free_list: Vec<u32>,
    len: u32,
    _key: PhantomData<fn() -> K>,
}

impl<K: Handle, T> HandleTable<K, T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    /// Store a value and return its handle. Freed slots are reused first.
    ///
    /// # Panics
    ///
    /// If every slot is occupied.
    pub fn insert(&mut self, value: T) -> K {
        let slot = match self.free_list.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.entries.len() as u32;
                assert!(slot < MAX_SLOTS, "handle table is full ({} slots)", MAX_SLOTS);
                self.entries.push(Entry { generation: 0, value: None });
                slot
            }
        };

        let entry = &mut self.entries[slot as usize];
        entry.value = Some(value);
        self.len += 1;
        K::from_raw(((entry.generation as u32) << SLOT_BITS) | slot)
    }

    fn entry(&self, id: K) -> Option<&Entry<T>> {
        if !id.is_valid() {
            return None;
        }
        self.entries
            .get(id.slot() as usize)
            .filter(|entry| entry.generation == id.generation() && entry.value.is_some())
    }

    /// Whether `id` refers to a live value
    pub fn contains(&self, id: K) -> bool {
        self.entry(id).is_some()
    }

    /// Lookup that reports a dead or invalid handle as `None`
    pub fn try_get(&self, id: K) -> Option<&T> {
        self.entry(id).and_then(|entry| entry.value.as_ref())
    }

    /// Mutable lookup that reports a dead or invalid handle as `None`
    pub fn try_get_mut(&mut self, id: K) -> Option<&mut T> {
        if !self.contains(id) {
            return None;
        }
        self.entries[id.slot() as usize].value.as_mut()
    }

    /// O(1) lookup.
    ///
    /// # Panics
    ///
    /// If `id` is the sentinel, was never issued, or its value was removed.
    pub fn get(&self, id: K) -> &T {
        match self.try_get(id) {
            Some(value) => value,
            None => panic!("invalid or stale handle {:?}", id),
        }
    }

    /// O(1) mutable lookup.
    ///
    /// # Panics
    ///
    /// Same conditions as [`HandleTable::get`].
    pub fn get_mut(&mut self, id: K) -> &mut T {
        match self.try_get_mut(id) {
            Some(value) => value,
            None => panic!("invalid or stale handle {:?}", id),
        }
    }

    /// Remove and return the value, retiring `id`.
    ///
    /// # Panics
    ///
    /// Same conditions as [`HandleTable::get`].
    pub fn remove(&mut self, id: K) -> T {
        if !self.contains(id) {
            panic!("invalid or stale handle {:?}", id);
        }

        let slot = id.slot();
        let entry = &mut self.entries[slot as usize];
        entry.generation = entry.generation.wrapping_add(1);
        let value = entry.value.take();
        self.free_list.push(slot);
        self.len -= 1;

        match value {
            Some(value) => value,
            None => unreachable!("checked by contains"),
        }
    }

    /// Number of live values
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether no values are live
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Highest slot index ever allocated + 1
    pub fn high_water_mark(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Iterate over live values with their handles
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.entries.iter().enumerate().filter_map(|(slot, entry)| {
            entry.value.as_ref().map(|value| {
                (K::from_raw(((entry.generation as u32) << SLOT_BITS) | slot as u32), value)
            })
        })
    }

    /// Remove every value, retiring all outstanding handles
    pub fn clear(&mut self) {
        for (slot, entry) in self.entries.iter_mut().enumerate() {
            if entry.value.take().is_some() {
                entry.generation = entry.generation.wrapping_add(1);
                self.free_list.push(slot as u32);
            }
        }
        self.len = 0;
    }
}

impl<K: Handle, T> Default for HandleTable<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "handle_table_tests.rs"]
mod tests;
