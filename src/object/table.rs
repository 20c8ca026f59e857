//! Open-addressing hash table with linear probing and tombstones.
//!
//! Keys are compared with `PartialEq`; the caller supplies the hash. Interned
//! strings, globals, struct members, instance fields and script maps all sit
//! on this one container.

const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;
const MIN_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
enum Entry<K, V> {
    Empty,
    Tombstone,
    Full { key: K, hash: u32, value: V },
}

#[derive(Debug, Clone)]
pub struct Table<K, V> {
    entries: Vec<Entry<K, V>>,
    /// Live entries.
    len: usize,
    /// Live entries plus tombstones; drives the load factor.
    used: usize,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Table { entries: Vec::new(), len: 0, used: 0 }
    }
}

impl<K: Copy + PartialEq, V> Table<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn slot(entries: &[Entry<K, V>], key: &K, hash: u32) -> usize {
        let mask = entries.len() - 1;
        let mut index = hash as usize & mask;
        let mut tombstone = None;
        loop {
            match &entries[index] {
                Entry::Empty => return tombstone.unwrap_or(index),
                Entry::Tombstone => {
                    tombstone.get_or_insert(index);
                }
                Entry::Full { key: k, .. } if k == key => return index,
                Entry::Full { .. } => {}
            }
            index = (index + 1) & mask;
        }
    }

    pub fn get(&self, key: &K, hash: u32) -> Option<&V> {
        if self.entries.is_empty() {
            return None;
        }
        match &self.entries[Self::slot(&self.entries, key, hash)] {
            Entry::Full { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &K, hash: u32) -> Option<&mut V> {
        if self.entries.is_empty() {
            return None;
        }
        let index = Self::slot(&self.entries, key, hash);
        match &mut self.entries[index] {
            Entry::Full { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, key: &K, hash: u32) -> bool {
        self.get(key, hash).is_some()
    }

    /// Inserts or overwrites. Returns `true` when the key was not present.
    pub fn insert(&mut self, key: K, hash: u32, value: V) -> bool {
        if (self.used + 1) * MAX_LOAD_DEN > self.entries.len() * MAX_LOAD_NUM {
            self.grow();
        }
        let index = Self::slot(&self.entries, &key, hash);
        match &mut self.entries[index] {
            Entry::Full { value: slot, .. } => {
                *slot = value;
                return false;
            }
            Entry::Empty => self.used += 1,
            Entry::Tombstone => {}
        }
        self.entries[index] = Entry::Full { key, hash, value };
        self.len += 1;
        true
    }

    pub fn remove(&mut self, key: &K, hash: u32) -> Option<V> {
        if self.entries.is_empty() {
            return None;
        }
        let index = Self::slot(&self.entries, key, hash);
        if !matches!(self.entries[index], Entry::Full { .. }) {
            return None;
        }
        self.len -= 1;
        match std::mem::replace(&mut self.entries[index], Entry::Tombstone) {
            Entry::Full { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Probes the bucket chain for `hash` and returns the first key accepted
    /// by `pred`. Used by the intern table, which looks strings up by content
    /// before a handle exists.
    pub fn find(&self, hash: u32, mut pred: impl FnMut(&K) -> bool) -> Option<K> {
        if self.entries.is_empty() {
            return None;
        }
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            match &self.entries[index] {
                Entry::Empty => return None,
                Entry::Full { key, hash: h, .. } if *h == hash && pred(key) => return Some(*key),
                _ => {}
            }
            index = (index + 1) & mask;
        }
    }

    /// Drops every entry `keep` rejects, leaving tombstones behind.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        for entry in &mut self.entries {
            if let Entry::Full { key, value, .. } = entry {
                if !keep(key, value) {
                    *entry = Entry::Tombstone;
                    self.len -= 1;
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.len = 0;
        self.used = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Full { key, value, .. } => Some((key, value)),
            _ => None,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    fn grow(&mut self) {
        let capacity = (self.entries.len() * 2).max(MIN_CAPACITY);
        let old = std::mem::replace(
            &mut self.entries,
            std::iter::repeat_with(|| Entry::Empty).take(capacity).collect(),
        );
        for entry in old {
            if let Entry::Full { key, hash, value } = entry {
                let index = Self::slot(&self.entries, &key, hash);
                self.entries[index] = Entry::Full { key, hash, value };
            }
        }
        self.used = self.len;
    }
}
