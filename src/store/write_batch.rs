use std::collections::{BTreeMap, BTreeSet};

/// Staged set of updates applied atomically by [`Collection::update`].
///
/// A batch is a pair of disjoint maps: keys to set and keys to delete.
/// Disjointness is maintained continuously: staging an operation on a key
/// removes any earlier staged operation on the same key, so **the later
/// operation wins**. Keys and values are arbitrary byte strings ordered
/// lexicographically.
///
/// [`Collection::update`]: crate::store::Collection::update
///
/// # Example
///
/// ```
/// use chainstore::WriteBatch;
///
/// let mut batch = WriteBatch::new();
/// batch.set("a", "1");
/// batch.delete("a"); // overrides the earlier set
/// batch.set("b", "2");
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    pub(crate) sets: BTreeMap<Vec<u8>, Vec<u8>>,
    pub(crate) deletes: BTreeSet<Vec<u8>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `key = value`, overriding any staged delete of the same key.
    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        self.deletes.remove(&key);
        self.sets.insert(key, value.into());
    }

    /// Stages a delete, overriding any staged set of the same key.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        let key = key.into();
        self.sets.remove(&key);
        self.deletes.insert(key);
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.sets.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.deletes.is_empty()
    }

    /// Ascending union of set and delete keys. The two maps are disjoint, so
    /// a plain sorted merge needs no dedup.
    pub(crate) fn sorted_keys(&self) -> Vec<&[u8]> {
        let mut keys: Vec<&[u8]> = self
            .sets
            .keys()
            .chain(self.deletes.iter())
            .map(Vec::as_slice)
            .collect();
        keys.sort_unstable();
        keys
    }
}
