//! The mapping cache: what each input key emitted, stored serialized.
//!
//! Entries are keyed by map input key and hold the ordered list of
//! `(reduce key, encoded value)` pairs the mapper emitted. An entry is marked
//! dirty as soon as a pair is appended and only becomes eligible as a hit
//! once the engine calls [`MappingCache::mark_all_clean`] after the whole
//! map stage has drained.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::{Error, KeyValue, Result, Value};

/// Caches everything mappers emitted, keyed by input key. It is serializable.
///
/// The value type is fixed at construction; the persisted form records its
/// name so a cache saved for one type cannot be restored as another.
pub struct MappingCache<V> {
    data: Mutex<CacheData>,
    _value: PhantomData<fn() -> V>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheData {
    value_type: String,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CacheEntry {
    #[serde(default)]
    dirty: bool,
    items: Vec<SerializedKeyValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializedKeyValue {
    key: String,
    value: Bytes,
}

impl<V: Value> Default for MappingCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Value> MappingCache<V> {
    /// Creates an empty cache holding values of type `V`.
    pub fn new() -> Self {
        Self::with_data(CacheData {
            value_type: Self::type_name().to_string(),
            entries: HashMap::new(),
        })
    }

    fn with_data(data: CacheData) -> Self {
        Self {
            data: Mutex::new(data),
            _value: PhantomData,
        }
    }

    fn type_name() -> &'static str {
        std::any::type_name::<V>()
    }

    fn lock(&self) -> MutexGuard<'_, CacheData> {
        // Every critical section leaves the map consistent, so a poisoned
        // lock is still safe to use.
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Name of the value type this cache was declared with.
    pub fn value_type(&self) -> String {
        self.lock().value_type.clone()
    }

    /// Number of input keys with an entry.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, map_key: &str) -> bool {
        self.lock().entries.contains_key(map_key)
    }

    /// Returns the cached pairs for `map_key`.
    ///
    /// Returns [`None`] when there is no entry, the entry is empty, or it was
    /// written during the current run and has not been validated yet.
    /// Decoding happens lazily, outside the lock; an item that fails to
    /// decode yields an [`Error::Decode`] and the remaining items still
    /// replay.
    pub fn get(&self, map_key: &str) -> Option<CacheReplay<V>> {
        let items = {
            let data = self.lock();
            let entry = data.entries.get(map_key)?;
            if entry.dirty || entry.items.is_empty() {
                return None;
            }
            entry.items.clone()
        };
        Some(CacheReplay {
            map_key: map_key.to_string(),
            items: items.into_iter(),
            _value: PhantomData,
        })
    }

    /// Records one emitted pair under `map_key` and marks the entry dirty.
    ///
    /// On encode failure nothing is appended.
    pub fn add(&self, map_key: &str, reduce_key: &str, value: &V) -> Result<()> {
        let encoded = serde_json::to_vec(value).map_err(|source| Error::Encode {
            key: map_key.to_string(),
            source,
        })?;
        let item = SerializedKeyValue {
            key: reduce_key.to_string(),
            value: Bytes::from(encoded),
        };

        let mut data = self.lock();
        let entry = data.entries.entry(map_key.to_string()).or_default();
        entry.dirty = true;
        entry.items.push(item);
        Ok(())
    }

    /// Makes every entry eligible as a hit. Called once the map stage of a
    /// run has fully drained.
    pub fn mark_all_clean(&self) {
        let mut data = self.lock();
        for entry in data.entries.values_mut() {
            entry.dirty = false;
        }
        debug!(entries = data.entries.len(), "cache entries marked clean");
    }

    /// Serializes the whole cache as JSON.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let data = self.lock();
        serde_json::to_writer(writer, &*data).map_err(Error::Persist)
    }

    /// Restores a cache serialized by [`MappingCache::to_writer`].
    ///
    /// Fails with [`Error::TypeMismatch`] if it was saved for another value
    /// type.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let data: CacheData = serde_json::from_reader(reader).map_err(Error::Persist)?;
        if data.value_type != Self::type_name() {
            return Err(Error::TypeMismatch {
                expected: Self::type_name().to_string(),
                found: data.value_type,
            });
        }
        Ok(Self::with_data(data))
    }

    /// Writes the cache to `path`, replacing any previous file atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        let tmp = dir.join(format!(".mrcache-{}.tmp", Uuid::new_v4()));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            let written = self.to_writer(&mut writer).and_then(|()| Ok(writer.flush()?));
            if let Err(err) = written {
                let _ = fs::remove_file(&tmp);
                return Err(err);
            }
        }
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), entries = self.len(), "cache saved");
        Ok(())
    }

    /// Loads a cache saved with [`MappingCache::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let cache = Self::from_reader(BufReader::new(File::open(path)?))?;
        debug!(path = %path.display(), entries = cache.len(), "cache loaded");
        Ok(cache)
    }
}

/// Lazily decodes the pairs of one cache entry, in insertion order.
pub struct CacheReplay<V> {
    map_key: String,
    items: std::vec::IntoIter<SerializedKeyValue>,
    _value: PhantomData<fn() -> V>,
}

impl<V: Value> Iterator for CacheReplay<V> {
    type Item = Result<KeyValue<V>>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.next()?;
        Some(
            serde_json::from_slice(&item.value)
                .map(|value| KeyValue::new(item.key, value))
                .map_err(|source| Error::Decode {
                    key: self.map_key.clone(),
                    source,
                }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_ok<V: Value>(replay: CacheReplay<V>) -> Vec<(String, V)> {
        replay
            .map(|kv| kv.unwrap().into_parts())
            .collect::<Vec<_>>()
    }

    #[test]
    fn missing_and_dirty_entries_are_not_served() {
        let cache = MappingCache::<i64>::new();
        assert!(cache.get("A").is_none());

        cache.add("A", "A.1", &1).unwrap();
        assert!(cache.contains_key("A"));
        assert!(cache.get("A").is_none(), "dirty entry served as a hit");

        cache.mark_all_clean();
        let replay = cache.get("A").unwrap();
        assert_eq!(collect_ok(replay), vec![("A.1".to_string(), 1)]);
    }

    #[test]
    fn replay_preserves_insertion_order() {
        let cache = MappingCache::<String>::new();
        for (i, word) in ["x", "y", "z"].iter().enumerate() {
            cache.add("doc", &format!("k{i}"), &word.to_string()).unwrap();
        }
        cache.mark_all_clean();

        let pairs = collect_ok(cache.get("doc").unwrap());
        assert_eq!(
            pairs,
            vec![
                ("k0".to_string(), "x".to_string()),
                ("k1".to_string(), "y".to_string()),
                ("k2".to_string(), "z".to_string()),
            ]
        );
    }

    #[test]
    fn appending_to_a_clean_entry_makes_it_dirty_again() {
        let cache = MappingCache::<u64>::new();
        cache.add("A", "a", &1).unwrap();
        cache.mark_all_clean();
        cache.add("A", "b", &2).unwrap();
        assert!(cache.get("A").is_none());
        assert_eq!(cache.len(), 1);

        cache.mark_all_clean();
        assert_eq!(cache.get("A").unwrap().count(), 2);
    }

    #[test]
    fn encode_failure_appends_nothing() {
        let cache = MappingCache::<HashMap<(u8, u8), u8>>::new();
        let mut value = HashMap::new();
        value.insert((1, 2), 3);

        let err = cache.add("A", "A.1", &value).unwrap_err();
        assert!(matches!(err, Error::Encode { ref key, .. } if key == "A"));
        assert!(!cache.contains_key("A"));
    }

    #[test]
    fn undecodable_items_are_skipped() {
        let cache = MappingCache::<u64>::new();
        cache.add("A", "good", &7).unwrap();
        cache
            .lock()
            .entries
            .get_mut("A")
            .unwrap()
            .items
            .push(SerializedKeyValue {
                key: "bad".into(),
                value: Bytes::from_static(b"\"not a number\""),
            });
        cache.add("A", "also-good", &8).unwrap();
        cache.mark_all_clean();

        let results = cache.get("A").unwrap().collect::<Vec<_>>();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().value, 7);
        assert!(matches!(results[1], Err(Error::Decode { ref key, .. }) if key == "A"));
        assert_eq!(results[2].as_ref().unwrap().value, 8);
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = MappingCache::<u64>::new();
        cache.add("A", "A.1", &1).unwrap();
        cache.mark_all_clean();
        cache.save(&path).unwrap();

        let restored = MappingCache::<u64>::load(&path).unwrap();
        assert_eq!(restored.value_type(), "u64");
        assert_eq!(restored.len(), 1);
        assert_eq!(collect_ok(restored.get("A").unwrap()), vec![("A.1".into(), 1)]);
        // Only the cache file is left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn dirty_flag_survives_persistence() {
        let cache = MappingCache::<u64>::new();
        cache.add("A", "A.1", &1).unwrap();

        let mut buf = Vec::new();
        cache.to_writer(&mut buf).unwrap();
        let restored = MappingCache::<u64>::from_reader(buf.as_slice()).unwrap();
        assert!(restored.get("A").is_none());
    }

    #[test]
    fn restoring_as_another_type_is_a_type_mismatch() {
        let cache = MappingCache::<String>::new();
        cache.add("A", "A.1", &"one".to_string()).unwrap();
        let mut buf = Vec::new();
        cache.to_writer(&mut buf).unwrap();

        let err = MappingCache::<i32>::from_reader(buf.as_slice())
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            format!(
                "expected type i32, got {}",
                std::any::type_name::<String>()
            )
        );
    }
}
