//! Reference [`KvDevice`] implementation: a `parking_lot`-guarded map of
//! sorted namespaces, suitable for tests and for embedding this adapter
//! without a separate device process (`SPEC_FULL.md` §4).

use kvs_core::error::Result;
use kvs_core::kvdevice::KvDevice;
use parking_lot::Mutex;
use std::collections::{BTreeMap, Bound, HashMap};

/// An in-memory, non-durable [`KvDevice`].
pub struct MemoryKvDevice {
    namespaces: Mutex<HashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKvDevice {
    pub fn new() -> Self {
        MemoryKvDevice {
            namespaces: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryKvDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl KvDevice for MemoryKvDevice {
    fn create_namespace(&self, name: &str) -> Result<()> {
        self.namespaces
            .lock()
            .entry(name.to_string())
            .or_insert_with(BTreeMap::new);
        Ok(())
    }

    fn drop_namespace(&self, name: &str) -> Result<()> {
        self.namespaces.lock().remove(name);
        Ok(())
    }

    fn rename_namespace(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut guard = self.namespaces.lock();
        let contents = guard.remove(old_name).unwrap_or_default();
        guard.insert(new_name.to_string(), contents);
        Ok(())
    }

    fn truncate_namespace(&self, name: &str) -> Result<()> {
        self.namespaces
            .lock()
            .entry(name.to_string())
            .or_insert_with(BTreeMap::new)
            .clear();
        Ok(())
    }

    fn get(&self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .namespaces
            .lock()
            .get(namespace)
            .and_then(|ns| ns.get(key).cloned()))
    }

    fn put(&self, namespace: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.namespaces
            .lock()
            .entry(namespace.to_string())
            .or_insert_with(BTreeMap::new)
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &[u8]) -> Result<()> {
        if let Some(ns) = self.namespaces.lock().get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    fn next(&self, namespace: &str, after: Option<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let guard = self.namespaces.lock();
        let Some(ns) = guard.get(namespace) else {
            return Ok(None);
        };
        let lower = match after {
            Some(k) => Bound::Excluded(k.to_vec()),
            None => Bound::Unbounded,
        };
        Ok(ns
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    fn prev(&self, namespace: &str, before: Option<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let guard = self.namespaces.lock();
        let Some(ns) = guard.get(namespace) else {
            return Ok(None);
        };
        let upper = match before {
            Some(k) => Bound::Excluded(k.to_vec()),
            None => Bound::Unbounded,
        };
        Ok(ns
            .range((Bound::Unbounded, upper))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn list_namespaces(&self) -> Result<Vec<String>> {
        Ok(self.namespaces.lock().keys().cloned().collect())
    }
}
