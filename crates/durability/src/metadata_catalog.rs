//! Reference [`MetadataCatalog`] implementation, backed by a process-local
//! map. A real host keeps this in its own metadata table; this is what
//! standalone embedding and the test suite use instead.

use kvs_core::error::Result;
use kvs_core::metadata::MetadataCatalog;
use parking_lot::Mutex;
use std::collections::HashMap;

pub struct MemoryMetadataCatalog {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryMetadataCatalog {
    pub fn new() -> Self {
        MemoryMetadataCatalog {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryMetadataCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCatalog for MemoryMetadataCatalog {
    fn insert(&self, uri: &str, metadata: &str) -> Result<()> {
        self.entries.lock().insert(uri.to_string(), metadata.to_string());
        Ok(())
    }

    fn get(&self, uri: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(uri).cloned())
    }

    fn remove(&self, uri: &str) -> Result<()> {
        self.entries.lock().remove(uri);
        Ok(())
    }
}
