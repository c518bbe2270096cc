use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::store::KeyedStore;

/// An in-memory keyed store. Used as the test double for the persistent
/// store and by any caller that wants a disposable, non-durable index.
#[derive(Clone, Debug, Default)]
pub struct MemKeyedStore {
    entries: Arc<RwLock<HashMap<u32, Vec<u8>>>>,
}

impl MemKeyedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyedStore for MemKeyedStore {
    fn put(&self, key: u32, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key, value.to_vec());
        Ok(())
    }

    fn get(&self, key: u32) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(&key).cloned())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Wraps a `MemKeyedStore` and counts every `get` call, regardless of hit or
/// miss, so a test can prove the query fold stops reading rows once the
/// result goes empty.
#[derive(Clone, Debug, Default)]
pub struct CountingKeyedStore {
    inner: MemKeyedStore,
    reads: Arc<std::sync::atomic::AtomicUsize>,
}

impl CountingKeyedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl KeyedStore for CountingKeyedStore {
    fn put(&self, key: u32, value: &[u8]) -> Result<()> {
        self.inner.put(key, value)
    }

    fn get(&self, key: u32) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.get(key)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
