use std::collections::BTreeMap;

use super::{KeyEntry, KeyStore, KeyStoreError};

/// A key store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    entries: BTreeMap<String, KeyEntry>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn entry(&self, alias: &str) -> Option<&KeyEntry> {
        self.entries.get(alias)
    }

    fn set_entry(&mut self, alias: &str, entry: KeyEntry) -> Option<KeyEntry> {
        self.entries.insert(alias.to_owned(), entry)
    }

    fn delete_entry(&mut self, alias: &str) -> Option<KeyEntry> {
        self.entries.remove(alias)
    }

    fn aliases(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn flush(&self) -> Result<(), KeyStoreError> {
        Ok(())
    }
}
