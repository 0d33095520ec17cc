use std::collections::BTreeMap;
use std::sync::Arc;

use rst_common::standard::async_trait::async_trait;
use rst_common::with_tokio::tokio::sync::Mutex;

use super::types::{ProtocolError, StorageBuilder};

/// In memory key-value double used by engine scenario tests
///
/// Clones share the same map, which stands in for a database reopened after a restart
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

#[async_trait]
impl StorageBuilder for MemoryStorage {
    async fn put(&self, key: String, value: Vec<u8>) -> Result<(), ProtocolError> {
        self.entries.lock().await.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: String) -> Result<Option<Vec<u8>>, ProtocolError> {
        Ok(self.entries.lock().await.get(&key).cloned())
    }

    async fn remove(&self, key: String) -> Result<(), ProtocolError> {
        self.entries.lock().await.remove(&key);
        Ok(())
    }

    async fn iterate(&self, prefix: String) -> Result<Vec<(String, Vec<u8>)>, ProtocolError> {
        let prefix = format!("{}:", prefix);
        let entries = self.entries.lock().await;

        Ok(entries
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect())
    }
}
