use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rst_common::with_tokio::tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Entries = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// KeyedLock serializes work sharing the same key
///
/// Different keys never wait on each other. Entries are pruned once no guard
/// or waiter refers to them anymore
#[derive(Clone, Default)]
pub struct KeyedLock {
    entries: Entries,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> KeyedGuard {
        let entry = {
            let mut entries = self.entries.lock().unwrap_or_else(|poison| poison.into_inner());
            entries.entry(key.to_string()).or_default().clone()
        };

        let guard = entry.clone().lock_owned().await;
        KeyedGuard {
            key: key.to_string(),
            entries: self.entries.clone(),
            entry,
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct KeyedGuard {
    key: String,
    entries: Entries,
    entry: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut entries = self.entries.lock().unwrap_or_else(|poison| poison.into_inner());

        // one reference held by the map and one by this guard
        if Arc::strong_count(&self.entry) <= 2 {
            entries.remove(&self.key);
        }
    }
}
