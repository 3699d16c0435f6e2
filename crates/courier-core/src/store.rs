use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::EngineError;
use crate::ratchet::ProtocolAddress;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnprocessedItem {
    pub id: String,
    pub version: u32,
    pub envelope: Vec<u8>,
    // base64, encoded and decoded through the utility worker
    pub decrypted: Option<String>,
    pub timestamp: u64,
    pub attempts: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: Vec<u8>,
    pub numbers: Vec<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn user_number(&self) -> Result<String, EngineError>;
    async fn user_device_id(&self) -> Result<u32, EngineError>;

    async fn get_device_ids(&self, number: &str) -> Result<Vec<u32>, EngineError>;
    async fn remove_session(&self, address: &ProtocolAddress) -> Result<(), EngineError>;

    async fn add_unprocessed(&self, item: UnprocessedItem) -> Result<(), EngineError>;
    async fn update_unprocessed(&self, item: UnprocessedItem) -> Result<(), EngineError>;
    async fn get_unprocessed(&self, id: &str) -> Result<Option<UnprocessedItem>, EngineError>;
    async fn get_all_unprocessed(&self) -> Result<Vec<UnprocessedItem>, EngineError>;
    async fn count_unprocessed(&self) -> Result<usize, EngineError>;
    async fn remove_unprocessed(&self, id: &str) -> Result<(), EngineError>;
    async fn remove_all_unprocessed(&self) -> Result<(), EngineError>;

    async fn group_get(&self, id: &[u8]) -> Result<Option<GroupRecord>, EngineError>;
    async fn group_numbers(&self, id: &[u8]) -> Result<Option<Vec<String>>, EngineError>;
    async fn group_create(&self, id: &[u8], numbers: Vec<String>) -> Result<(), EngineError>;
    async fn group_update_numbers(&self, id: &[u8], numbers: Vec<String>)
        -> Result<(), EngineError>;
    async fn group_remove_number(&self, id: &[u8], number: &str) -> Result<(), EngineError>;
    async fn group_delete(&self, id: &[u8]) -> Result<(), EngineError>;

    async fn get_pref(&self, key: &str) -> Result<Option<Value>, EngineError>;
    async fn put_pref(&self, key: &str, value: Value) -> Result<(), EngineError>;
}

#[derive(Default)]
struct MemoryStoreInner {
    number: String,
    device_id: u32,
    sessions: HashMap<String, BTreeSet<u32>>,
    unprocessed: Vec<UnprocessedItem>,
    groups: HashMap<Vec<u8>, GroupRecord>,
    prefs: HashMap<String, Value>,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemoryStore {
    pub fn new(number: &str, device_id: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                number: number.to_string(),
                device_id,
                ..Default::default()
            })),
        }
    }

    pub async fn add_session(&self, number: &str, device_id: u32) {
        let mut guard = self.inner.lock().await;
        guard
            .sessions
            .entry(number.to_string())
            .or_default()
            .insert(device_id);
    }

    pub async fn has_session(&self, number: &str, device_id: u32) -> bool {
        let guard = self.inner.lock().await;
        guard
            .sessions
            .get(number)
            .map(|set| set.contains(&device_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_number(&self) -> Result<String, EngineError> {
        Ok(self.inner.lock().await.number.clone())
    }

    async fn user_device_id(&self) -> Result<u32, EngineError> {
        Ok(self.inner.lock().await.device_id)
    }

    async fn get_device_ids(&self, number: &str) -> Result<Vec<u32>, EngineError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .sessions
            .get(number)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn remove_session(&self, address: &ProtocolAddress) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().await;
        if let Some(set) = guard.sessions.get_mut(&address.number) {
            set.remove(&address.device_id);
            if set.is_empty() {
                guard.sessions.remove(&address.number);
            }
        }
        Ok(())
    }

    async fn add_unprocessed(&self, item: UnprocessedItem) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().await;
        if !guard.unprocessed.iter().any(|u| u.id == item.id) {
            guard.unprocessed.push(item);
        }
        Ok(())
    }

    async fn update_unprocessed(&self, item: UnprocessedItem) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().await;
        if let Some(slot) = guard.unprocessed.iter_mut().find(|u| u.id == item.id) {
            *slot = item;
        }
        Ok(())
    }

    async fn get_unprocessed(&self, id: &str) -> Result<Option<UnprocessedItem>, EngineError> {
        let guard = self.inner.lock().await;
        Ok(guard.unprocessed.iter().find(|u| u.id == id).cloned())
    }

    async fn get_all_unprocessed(&self) -> Result<Vec<UnprocessedItem>, EngineError> {
        Ok(self.inner.lock().await.unprocessed.clone())
    }

    async fn count_unprocessed(&self) -> Result<usize, EngineError> {
        Ok(self.inner.lock().await.unprocessed.len())
    }

    async fn remove_unprocessed(&self, id: &str) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().await;
        guard.unprocessed.retain(|u| u.id != id);
        Ok(())
    }

    async fn remove_all_unprocessed(&self) -> Result<(), EngineError> {
        self.inner.lock().await.unprocessed.clear();
        Ok(())
    }

    async fn group_get(&self, id: &[u8]) -> Result<Option<GroupRecord>, EngineError> {
        Ok(self.inner.lock().await.groups.get(id).cloned())
    }

    async fn group_numbers(&self, id: &[u8]) -> Result<Option<Vec<String>>, EngineError> {
        Ok(self
            .inner
            .lock()
            .await
            .groups
            .get(id)
            .map(|g| g.numbers.clone()))
    }

    async fn group_create(&self, id: &[u8], numbers: Vec<String>) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().await;
        guard.groups.insert(
            id.to_vec(),
            GroupRecord {
                id: id.to_vec(),
                numbers,
            },
        );
        Ok(())
    }

    async fn group_update_numbers(
        &self,
        id: &[u8],
        numbers: Vec<String>,
    ) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().await;
        match guard.groups.get_mut(id) {
            Some(group) => group.numbers = numbers,
            None => {
                guard.groups.insert(
                    id.to_vec(),
                    GroupRecord {
                        id: id.to_vec(),
                        numbers,
                    },
                );
            }
        }
        Ok(())
    }

    async fn group_remove_number(&self, id: &[u8], number: &str) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().await;
        if let Some(group) = guard.groups.get_mut(id) {
            group.numbers.retain(|n| n != number);
        }
        Ok(())
    }

    async fn group_delete(&self, id: &[u8]) -> Result<(), EngineError> {
        self.inner.lock().await.groups.remove(id);
        Ok(())
    }

    async fn get_pref(&self, key: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.inner.lock().await.prefs.get(key).cloned())
    }

    async fn put_pref(&self, key: &str, value: Value) -> Result<(), EngineError> {
        self.inner.lock().await.prefs.insert(key.to_string(), value);
        Ok(())
    }
}
