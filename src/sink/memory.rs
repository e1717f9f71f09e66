use super::{validate_key, ObjectStore, PutOutcome, SinkError};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.get(key).map(|body| body.clone())
    }

    /// Sorted keys under `folder/`.
    pub fn keys_in(&self, folder: &str) -> Vec<String> {
        let prefix = format!("{}/", folder.trim_matches('/'));
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_new(&self, key: &str, body: Vec<u8>) -> Result<PutOutcome, SinkError> {
        validate_key(key)?;

        match self.objects.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(PutOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(body);
                Ok(PutOutcome::Created)
            }
        }
    }
}
