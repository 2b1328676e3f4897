use super::{
    expiry_from_now, ObjectStore, ObjectSummary, PostPolicyRequest, PresignedAccess,
    PresignedPost, StorageError,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// In-memory object store with failure injection.
///
/// Objects are listed in key order. URLs point at `memory://<bucket>/<key>`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<String, ObjectSummary>,
    fail_list: bool,
    fail_delete: bool,
    fail_presign: HashSet<String>,
    deleted: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another test thread panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an object of `size` bytes under `key`
    pub fn insert(&self, key: impl Into<String>, size: i64) {
        let key = key.into();
        self.state().objects.insert(
            key.clone(),
            ObjectSummary {
                key,
                size,
                last_modified: Some(Utc::now()),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state().objects.contains_key(key)
    }

    /// Make every listing fail
    pub fn fail_listing(&self) {
        self.state().fail_list = true;
    }

    /// Make every delete fail
    pub fn fail_deletes(&self) {
        self.state().fail_delete = true;
    }

    /// Make presigning fail for `key`
    pub fn fail_presign_for(&self, key: impl Into<String>) {
        self.state().fail_presign.insert(key.into());
    }

    /// Keys passed to `delete`, in call order
    pub fn deleted_keys(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    fn url_for(key: &str) -> String {
        format!("memory://bucket/{key}")
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError> {
        let state = self.state();
        if state.fail_list {
            return Err(StorageError::List {
                prefix: prefix.to_string(),
                message: "injected listing failure".to_string(),
            });
        }

        Ok(state
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedAccess, StorageError> {
        if self.state().fail_presign.contains(key) {
            return Err(StorageError::Presign {
                operation: "GET",
                key: key.to_string(),
                message: "injected presign failure".to_string(),
            });
        }

        Ok(PresignedAccess {
            url: format!("{}?expires_in={}", Self::url_for(key), expires_in.as_secs()),
            expires_at: expiry_from_now(expires_in),
        })
    }

    async fn presign_post(
        &self,
        request: &PostPolicyRequest,
    ) -> Result<PresignedPost, StorageError> {
        if self.state().fail_presign.contains(&request.key) {
            return Err(StorageError::Presign {
                operation: "POST",
                key: request.key.clone(),
                message: "injected presign failure".to_string(),
            });
        }

        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), request.key.clone());
        fields.insert("Content-Type".to_string(), request.content_type.clone());
        fields.insert(
            "content-length-range".to_string(),
            format!("0,{}", request.max_content_length),
        );

        Ok(PresignedPost {
            url: "memory://bucket".to_string(),
            fields,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        state.deleted.push(key.to_string());
        if state.fail_delete {
            return Err(StorageError::Delete {
                key: key.to_string(),
                message: "injected delete failure".to_string(),
            });
        }
        state.objects.remove(key);
        Ok(())
    }
}
