//! Pluggable persistence for callback records.
//!
//! The default store is in-memory. A multi-process deployment should supply
//! an externally atomic implementation instead; the in-memory maps are not
//! safe for uncoordinated concurrent writers.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CallbackResult;
use crate::manager::CallbackRecord;

/// Persistence interface keyed by job id.
#[async_trait]
pub trait CallbackStore: Send + Sync {
    async fn get(&self, job_id: &str) -> CallbackResult<Vec<CallbackRecord>>;
    async fn set(&self, job_id: &str, records: Vec<CallbackRecord>) -> CallbackResult<()>;
    async fn delete(&self, job_id: &str) -> CallbackResult<()>;
    async fn get_all(&self) -> CallbackResult<HashMap<String, Vec<CallbackRecord>>>;
}

/// Default store backed by a `HashMap` behind an async lock.
#[derive(Default)]
pub struct InMemoryCallbackStore {
    records: RwLock<HashMap<String, Vec<CallbackRecord>>>,
}

impl InMemoryCallbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallbackStore for InMemoryCallbackStore {
    async fn get(&self, job_id: &str) -> CallbackResult<Vec<CallbackRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set(&self, job_id: &str, records: Vec<CallbackRecord>) -> CallbackResult<()> {
        self.records
            .write()
            .await
            .insert(job_id.to_string(), records);
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> CallbackResult<()> {
        self.records.write().await.remove(job_id);
        Ok(())
    }

    async fn get_all(&self) -> CallbackResult<HashMap<String, Vec<CallbackRecord>>> {
        Ok(self.records.read().await.clone())
    }
}
