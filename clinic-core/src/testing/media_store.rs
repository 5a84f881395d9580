use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::media_store::{DestroyOutcome, MediaStore, MediaStoreError, StoredObject, is_destroyable};

/// Media host double. Assigns sequential object ids, remembers which
/// objects are live, and fails uploads or destroys on request.
#[derive(Debug, Default)]
pub struct ScriptedMediaStore {
    next_id: AtomicUsize,
    upload_calls: AtomicUsize,
    state: Mutex<ScriptState>,
}

#[derive(Debug, Default)]
struct ScriptState {
    live: BTreeSet<String>,
    destroy_calls: Vec<String>,
    failing_payloads: HashSet<Vec<u8>>,
    failing_destroys: HashSet<String>,
    fail_all_destroys: bool,
}

impl ScriptedMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads whose body equals `payload` are rejected.
    pub fn fail_upload_of(&self, payload: impl Into<Vec<u8>>) {
        self.state.lock().failing_payloads.insert(payload.into());
    }

    pub fn fail_destroy_of(&self, object_id: impl Into<String>) {
        self.state.lock().failing_destroys.insert(object_id.into());
    }

    pub fn fail_all_destroys(&self) {
        self.state.lock().fail_all_destroys = true;
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> Vec<String> {
        self.state.lock().destroy_calls.clone()
    }

    pub fn total_calls(&self) -> usize {
        self.upload_calls() + self.state.lock().destroy_calls.len()
    }

    pub fn live_objects(&self) -> Vec<String> {
        self.state.lock().live.iter().cloned().collect()
    }

    pub fn is_live(&self, object_id: &str) -> bool {
        self.state.lock().live.contains(object_id)
    }
}

#[async_trait]
impl MediaStore for ScriptedMediaStore {
    async fn upload(&self, bytes: Bytes) -> Result<StoredObject, MediaStoreError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.failing_payloads.contains(bytes.as_ref()) {
            return Err(MediaStoreError::Rejected {
                status: 400,
                message: "scripted upload failure".into(),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let object_id = format!("clinic_images/obj-{n}");
        state.live.insert(object_id.clone());
        Ok(StoredObject {
            url: format!("https://media.test/{object_id}.jpg"),
            object_id,
        })
    }

    async fn destroy(&self, object_id: &str) -> Result<DestroyOutcome, MediaStoreError> {
        if !is_destroyable(object_id) {
            return Ok(DestroyOutcome::Skipped);
        }

        let mut state = self.state.lock();
        state.destroy_calls.push(object_id.to_string());
        if state.fail_all_destroys || state.failing_destroys.contains(object_id) {
            return Err(MediaStoreError::Timeout);
        }

        if state.live.remove(object_id) {
            Ok(DestroyOutcome::Destroyed)
        } else {
            Ok(DestroyOutcome::NotFound)
        }
    }
}
