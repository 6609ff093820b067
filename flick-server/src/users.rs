use async_trait::async_trait;
use flick_common::non_api_structs::UserRecord;
use flick_common::UserId;
use sled::{Db, IVec, Tree};

use crate::store::{apply_all, FieldUpdate, RecordStore, StoreError};

/// sled-backed user documents, one JSON value per user id.
#[derive(Clone)]
pub struct Users {
    tree: Tree,
}

impl Users {
    pub fn new(db: &Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("users")?,
        })
    }

    fn decode(id: &UserId, bytes: &[u8]) -> Result<UserRecord, StoreError> {
        serde_json::from_slice(bytes).map_err(|source| StoreError::Decode {
            id: id.clone(),
            source,
        })
    }

    fn encode(record: &UserRecord) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(record).map_err(|e| StoreError::Backend(e.into()))
    }
}

fn backend(err: sled::Error) -> StoreError {
    StoreError::Backend(err.into())
}

#[async_trait]
impl RecordStore for Users {
    async fn get(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        match self.tree.get(id.as_str()).map_err(backend)? {
            Some(bytes) => Ok(Some(Self::decode(id, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &UserId, updates: &[FieldUpdate]) -> Result<(), StoreError> {
        // Compare-and-swap loop: a concurrent writer to the same document makes
        // us re-read and re-apply, so each call lands as one atomic change.
        loop {
            let current: IVec = self
                .tree
                .get(id.as_str())
                .map_err(backend)?
                .ok_or_else(|| StoreError::Missing(id.clone()))?;
            let mut record = Self::decode(id, &current)?;
            apply_all(&mut record, updates);
            let next = Self::encode(&record)?;
            match self
                .tree
                .compare_and_swap(id.as_str(), Some(&current), Some(next))
                .map_err(backend)?
            {
                Ok(()) => return Ok(()),
                Err(_) => {
                    tracing::trace!(user = %id, "concurrent write, retrying update");
                    continue;
                }
            }
        }
    }

    async fn create(&self, id: &UserId, record: &UserRecord) -> Result<bool, StoreError> {
        let bytes = Self::encode(record)?;
        let swapped = self
            .tree
            .compare_and_swap(id.as_str(), None as Option<&[u8]>, Some(bytes))
            .map_err(backend)?;
        Ok(swapped.is_ok())
    }
}
