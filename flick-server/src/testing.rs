use std::collections::HashMap;

use async_trait::async_trait;
use flick_common::non_api_structs::UserRecord;
use flick_common::UserId;
use parking_lot::Mutex;

use crate::store::{FieldUpdate, RecordStore, StoreError};
use crate::users::Users;

/// Temporary sled store that can be told to fail the next N updates of a user.
pub(crate) struct FlakyStore {
    db: sled::Db,
    users: Users,
    failures: Mutex<HashMap<UserId, u32>>,
}

impl FlakyStore {
    pub(crate) fn temporary() -> Self {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let users = Users::new(&db).unwrap();
        Self { db, users, failures: Mutex::default() }
    }

    pub(crate) fn db(&self) -> &sled::Db {
        &self.db
    }

    pub(crate) fn fail_updates(&self, id: &str, times: u32) {
        self.failures.lock().insert(UserId::new(id), times);
    }

    pub(crate) async fn record(&self, id: &str) -> UserRecord {
        self.users.get(&UserId::new(id)).await.unwrap().unwrap()
    }

    pub(crate) fn corrupt(&self, id: &str) {
        self.db.open_tree("users").unwrap().insert(id, b"{oops".to_vec()).unwrap();
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        self.users.get(id).await
    }

    async fn update(&self, id: &UserId, updates: &[FieldUpdate]) -> Result<(), StoreError> {
        {
            let mut failures = self.failures.lock();
            if let Some(left) = failures.get_mut(id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(StoreError::Backend(anyhow::anyhow!("injected write failure")));
                }
            }
        }
        self.users.update(id, updates).await
    }

    async fn create(&self, id: &UserId, record: &UserRecord) -> Result<bool, StoreError> {
        self.users.create(id, record).await
    }
}

pub(crate) async fn seed(store: &dyn RecordStore, id: &str, name: &str, token: &str) {
    let mut record = UserRecord::new(name);
    record.fcm_token = token.to_string();
    assert!(store.create(&UserId::new(id), &record).await.unwrap());
}
