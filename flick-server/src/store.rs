//! Record store port.
//!
//! Only single-document atomicity is assumed: one `update` call either applies
//! every field update for that user or none of them. Nothing spans two users.

use async_trait::async_trait;
use flick_common::non_api_structs::UserRecord;
use flick_common::UserId;

/// The id sets on a user record that relationship changes touch.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum SetField {
    Friends,
    IncomingRequests,
    OutgoingRequests,
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub enum FieldUpdate {
    SetUnion(SetField, UserId),
    SetRemove(SetField, UserId),
    AssignToken(String),
}

impl FieldUpdate {
    pub fn apply(&self, record: &mut UserRecord) {
        match self {
            FieldUpdate::SetUnion(field, id) => {
                set_mut(record, *field).insert(id.clone());
            }
            FieldUpdate::SetRemove(field, id) => {
                set_mut(record, *field).remove(id);
            }
            FieldUpdate::AssignToken(token) => record.fcm_token = token.clone(),
        }
    }
}

fn set_mut(record: &mut UserRecord, field: SetField) -> &mut std::collections::BTreeSet<UserId> {
    match field {
        SetField::Friends => &mut record.friends,
        SetField::IncomingRequests => &mut record.incoming_requests,
        SetField::OutgoingRequests => &mut record.outgoing_requests,
    }
}

pub fn apply_all(record: &mut UserRecord, updates: &[FieldUpdate]) {
    for update in updates {
        update.apply(record);
    }
}

/// Errors a store may report. `Decode` is kept apart so callers can tell a
/// corrupt document from a transport fault.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user {0} does not exist")]
    Missing(UserId),
    #[error("failed to decode user {id}: {source}")]
    Decode {
        id: UserId,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError>;
    /// Applies `updates` to one record atomically. Fails with `Missing` if the
    /// record does not exist.
    async fn update(&self, id: &UserId, updates: &[FieldUpdate]) -> Result<(), StoreError>;
    /// Inserts a new record. Returns `false` if the id was already taken.
    async fn create(&self, id: &UserId, record: &UserRecord) -> Result<bool, StoreError>;
}
