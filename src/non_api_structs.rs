use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::UserId;

/// A user document as kept by the record store.
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub name: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub fcm_token: String,
    #[serde(default)]
    pub friends: BTreeSet<UserId>,
    #[serde(default)]
    pub incoming_requests: BTreeSet<UserId>,
    #[serde(default)]
    pub outgoing_requests: BTreeSet<UserId>,
}

impl UserRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
    pub fn is_friend(&self, other: &UserId) -> bool {
        self.friends.contains(other)
    }
    pub fn has_request_from(&self, other: &UserId) -> bool {
        self.incoming_requests.contains(other)
    }
    pub fn has_request_to(&self, other: &UserId) -> bool {
        self.outgoing_requests.contains(other)
    }
}
