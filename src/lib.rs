pub mod non_api_structs;

use std::fmt;
use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct UserId(pub String);
impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    /// Topic that every friend of this user is subscribed to.
    pub fn topic(&self) -> &str {
        &self.0
    }
    pub fn profile_link(&self) -> String {
        format!("/profile/inspect/{}?from=/", self.0)
    }
}
impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct MovieId(pub String);
impl MovieId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for MovieId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
impl fmt::Display for MovieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The five transitions a caller can request on a friend edge.
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FriendAction {
    Send,
    Accept,
    Decline,
    Remove,
    Revoke,
}
impl FriendAction {
    pub const ALL: [FriendAction; 5] = [
        FriendAction::Send,
        FriendAction::Accept,
        FriendAction::Decline,
        FriendAction::Remove,
        FriendAction::Revoke,
    ];
    pub fn path(&self) -> &'static str {
        match self {
            FriendAction::Send => "/send",
            FriendAction::Accept => "/accept",
            FriendAction::Decline => "/decline",
            FriendAction::Remove => "/remove",
            FriendAction::Revoke => "/revoke",
        }
    }
}
impl fmt::Display for FriendAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path()[1..])
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct Registration {
    pub name: String,
    #[serde(default)]
    pub picture: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct Session {
    pub user: UserId,
    pub token: String,
}
