use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use flick_common::UserId;
use sled::{Db, Tree};

use crate::error::FriendError;
use crate::AppState;

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId, FriendError>;
}

/// Opaque bearer tokens issued at registration, kept as `token -> user id`.
#[derive(Clone)]
pub struct Sessions {
    tree: Tree,
}

impl Sessions {
    pub fn new(db: &Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("sessions")?,
        })
    }

    pub fn issue(&self, user: &UserId) -> anyhow::Result<String> {
        let token = uuid::Uuid::new_v4().to_string();
        self.tree.insert(token.as_str(), user.as_str())?;
        Ok(token)
    }
}

#[async_trait]
impl Authenticator for Sessions {
    async fn verify(&self, token: &str) -> Result<UserId, FriendError> {
        if token.is_empty() {
            return Err(FriendError::Unauthorized);
        }
        let user = self
            .tree
            .get(token)
            .map_err(|e| FriendError::Internal(e.into()))?
            .ok_or(FriendError::Unauthorized)?;
        let user = std::str::from_utf8(&user).map_err(|e| FriendError::Internal(e.into()))?;
        Ok(UserId::new(user))
    }
}

/// The verified caller of a request, taken from the raw `Authorization` header.
pub struct Caller(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = FriendError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = parts
            .extensions
            .get::<AppState>()
            .cloned()
            .ok_or_else(|| FriendError::Internal(anyhow::anyhow!("app state extension missing")))?;
        let Some(token) = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        else {
            tracing::debug!("no token found");
            return Err(FriendError::Unauthorized);
        };
        match state.auth.verify(token.trim()).await {
            Ok(user) => Ok(Caller(user)),
            Err(err) => {
                tracing::debug!(error = %err, "error verifying token");
                Err(err)
            }
        }
    }
}
