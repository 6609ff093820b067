//! Friend relationship state machine.
//!
//! Every operation loads both records, repairs the pair if the two sides
//! disagree, checks its guard against the repaired view and then writes both
//! records through the [`Committer`]. The two writes are not atomic with
//! respect to each other; see [`edge`] for how a half-applied change is
//! resolved on the next load.

pub mod commit;
pub mod edge;

use std::sync::Arc;

use axum::http::StatusCode;
use flick_common::non_api_structs::UserRecord;
use flick_common::UserId;

use crate::dispatch::{Dispatch, PushMessage, Target};
use crate::error::FriendError;
use crate::store::{FieldUpdate, RecordStore, SetField, StoreError};
use commit::{CommitPolicy, Committer, PairWrite};
use edge::{FriendshipChange, Phase};

pub const FRIEND_ALREADY_ADDED: &str = "friend already added";
pub const REQUEST_ALREADY_SENT: &str = "friend request already sent";
pub const NO_FRIEND_REQUEST: &str = "no friend request";
pub const NOT_FRIENDS: &str = "not friends with user";
pub const NO_REQUEST_SENT: &str = "no friend request sent to this user";
pub const SELF_REQUEST: &str = "cannot befriend yourself";

/// Status reported when `send` finds the counterpart already asked first.
pub const AUTO_ACCEPTED: u16 = 210;

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum Transition {
    Requested,
    AutoAccepted,
    Accepted,
    Declined,
    Removed,
    Revoked,
}

impl Transition {
    pub fn code(&self) -> u16 {
        match self {
            Transition::AutoAccepted => AUTO_ACCEPTED,
            _ => StatusCode::OK.as_u16(),
        }
    }
}

/// Flattens an operation result into the `(status, message)` pair returned to
/// callers.
pub fn reply(result: Result<Transition, FriendError>) -> (u16, String) {
    match result {
        Ok(transition) => (transition.code(), "Ok".to_string()),
        Err(err) => {
            if let FriendError::Internal(inner) = &err {
                tracing::error!(error = ?inner, "friend operation failed");
            }
            (err.status().as_u16(), err.message())
        }
    }
}

/// Both records of a pair, already repaired.
struct Pair {
    user: UserRecord,
    friend: UserRecord,
    phase: Phase,
}

pub struct Relationships {
    store: Arc<dyn RecordStore>,
    committer: Committer,
    dispatch: Dispatch,
}

impl Relationships {
    pub fn new(store: Arc<dyn RecordStore>, dispatch: Dispatch, policy: CommitPolicy) -> Self {
        Self {
            committer: Committer::new(store.clone(), policy),
            store,
            dispatch,
        }
    }

    async fn get_and_parse(&self, user_id: &UserId, friend_id: &UserId) -> Result<Pair, FriendError> {
        if user_id == friend_id {
            return Err(FriendError::InvalidTransition(SELF_REQUEST));
        }
        let mut user = self
            .store
            .get(user_id)
            .await?
            .ok_or(FriendError::NotFound("user doesn't exist"))?;
        let mut friend = self
            .store
            .get(friend_id)
            .await?
            .ok_or(FriendError::NotFound("friend doesn't exist"))?;

        let reconciliation = edge::reconcile(user_id, &user, friend_id, &friend);
        if !reconciliation.repair.is_empty() {
            tracing::warn!(
                user = %user_id,
                friend = %friend_id,
                repair = ?reconciliation.repair,
                "asymmetric pair, repairing"
            );
            let repair = &reconciliation.repair;
            self.committer
                .commit(PairWrite::new(user_id, repair.a.clone(), friend_id, repair.b.clone()))
                .await?;
            repair.apply(&mut user, &mut friend);
        }

        match reconciliation.change {
            FriendshipChange::Completed => {
                self.dispatch.subscribe(&friend.fcm_token, user_id.topic()).await;
                self.dispatch.subscribe(&user.fcm_token, friend_id.topic()).await;
            }
            FriendshipChange::Dropped => {
                self.dispatch.unsubscribe(&friend.fcm_token, user_id.topic()).await;
                self.dispatch.unsubscribe(&user.fcm_token, friend_id.topic()).await;
            }
            FriendshipChange::Unchanged => {}
        }
        Ok(Pair { user, friend, phase: reconciliation.phase })
    }

    pub async fn send(&self, user_id: &UserId, friend_id: &UserId) -> Result<Transition, FriendError> {
        let pair = self.get_and_parse(user_id, friend_id).await?;
        if pair.user.is_friend(friend_id) {
            return Err(FriendError::InvalidTransition(FRIEND_ALREADY_ADDED));
        }
        if pair.user.has_request_to(friend_id) {
            return Err(FriendError::InvalidTransition(REQUEST_ALREADY_SENT));
        }
        if pair.friend.has_request_from(user_id) {
            return Err(FriendError::InvalidTransition(FRIEND_ALREADY_ADDED));
        }
        if pair.friend.has_request_to(user_id) {
            // crossing requests: accept theirs
            self.accept(user_id, friend_id).await?;
            return Ok(Transition::AutoAccepted);
        }

        self.committer
            .commit(PairWrite::new(
                friend_id,
                vec![FieldUpdate::SetUnion(SetField::IncomingRequests, user_id.clone())],
                user_id,
                vec![FieldUpdate::SetUnion(SetField::OutgoingRequests, friend_id.clone())],
            ))
            .await?;
        tracing::info!(from = %user_id, to = %friend_id, "friend request sent");
        self.dispatch
            .send(
                Target::Token(pair.friend.fcm_token),
                PushMessage::new(format!("{} sent you a friend request", pair.user.name))
                    .with_link("/requests?from=/profile/friends"),
            )
            .await;
        Ok(Transition::Requested)
    }

    pub async fn accept(&self, user_id: &UserId, friend_id: &UserId) -> Result<Transition, FriendError> {
        let pair = self.get_and_parse(user_id, friend_id).await?;
        if !pair.user.has_request_from(friend_id) {
            let strip = [FieldUpdate::SetRemove(SetField::IncomingRequests, friend_id.clone())];
            if let Err(err) = self.store.update(user_id, &strip).await {
                tracing::warn!(
                    user = %user_id,
                    friend = %friend_id,
                    error = %err,
                    "failed to strip stale request"
                );
            }
            return Err(FriendError::InvalidTransition(NO_FRIEND_REQUEST));
        }

        self.committer
            .commit(PairWrite::new(
                user_id,
                vec![
                    FieldUpdate::SetUnion(SetField::Friends, friend_id.clone()),
                    FieldUpdate::SetRemove(SetField::IncomingRequests, friend_id.clone()),
                ],
                friend_id,
                vec![
                    FieldUpdate::SetUnion(SetField::Friends, user_id.clone()),
                    FieldUpdate::SetRemove(SetField::OutgoingRequests, user_id.clone()),
                ],
            ))
            .await?;
        tracing::info!(user = %user_id, friend = %friend_id, "friend request accepted");

        self.dispatch.subscribe(&pair.friend.fcm_token, user_id.topic()).await;
        self.dispatch.subscribe(&pair.user.fcm_token, friend_id.topic()).await;
        self.dispatch
            .send(
                Target::Token(pair.friend.fcm_token),
                PushMessage::new(format!("{} accepted your friend request", pair.user.name))
                    .with_link(user_id.profile_link()),
            )
            .await;
        Ok(Transition::Accepted)
    }

    pub async fn decline(&self, user_id: &UserId, friend_id: &UserId) -> Result<Transition, FriendError> {
        let pair = self.get_and_parse(user_id, friend_id).await?;
        if !pair.user.has_request_from(friend_id) || !pair.friend.has_request_to(user_id) {
            return Err(FriendError::InvalidTransition(NO_FRIEND_REQUEST));
        }
        self.committer
            .commit(PairWrite::new(
                user_id,
                vec![FieldUpdate::SetRemove(SetField::IncomingRequests, friend_id.clone())],
                friend_id,
                vec![FieldUpdate::SetRemove(SetField::OutgoingRequests, user_id.clone())],
            ))
            .await?;
        tracing::info!(user = %user_id, friend = %friend_id, "friend request declined");
        Ok(Transition::Declined)
    }

    pub async fn remove(&self, user_id: &UserId, friend_id: &UserId) -> Result<Transition, FriendError> {
        let pair = self.get_and_parse(user_id, friend_id).await?;
        if !pair.user.is_friend(friend_id) {
            return Err(FriendError::InvalidTransition(NOT_FRIENDS));
        }
        self.committer
            .commit(PairWrite::new(
                user_id,
                vec![FieldUpdate::SetRemove(SetField::Friends, friend_id.clone())],
                friend_id,
                vec![FieldUpdate::SetRemove(SetField::Friends, user_id.clone())],
            ))
            .await?;
        tracing::info!(user = %user_id, friend = %friend_id, "friend removed");

        self.dispatch.unsubscribe(&pair.friend.fcm_token, user_id.topic()).await;
        self.dispatch.unsubscribe(&pair.user.fcm_token, friend_id.topic()).await;
        Ok(Transition::Removed)
    }

    pub async fn revoke(&self, user_id: &UserId, friend_id: &UserId) -> Result<Transition, FriendError> {
        let pair = self.get_and_parse(user_id, friend_id).await?;
        if !pair.user.has_request_to(friend_id) {
            return Err(FriendError::InvalidTransition(NO_REQUEST_SENT));
        }
        self.committer
            .commit(PairWrite::new(
                friend_id,
                vec![FieldUpdate::SetRemove(SetField::IncomingRequests, user_id.clone())],
                user_id,
                vec![FieldUpdate::SetRemove(SetField::OutgoingRequests, friend_id.clone())],
            ))
            .await?;
        tracing::info!(user = %user_id, friend = %friend_id, "friend request revoked");
        Ok(Transition::Revoked)
    }

    /// Loads the pair, repairing it if needed, and reports where the edge stands.
    pub async fn reconcile(&self, user_id: &UserId, friend_id: &UserId) -> Result<Phase, FriendError> {
        Ok(self.get_and_parse(user_id, friend_id).await?.phase)
    }

    /// Stores a new device token for `user_id` and subscribes it to the topic of
    /// every current friend.
    pub async fn register_device(&self, user_id: &UserId, token: &str) -> Result<(), FriendError> {
        self.store
            .update(user_id, &[FieldUpdate::AssignToken(token.to_string())])
            .await
            .map_err(|err| match err {
                StoreError::Missing(_) => FriendError::NotFound("user doesn't exist"),
                other => other.into(),
            })?;
        let user = self
            .store
            .get(user_id)
            .await?
            .ok_or(FriendError::NotFound("user doesn't exist"))?;
        for friend in &user.friends {
            tracing::debug!(user = %user_id, topic = friend.topic(), "subscribing device");
            self.dispatch.subscribe(token, friend.topic()).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
