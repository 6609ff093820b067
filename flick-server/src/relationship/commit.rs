use std::sync::Arc;
use std::time::Duration;

use flick_common::UserId;

use crate::error::FriendError;
use crate::store::{FieldUpdate, RecordStore};

/// A change to a pair of records, written one record after the other.
#[derive(Clone, Debug)]
pub struct PairWrite {
    pub first: (UserId, Vec<FieldUpdate>),
    pub second: (UserId, Vec<FieldUpdate>),
}

impl PairWrite {
    pub fn new(
        first: &UserId,
        first_updates: Vec<FieldUpdate>,
        second: &UserId,
        second_updates: Vec<FieldUpdate>,
    ) -> Self {
        Self {
            first: (first.clone(), first_updates),
            second: (second.clone(), second_updates),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CommitPolicy {
    /// Tries for the second write, including the first one.
    pub attempts: u32,
    /// Multiplied by the attempt number between tries.
    pub backoff: Duration,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Two-step committer. The first write either lands or fails the whole change;
/// the second is retried, and if it still fails the pair is left asymmetric
/// for the repair pass to pick up on the next load.
#[derive(Clone)]
pub struct Committer {
    store: Arc<dyn RecordStore>,
    policy: CommitPolicy,
}

impl Committer {
    pub fn new(store: Arc<dyn RecordStore>, policy: CommitPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn commit(&self, write: PairWrite) -> Result<(), FriendError> {
        let PairWrite { first, second } = write;
        if !first.1.is_empty() {
            self.store.update(&first.0, &first.1).await.map_err(|err| {
                tracing::error!(user = %first.0, error = ?err, "failed to update user");
                FriendError::from(err)
            })?;
        }
        if second.1.is_empty() {
            return Ok(());
        }

        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.update(&second.0, &second.1).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts => {
                    tracing::warn!(user = %second.0, attempt, error = ?err, "second write failed, retrying");
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        first = %first.0,
                        second = %second.0,
                        error = ?err,
                        "pair left asymmetric, repair deferred to next load"
                    );
                    return Err(err.into());
                }
            }
        }
    }
}
