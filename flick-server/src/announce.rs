use std::sync::Arc;

use async_trait::async_trait;

use crate::coalesce::{ClosedWindow, WindowSink};
use crate::dispatch::{Dispatch, PushMessage, Target};
use crate::store::RecordStore;
use crate::titles::TitleCache;

/// Turns a closed rating window into one push to the actor's friends topic.
pub struct RatingAnnouncer {
    store: Arc<dyn RecordStore>,
    titles: Arc<dyn TitleCache>,
    dispatch: Dispatch,
}

pub fn rating_message(name: &str, title: &str, multiple: bool) -> String {
    if multiple {
        format!("{name} rated {title} and more. See what they thought!")
    } else {
        format!("{name} rated {title}. See what they thought!")
    }
}

impl RatingAnnouncer {
    pub fn new(store: Arc<dyn RecordStore>, titles: Arc<dyn TitleCache>, dispatch: Dispatch) -> Self {
        Self { store, titles, dispatch }
    }

    async fn announce(&self, window: &ClosedWindow) -> anyhow::Result<()> {
        let Some(user) = self.store.get(&window.actor).await? else {
            tracing::warn!(actor = %window.actor, "rating from unknown user");
            return Ok(());
        };
        if user.friends.is_empty() {
            tracing::debug!(actor = %window.actor, "no friends to notify");
            return Ok(());
        }
        let title = match self.titles.resolve_title(&window.subject).await {
            Ok(Some(title)) => title,
            Ok(None) => window.subject.to_string(),
            Err(err) => {
                tracing::warn!(movie = %window.subject, error = ?err, "failed to fetch movie");
                window.subject.to_string()
            }
        };
        let message = PushMessage::new(format!("{} rated something.", user.name))
            .with_message(rating_message(&user.name, &title, window.multiple))
            .with_link(window.actor.profile_link());
        self.dispatch
            .send(Target::Topic(window.actor.topic().to_string()), message)
            .await;
        Ok(())
    }
}

#[async_trait]
impl WindowSink for RatingAnnouncer {
    async fn deliver(&self, window: ClosedWindow) {
        if let Err(err) = self.announce(&window).await {
            tracing::warn!(actor = %window.actor, error = ?err, "failed to announce rating");
        }
    }
}
