pub mod announce;
pub mod auth;
pub mod coalesce;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod relationship;
pub mod routes;
pub mod store;
pub mod titles;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;

use anyhow::Context;
use flick_common::non_api_structs::UserRecord;
use flick_common::UserId;
use sled::Db;

use crate::announce::RatingAnnouncer;
use crate::auth::{Authenticator, Sessions};
use crate::coalesce::{Coalescer, TokioClock};
use crate::config::ServerConfig;
use crate::dispatch::{Dispatch, GatewayTransport, LogTransport, PushTransport};
use crate::relationship::Relationships;
use crate::store::RecordStore;
use crate::titles::Movies;
use crate::users::Users;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub auth: Arc<dyn Authenticator>,
    pub sessions: Sessions,
    pub relationships: Arc<Relationships>,
    pub coalescer: Arc<Coalescer>,
}

impl AppState {
    pub fn open(config: &ServerConfig) -> anyhow::Result<Self> {
        let db = sled::open(&config.db_path)
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
        Self::with_db(db, config, transport_for(config))
    }

    /// State over a throwaway database, for embedding and tests.
    pub fn temporary(config: &ServerConfig, transport: Arc<dyn PushTransport>) -> anyhow::Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db, config, transport)
    }

    pub fn with_db(db: Db, config: &ServerConfig, transport: Arc<dyn PushTransport>) -> anyhow::Result<Self> {
        let store: Arc<dyn RecordStore> = Arc::new(Users::new(&db)?);
        let sessions = Sessions::new(&db)?;
        let movies = Movies::new(&db)?;
        if let Some(seed) = &config.title_seed {
            let count = movies
                .seed_from(seed)
                .with_context(|| format!("failed to seed titles from {}", seed.display()))?;
            tracing::info!(count, "seeded title cache");
        }

        let dispatch = Dispatch::new(transport);
        let relationships = Relationships::new(store.clone(), dispatch.clone(), config.commit_policy());
        let announcer = RatingAnnouncer::new(store.clone(), Arc::new(movies), dispatch);
        let coalescer = Coalescer::new(config.window(), Arc::new(TokioClock), Arc::new(announcer));

        Ok(Self {
            store,
            auth: Arc::new(sessions.clone()),
            sessions,
            relationships: Arc::new(relationships),
            coalescer,
        })
    }

    pub async fn user(&self, user: &UserId) -> anyhow::Result<UserRecord> {
        self.store
            .get(user)
            .await?
            .with_context(|| format!("Error getting user {user}"))
    }
}

pub fn transport_for(config: &ServerConfig) -> Arc<dyn PushTransport> {
    match &config.push_gateway {
        Some(url) => Arc::new(GatewayTransport::new(url.clone())),
        None => Arc::new(LogTransport),
    }
}

/// Serves the API on `listener` until `shutdown` resolves, then delivers any
/// notification windows that are still open.
pub async fn run(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let app = routes::router(state.clone());
    axum::Server::from_tcp(listener)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    state.coalescer.flush().await;
    Ok(())
}
