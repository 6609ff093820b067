use std::path::Path;

use async_trait::async_trait;
use flick_common::MovieId;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

/// Resolves a movie id to something a person would recognise.
#[async_trait]
pub trait TitleCache: Send + Sync {
    /// `Ok(None)` is a cache miss.
    async fn resolve_title(&self, movie: &MovieId) -> anyhow::Result<Option<String>>;
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MovieSummary {
    pub imdb_id: MovieId,
    pub title: String,
}

#[derive(Clone)]
pub struct Movies {
    tree: Tree,
}

impl Movies {
    pub fn new(db: &Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("movies")?,
        })
    }

    pub fn insert(&self, movie: &MovieSummary) -> anyhow::Result<()> {
        self.tree
            .insert(movie.imdb_id.as_str(), serde_json::to_vec(movie)?)?;
        Ok(())
    }

    /// Loads a JSON array of [`MovieSummary`] into the cache.
    pub fn seed_from(&self, path: &Path) -> anyhow::Result<usize> {
        let bytes = std::fs::read(path)?;
        let movies: Vec<MovieSummary> = serde_json::from_slice(&bytes)?;
        for movie in &movies {
            self.insert(movie)?;
        }
        Ok(movies.len())
    }
}

#[async_trait]
impl TitleCache for Movies {
    async fn resolve_title(&self, movie: &MovieId) -> anyhow::Result<Option<String>> {
        let Some(bytes) = self.tree.get(movie.as_str())? else {
            return Ok(None);
        };
        let summary: MovieSummary = serde_json::from_slice(&bytes)?;
        Ok(Some(summary.title).filter(|title| !title.is_empty()))
    }
}
