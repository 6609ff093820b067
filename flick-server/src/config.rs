use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::relationship::commit::CommitPolicy;

#[derive(Debug, Clone, Parser)]
#[command(name = "flick-server", about = "Friend graph and rating notification server")]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(long, env = "FLICK_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory of the sled database
    #[arg(long, env = "FLICK_DB_PATH", default_value = "flick-db")]
    pub db_path: PathBuf,

    /// Seconds during which one user's ratings are merged into one notification
    #[arg(long, env = "FLICK_WINDOW_SECS", default_value_t = 300)]
    pub window_secs: u64,

    /// Attempts for the second record write of a friend change
    #[arg(long, env = "FLICK_SECOND_WRITE_ATTEMPTS", default_value_t = 3)]
    pub second_write_attempts: u32,

    /// Base URL of an HTTP push gateway. Pushes are only logged when unset.
    #[arg(long, env = "FLICK_PUSH_GATEWAY")]
    pub push_gateway: Option<String>,

    /// JSON file of `{imdbId, title}` entries loaded into the title cache
    #[arg(long, env = "FLICK_TITLE_SEED")]
    pub title_seed: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window_secs cannot be 0")]
    ZeroWindow,
    #[error("second_write_attempts cannot be 0")]
    ZeroAttempts,
    #[error("invalid push gateway url: {0}")]
    InvalidGateway(String),
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            db_path: PathBuf::from("flick-db"),
            window_secs: 300,
            second_write_attempts: 3,
            push_gateway: None,
            title_seed: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.second_write_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if let Some(url) = &self.push_gateway {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidGateway(url.clone()));
            }
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy {
            attempts: self.second_write_attempts,
            ..CommitPolicy::default()
        }
    }
}
