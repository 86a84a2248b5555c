//! Environment-driven configuration, read once at startup.

use crate::completion::{DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::dbs::DatabaseConfig;
use crate::queue::DEFAULT_WORKER_COUNT;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub completion: CompletionConfig,
    pub worker_count: usize,
}

#[derive(Clone, Debug)]
pub struct CompletionConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
}

impl Config {
    /// Read configuration from the environment. Call after `dotenvy::dotenv`.
    ///
    /// `DATABASE_URL` selects Postgres; without it the store is the local
    /// JSON snapshot at `LOCAL_DB_PATH` (default `db.json`).
    pub fn from_env() -> Self {
        let database = match std::env::var("DATABASE_URL") {
            Ok(url) => DatabaseConfig::Postgres { url },
            Err(_) => DatabaseConfig::Local {
                path: Some(PathBuf::from(
                    std::env::var("LOCAL_DB_PATH").unwrap_or_else(|_| "db.json".into()),
                )),
            },
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()
                .expect("PORT must be a number"),
            database,
            completion: CompletionConfig {
                api_key: std::env::var("OPENROUTER_API_KEY")
                    .expect("OPENROUTER_API_KEY must be set"),
                api_base: std::env::var("OPENROUTER_API_BASE")
                    .unwrap_or_else(|_| DEFAULT_API_BASE.into()),
                model: std::env::var("COMPLETION_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
            },
            worker_count: std::env::var("WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WORKER_COUNT),
        }
    }
}
