//! Runtime configuration, read from the environment.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::aggregates::StatusPolicy;
use crate::session::{DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_IDLE_MINUTES};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub nats_url: Option<String>,
    /// Backs device storage for anonymous carts and wishlists.
    pub local_storage_dir: PathBuf,
    pub order_status_policy: StatusPolicy,
    pub session_capacity: usize,
    pub session_idle_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let database_max_connections = parse_or(var("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS", 10)?;
        let port = parse_or(var("PORT"), "PORT", 8083)?;
        let order_status_policy = match var("ORDER_STATUS_POLICY") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name: "ORDER_STATUS_POLICY", value: v })?,
            None => StatusPolicy::default(),
        };
        let session_capacity = parse_or(var("SESSION_CAPACITY"), "SESSION_CAPACITY", DEFAULT_SESSION_CAPACITY)?;
        let session_idle_minutes = parse_or(var("SESSION_IDLE_MINUTES"), "SESSION_IDLE_MINUTES", DEFAULT_SESSION_IDLE_MINUTES)?;
        if session_capacity == 0 {
            return Err(ConfigError::Invalid { name: "SESSION_CAPACITY", value: "0".into() });
        }
        if session_idle_minutes <= 0 {
            return Err(ConfigError::Invalid { name: "SESSION_IDLE_MINUTES", value: session_idle_minutes.to_string() });
        }
        Ok(Self {
            database_url,
            database_max_connections,
            port,
            nats_url: var("NATS_URL"),
            local_storage_dir: var("LOCAL_STORAGE_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./.storefront-local")),
            order_status_policy,
            session_capacity,
            session_idle_minutes,
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { name, value: v }),
        None => Ok(default),
    }
}
