//! Process configuration (ambient stack, `SPEC_FULL.md` §10).
//!
//! Grounded on the original Go deployment's flat environment-variable
//! configuration (`DATABASE_URL`, `WORKFLOW_API_TOKENS`, `NODE_TARGET`,
//! `NODE_PORT`, `WORKFLOW_PORT`) and on the teacher crate's layered
//! loader idiom - fail fast on a malformed value, name the offending
//! variable, fall back to an explicit default rather than guessing.
//! Unlike the teacher, there is no YAML/`$include` config file here:
//! the engine's whole configuration surface is small enough to live in
//! the process environment.

use std::time::Duration;

use thiserror::Error;

/// A configuration load failure. Always names the offending variable so
/// an operator can fix it without reading source.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Fully resolved process configuration for the `dagflow-server` binary.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `DATABASE_URL` - sqlx connection string for the state store.
    pub database_url: String,
    /// `NODE_TARGET` - address of the remote node executor (C2).
    pub node_target: String,
    /// `NODE_PORT` - informational; the port the configured node executor
    /// listens on, surfaced in startup logs. Not bound by this process.
    pub node_port: u16,
    /// `WORKFLOW_PORT` - port the management API (C4) binds to.
    pub workflow_port: u16,
    /// Scheduler poll interval. `POLL_INTERVAL_SECS`, default 2s per
    /// `SPEC_FULL.md` §4.3.
    pub poll_interval: Duration,
    /// `WORKFLOW_API_TOKENS` raw value, parsed by [`crate::auth::AuthInterceptor`].
    pub api_tokens: String,
    /// `SERVER_NAME` - operational fingerprint stamped into the
    /// configuration table at startup (`SPEC_FULL.md` §10 supplement).
    pub server_name: String,
}

impl EngineConfig {
    /// Load configuration from the process environment. Required
    /// variables with no sensible default (`DATABASE_URL`, `NODE_TARGET`)
    /// fail fast; everything else falls back to a named default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required_var("DATABASE_URL")?,
            node_target: required_var("NODE_TARGET")?,
            node_port: optional_parsed("NODE_PORT", 7000)?,
            workflow_port: optional_parsed("WORKFLOW_PORT", 8080)?,
            poll_interval: Duration::from_secs(optional_parsed("POLL_INTERVAL_SECS", 2u64)?),
            api_tokens: std::env::var("WORKFLOW_API_TOKENS").unwrap_or_default(),
            server_name: std::env::var("SERVER_NAME").unwrap_or_else(|_| "dagflow".to_string()),
        })
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional_parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid {
                var: name,
                value: raw,
                reason: e.to_string(),
            }),
        Err(_) => Ok(default),
    }
}
