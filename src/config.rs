//! Process configuration parsed from environment variables.
//!
//! All values are read once at startup; there is no hot reload.
//!
//! Optional:
//! - `PORT`: listening port, default 3001
//! - `FRONTEND_ORIGIN`: `*` / `all` (default) or a comma-separated origin list
//! - `SPAWN_HALF_EXTENT`: half side of the spawn square, default 5.0
//! - `MOVE_SCALE`: world units per unit of move input, default 0.8
//! - `MAX_CONNECTIONS`: admission limit, unset or 0 for unlimited
//! - `OUTBOUND_QUEUE_CAPACITY`: per-connection queue depth, default 256
//! - `MAX_FRAME_BYTES`: larger inbound frames are dropped, default 4096

use std::str::FromStr;

use axum::http::HeaderValue;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_SPAWN_HALF_EXTENT: f64 = 5.0;
pub const DEFAULT_MOVE_SCALE: f64 = 0.8;
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid { var: &'static str, value: String, reason: &'static str },
}

impl crate::frame::ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        "E_CONFIG"
    }
}

/// Cross-origin policy for browser clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    /// Exact-match origins, already validated as header values.
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub allowed_origins: AllowedOrigins,
    pub spawn_half_extent: f64,
    pub move_scale: f64,
    pub max_connections: Option<usize>,
    pub outbound_queue_capacity: usize,
    pub max_frame_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origins: AllowedOrigins::Any,
            spawn_half_extent: DEFAULT_SPAWN_HALF_EXTENT,
            move_scale: DEFAULT_MOVE_SCALE,
            max_connections: None,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl Config {
    /// Build typed config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first variable that is set
    /// but cannot be parsed or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build typed config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_var(&lookup, "PORT", defaults.port)?;
        let allowed_origins = match lookup("FRONTEND_ORIGIN") {
            Some(raw) => parse_origins(&raw)?,
            None => defaults.allowed_origins,
        };

        let spawn_half_extent = parse_var(&lookup, "SPAWN_HALF_EXTENT", defaults.spawn_half_extent)?;
        if !spawn_half_extent.is_finite() || spawn_half_extent < 0.0 {
            return Err(invalid("SPAWN_HALF_EXTENT", spawn_half_extent, "must be finite and non-negative"));
        }

        let move_scale = parse_var(&lookup, "MOVE_SCALE", defaults.move_scale)?;
        if !move_scale.is_finite() {
            return Err(invalid("MOVE_SCALE", move_scale, "must be finite"));
        }

        let max_connections = match parse_var(&lookup, "MAX_CONNECTIONS", 0_usize)? {
            0 => None,
            n => Some(n),
        };

        let outbound_queue_capacity =
            parse_var(&lookup, "OUTBOUND_QUEUE_CAPACITY", defaults.outbound_queue_capacity)?;
        if outbound_queue_capacity == 0 {
            return Err(invalid("OUTBOUND_QUEUE_CAPACITY", 0, "must be at least 1"));
        }

        let max_frame_bytes = parse_var(&lookup, "MAX_FRAME_BYTES", defaults.max_frame_bytes)?;

        Ok(Self {
            port,
            allowed_origins,
            spawn_half_extent,
            move_scale,
            max_connections,
            outbound_queue_capacity,
            max_frame_bytes,
        })
    }
}

/// Parse `FRONTEND_ORIGIN`: `*` or `all` allow any origin, anything else is a
/// comma-separated exact-match list.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` for an empty list or an origin that is not
/// a valid header value.
pub fn parse_origins(raw: &str) -> Result<AllowedOrigins, ConfigError> {
    let trimmed = raw.trim();
    if trimmed == "*" || trimmed.eq_ignore_ascii_case("all") {
        return Ok(AllowedOrigins::Any);
    }

    let origins: Vec<String> = trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();

    if origins.is_empty() {
        return Err(invalid("FRONTEND_ORIGIN", raw, "no origins listed"));
    }
    if origins.iter().any(|o| HeaderValue::from_str(o).is_err()) {
        return Err(invalid("FRONTEND_ORIGIN", raw, "origin is not a valid header value"));
    }
    Ok(AllowedOrigins::List(origins))
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| invalid(var, raw, "not a valid value")),
        None => Ok(default),
    }
}

fn invalid(var: &'static str, value: impl ToString, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { var, value: value.to_string(), reason }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
