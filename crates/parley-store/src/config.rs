//! Store configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the store can be opened with zero
//! configuration for local development.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use parley_shared::constants;

use crate::error::{Result, StoreError};

/// How the public channel projection is written when a channel is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStrategy {
    /// `INSERT ... ON CONFLICT(id) DO UPDATE`.
    Native,
    /// `UPDATE`, then look the row up and `INSERT` only if it is absent.
    /// A zero change count alone never decides the branch.
    UpdateThenInsert,
}

impl UpsertStrategy {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "native" => Some(Self::Native),
            "update_then_insert" => Some(Self::UpdateThenInsert),
            _ => None,
        }
    }
}

/// Capacity and lifetime of every named cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub channel_cache_size: usize,
    pub session_cache_size: usize,
    pub role_cache_size: usize,
    pub scheme_cache_size: usize,
    pub reaction_cache_size: usize,

    pub channel_ttl: Duration,
    pub all_members_for_user_ttl: Duration,
    pub notify_props_ttl: Duration,
    pub member_counts_ttl: Duration,
    pub role_ttl: Duration,
    pub scheme_ttl: Duration,
    pub reaction_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            channel_cache_size: constants::CHANNEL_CACHE_SIZE,
            session_cache_size: constants::SESSION_CACHE_SIZE,
            role_cache_size: constants::ROLE_CACHE_SIZE,
            scheme_cache_size: constants::SCHEME_CACHE_SIZE,
            reaction_cache_size: constants::REACTION_CACHE_SIZE,

            channel_ttl: Duration::from_secs(constants::CHANNEL_CACHE_SEC),
            all_members_for_user_ttl: Duration::from_secs(
                constants::ALL_CHANNEL_MEMBERS_FOR_USER_CACHE_SEC,
            ),
            notify_props_ttl: Duration::from_secs(
                constants::ALL_CHANNEL_MEMBERS_NOTIFY_PROPS_FOR_CHANNEL_CACHE_SEC,
            ),
            member_counts_ttl: Duration::from_secs(constants::CHANNEL_MEMBERS_COUNTS_CACHE_SEC),
            role_ttl: Duration::from_secs(constants::ROLE_CACHE_SEC),
            scheme_ttl: Duration::from_secs(constants::SCHEME_CACHE_SEC),
            reaction_ttl: Duration::from_secs(constants::REACTION_CACHE_SEC),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite database file.
    /// Env: `PARLEY_DB_PATH`
    /// Default: `parley.db` in the platform data directory, or `./parley.db`
    /// when no data directory can be determined.
    pub db_path: PathBuf,

    /// Maximum number of open connections in the pool.
    /// Env: `PARLEY_MAX_CONNECTIONS`
    /// Default: `8`
    pub max_connections: usize,

    /// How long a caller waits for a free connection before giving up.
    /// Env: `PARLEY_CONNECTION_TIMEOUT_MS`
    /// Default: `30000`
    pub connection_timeout: Duration,

    /// How long a writer waits for a competing transaction.
    /// Env: `PARLEY_BUSY_TIMEOUT_MS`
    /// Default: `5000`
    pub busy_timeout: Duration,

    /// Per-team ceiling on live open/private channels, negative = unlimited.
    /// Env: `PARLEY_MAX_CHANNELS_PER_TEAM`
    /// Default: `-1`
    pub max_channels_per_team: i64,

    /// Env: `PARLEY_PUBLIC_CHANNEL_UPSERT` (`native` | `update_then_insert`)
    /// Default: `native`
    pub public_channel_upsert: UpsertStrategy,

    /// Env: `PARLEY_CHANNEL_CACHE_SIZE`, `PARLEY_SESSION_CACHE_SIZE`,
    /// `PARLEY_CHANNEL_CACHE_SECS`.
    pub cache: CacheSettings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let db_path = default_data_dir()
            .map(|dir| dir.join("parley.db"))
            .unwrap_or_else(|_| PathBuf::from("parley.db"));

        Self {
            db_path,
            max_connections: 8,
            connection_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_millis(5000),
            max_channels_per_team: -1,
            public_channel_upsert: UpsertStrategy::Native,
            cache: CacheSettings::default(),
        }
    }
}

impl StoreConfig {
    /// Configuration for a database at an explicit path, everything else
    /// defaulted.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("PARLEY_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(n) = parse_env::<usize>("PARLEY_MAX_CONNECTIONS") {
            config.max_connections = n.max(1);
        }

        if let Some(ms) = parse_env::<u64>("PARLEY_CONNECTION_TIMEOUT_MS") {
            config.connection_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_env::<u64>("PARLEY_BUSY_TIMEOUT_MS") {
            config.busy_timeout = Duration::from_millis(ms);
        }

        if let Some(max) = parse_env::<i64>("PARLEY_MAX_CHANNELS_PER_TEAM") {
            config.max_channels_per_team = max;
        }

        if let Ok(val) = std::env::var("PARLEY_PUBLIC_CHANNEL_UPSERT") {
            match UpsertStrategy::parse(&val) {
                Some(strategy) => config.public_channel_upsert = strategy,
                None => tracing::warn!(
                    value = %val,
                    "Invalid PARLEY_PUBLIC_CHANNEL_UPSERT, using default"
                ),
            }
        }

        if let Some(n) = parse_env::<usize>("PARLEY_CHANNEL_CACHE_SIZE") {
            config.cache.channel_cache_size = n;
        }

        if let Some(n) = parse_env::<usize>("PARLEY_SESSION_CACHE_SIZE") {
            config.cache.session_cache_size = n;
        }

        if let Some(secs) = parse_env::<u64>("PARLEY_CHANNEL_CACHE_SECS") {
            config.cache.channel_ttl = Duration::from_secs(secs);
        }

        config
    }
}

/// Platform data directory, created if missing.
///
/// - Linux:   `~/.local/share/parley`
/// - macOS:   `~/Library/Application Support/com.parley.parley`
/// - Windows: `{FOLDERID_RoamingAppData}\parley\parley\data`
pub fn default_data_dir() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("com", "parley", "parley").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().to_path_buf())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let val = std::env::var(key).ok()?;
    match val.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %val, "Invalid value, using default");
            None
        }
    }
}
