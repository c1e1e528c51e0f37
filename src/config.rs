//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. User config: `~/.config/tuplegrid/config.toml` (XDG) or platform config dir
//! 2. Project config: `.tuplegrid.toml`
//! 3. Environment variables: `TUPLEGRID_*`, nested with `__` (`TUPLEGRID_DATASTORE__TIMEOUT_MS`)
//!
//! # Example
//!
//! ```toml
//! [error_handler]
//! kind = "log"
//!
//! [datastore]
//! host = "localhost"
//! port = 27017
//! timeout_ms = 5000
//! association_storage = "in_entity"
//!
//! [options]
//! version_column = "version"
//! ```

use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default name of the collection holding association documents.
pub const DEFAULT_ASSOCIATION_COLLECTION: &str = "Associations";

/// Default connect timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: i64 = 5000;

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default)]
    pub error_handler: ErrorHandlerConfig,
    #[serde(default)]
    pub datastore: DatastoreConfig,
    /// Global option layer seeding every [`OptionsContext`](crate::options::OptionsContext).
    #[serde(default)]
    pub options: HashMap<String, JsonValue>,
}

/// Which error handler receives rollback reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandlerKind {
    /// Reports are dropped.
    #[default]
    Noop,
    /// Reports are logged through `tracing`.
    Log,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandlerConfig {
    #[serde(default)]
    pub kind: ErrorHandlerKind,
}

/// How association rows are laid out in document stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationStorage {
    /// Rows are embedded in the owning entity's document.
    InEntity,
    /// All association documents share one collection.
    #[default]
    GlobalCollection,
    /// Each association table gets its own collection.
    CollectionPerAssociation,
}

/// Connection-level settings for a datastore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Connect timeout in milliseconds; must not be negative.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,
    #[serde(default)]
    pub association_storage: AssociationStorage,
    #[serde(default = "default_association_collection")]
    pub association_collection: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_timeout_ms() -> i64 {
    DEFAULT_TIMEOUT_MS
}

fn default_association_collection() -> String {
    DEFAULT_ASSOCIATION_COLLECTION.to_string()
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            association_storage: AssociationStorage::default(),
            association_collection: default_association_collection(),
        }
    }
}

impl DatastoreConfig {
    /// Returns the port, or `default_port` when none is configured.
    pub fn port_or(&self, default_port: u16) -> u16 {
        self.port.unwrap_or(default_port)
    }
}

impl GridConfig {
    /// Load config with layered resolution (user → project → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::base()
            .merge(Toml::file(Self::user_config_path()))
            .merge(Toml::file(".tuplegrid.toml"))
            .merge(Env::prefixed("TUPLEGRID_").split("__"))
            .extract::<Self>()
            .map_err(ConfigError::from)
            .and_then(Self::validated)
    }

    /// Load config from a single file, with environment overrides on top.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::base()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TUPLEGRID_").split("__"))
            .extract::<Self>()
            .map_err(ConfigError::from)
            .and_then(Self::validated)
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(GridConfig::default()))
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.datastore.timeout_ms < 0 {
            return Err(figment::Error::from(format!(
                "datastore.timeout_ms must not be negative, got {}",
                self.datastore.timeout_ms
            ))
            .into());
        }
        Ok(self)
    }

    /// User config path: ~/.config/tuplegrid/config.toml (XDG) or platform config dir.
    fn user_config_path() -> std::path::PathBuf {
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("tuplegrid").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        dirs::config_dir()
            .map(|p| p.join("tuplegrid").join("config.toml"))
            .unwrap_or_default()
    }
}
