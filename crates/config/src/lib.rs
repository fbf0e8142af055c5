//! Layered configuration for memefold.
//!
//! Values come from three layers, each overriding the one before:
//!
//! 1. Compiled defaults ([`Config::default`]).
//! 2. A config file: the path given on the command line, or `config.toml` in
//!    the platform config directory if it exists. TOML, YAML (`.yaml`/`.yml`)
//!    and JSON (`.json`) are accepted.
//! 3. Environment variables prefixed with `MEMEFOLD_`. Nested keys are
//!    separated with `__`, so `MEMEFOLD_LIMITS__FOLDER_LIMIT=8` sets
//!    `limits.folder_limit`.
//!
//! ```toml
//! [limits]
//! folder_limit = 5
//! max_file_size = 10485760
//! name_matching = "case-insensitive"
//!
//! [storage]
//! backend = "local"
//! root = "/var/lib/memefold/objects"
//! public_url = "https://images.example.com/user-images"
//!
//! [database]
//! path = "/var/lib/memefold/memefold.db"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use memefold_library::Limits;
use memefold_records::Database;
use memefold_storage::BackendHandle;
use memefold_storage::backend::LocalBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const ENV_PREFIX: &str = "MEMEFOLD_";
const APPLICATION: &str = "memefold";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub limits: Limits,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    S3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Local backend directory. Defaults to `objects` in the platform data
    /// directory.
    pub root: Option<PathBuf>,
    /// Base URL objects are served under. Required for the local backend.
    pub public_url: Option<String>,
    pub bucket: String,
    pub prefix: Option<String>,
    pub region: String,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}
impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            root: None,
            public_url: Some("http://localhost:8080/user-images".to_string()),
            bucket: "user-images".to_string(),
            prefix: None,
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to `memefold.db` in the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// An explicit `file` must exist. Without one, the default config file is
    /// used if present.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// The layered provider, before extraction.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        let file = match file {
            Some(path) if !path.exists() => exn::bail!(ErrorKind::FileNotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => default_config_file().filter(|path| path.exists()),
        };
        if let Some(path) = file {
            tracing::debug!(path = %path.display(), "reading config file");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.folder_limit == 0 {
            exn::bail!(ErrorKind::invalid("limits.folder_limit", "must be greater than zero"));
        }
        if limits.max_images_per_folder == Some(0) {
            exn::bail!(ErrorKind::invalid("limits.max_images_per_folder", "must be greater than zero"));
        }
        if limits.max_file_size == 0 {
            exn::bail!(ErrorKind::invalid("limits.max_file_size", "must be greater than zero"));
        }
        if limits.free_tier_bytes == 0 {
            exn::bail!(ErrorKind::invalid("limits.free_tier_bytes", "must be greater than zero"));
        }
        if let Some(url) = &self.storage.public_url
            && !is_http_url(url)
        {
            exn::bail!(ErrorKind::invalid("storage.public_url", format!("`{url}` is not an http(s) URL")));
        }
        match self.storage.backend {
            BackendKind::Local if self.storage.public_url.is_none() => {
                exn::bail!(ErrorKind::invalid("storage.public_url", "required for the local backend"));
            },
            BackendKind::S3 if self.storage.bucket.trim().is_empty() => {
                exn::bail!(ErrorKind::invalid("storage.bucket", "must not be empty"));
            },
            _ => {},
        }
        if !matches!(self.logging.level.to_lowercase().as_str(), "trace" | "debug" | "info" | "warn" | "warning" | "error")
        {
            exn::bail!(ErrorKind::invalid("logging.level", format!("unknown level `{}`", self.logging.level)));
        }
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        self.limits.clone()
    }

    pub fn storage_root(&self) -> Result<PathBuf> {
        match &self.storage.root {
            Some(root) => Ok(root.clone()),
            None => Ok(project_dirs()?.data_dir().join("objects")),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("memefold.db")),
        }
    }

    /// Build the configured object storage backend.
    pub async fn storage_backend(&self) -> Result<BackendHandle> {
        match self.storage.backend {
            BackendKind::Local => {
                let root = self.storage_root()?;
                let public_url =
                    self.storage.public_url.clone().ok_or_raise(|| ErrorKind::invalid("storage.public_url", "missing"))?;
                let backend = LocalBackend::new("local", &root, public_url).or_raise(|| ErrorKind::Storage)?;
                tracing::debug!(root = %root.display(), "using local object storage");
                Ok(Arc::new(backend))
            },
            BackendKind::S3 => self.s3_backend().await,
        }
    }

    #[cfg(feature = "s3")]
    async fn s3_backend(&self) -> Result<BackendHandle> {
        let storage = &self.storage;
        let key_id =
            storage.access_key_id.clone().ok_or_raise(|| ErrorKind::invalid("storage.access_key_id", "missing"))?;
        let secret = storage
            .secret_access_key
            .clone()
            .ok_or_raise(|| ErrorKind::invalid("storage.secret_access_key", "missing"))?;
        let backend = memefold_storage::backend::S3Backend::new(
            "s3",
            storage.bucket.clone(),
            storage.prefix.clone(),
            storage.region.clone(),
            storage.endpoint.clone(),
            storage.public_url.clone(),
            key_id,
            secret,
        )
        .await
        .or_raise(|| ErrorKind::Storage)?;
        tracing::debug!(bucket = %storage.bucket, "using S3 object storage");
        Ok(Arc::new(backend))
    }

    #[cfg(not(feature = "s3"))]
    async fn s3_backend(&self) -> Result<BackendHandle> {
        exn::bail!(ErrorKind::UnsupportedBackend("s3"))
    }

    /// Open (creating if needed) the records database.
    pub async fn database(&self) -> Result<Database> {
        let path = self.database_path()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
        }
        let db = Database::connect(&path).await.or_raise(|| ErrorKind::Database)?;
        tracing::debug!(path = %path.display(), "opened records database");
        Ok(db)
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION).ok_or_raise(|| ErrorKind::NoDirectories)
}

/// `config.toml` in the platform config directory.
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().join("config.toml"))
}

fn is_http_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
