use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::client::ApiConfig;
use crate::error::Error;
use crate::manager::DEFAULT_REFRESH_INTERVAL;
use crate::storage::{AnyStorage, FileStorage, MemoryStorage};

/// Session manager configuration.
///
/// Required field (the API base URL) is a constructor parameter.
///
/// Use [`from_env()`](SessionConfig::from_env) for convention-based setup,
/// or [`new()`](SessionConfig::new) with `with_*` methods for full control.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    api: ApiConfig,
    refresh_interval: Duration,
    session_file: Option<PathBuf>,
}

impl SessionConfig {
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api: ApiConfig::new(api_base_url),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            session_file: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SPORTGO_API_URL`: API base URL (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `SPORTGO_REFRESH_INTERVAL_SECS`: token refresh period (default 600)
    /// - `SPORTGO_LOGIN_PATH`, `SPORTGO_REFRESH_PATH`, `SPORTGO_USERINFO_PATH`,
    ///   `SPORTGO_LOGOUT_PATH`: override endpoint paths
    /// - `SPORTGO_SESSION_FILE`: persist the session to this file instead of memory
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `var`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required variables are missing or values are invalid.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let base_url = var("SPORTGO_API_URL")
            .ok_or_else(|| Error::Config("SPORTGO_API_URL is required".into()))?;
        let base_url: Url = base_url
            .parse()
            .map_err(|e| Error::Config(format!("SPORTGO_API_URL: {e}")))?;

        let mut config = Self::new(base_url);

        if let Some(secs) = var("SPORTGO_REFRESH_INTERVAL_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("SPORTGO_REFRESH_INTERVAL_SECS: {e}")))?;
            if secs == 0 {
                return Err(Error::Config(
                    "SPORTGO_REFRESH_INTERVAL_SECS must be greater than zero".into(),
                ));
            }
            config = config.with_refresh_interval(Duration::from_secs(secs));
        }
        if let Some(path) = var("SPORTGO_LOGIN_PATH") {
            config.api = config.api.with_login_path(path);
        }
        if let Some(path) = var("SPORTGO_REFRESH_PATH") {
            config.api = config.api.with_refresh_path(path);
        }
        if let Some(path) = var("SPORTGO_USERINFO_PATH") {
            config.api = config.api.with_user_info_path(path);
        }
        if let Some(path) = var("SPORTGO_LOGOUT_PATH") {
            config.api = config.api.with_logout_path(path);
        }
        if let Some(path) = var("SPORTGO_SESSION_FILE").filter(|p| !p.trim().is_empty()) {
            config = config.with_session_file(path);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    #[must_use]
    pub fn session_file(&self) -> Option<&std::path::Path> {
        self.session_file.as_deref()
    }

    /// The storage backend this configuration selects.
    #[must_use]
    pub fn storage(&self) -> AnyStorage {
        match &self.session_file {
            Some(path) => AnyStorage::File(FileStorage::new(path)),
            None => AnyStorage::Memory(MemoryStorage::new()),
        }
    }
}
