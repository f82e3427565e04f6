//! Client configuration.
//!
//! `ClientConfig` can be deserialized from TOML (every key optional) or
//! assembled from `RESTCACHE_*` environment variables.
//!
//! There is no shared default cache location. Entries live in `cache_dir`
//! when it is set, otherwise in `<user cache dir>/<app_name>`.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;
use crate::request::ContentType;

/// Basic-auth credentials sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub ssl_port: u16,
    pub use_ssl: bool,
    /// Body encoding for POST/PUT requests that do not set their own.
    pub content_type: ContentType,
    pub credentials: Option<Credentials>,
    pub user_agent: Option<String>,
    /// Skip TLS certificate verification. Development only.
    pub accept_invalid_certs: bool,
    /// Names the per-application directory under the user cache directory.
    pub app_name: Option<String>,
    /// Explicit cache directory; takes precedence over `app_name`.
    pub cache_dir: Option<PathBuf>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
            ssl_port: Self::DEFAULT_SSL_PORT,
            use_ssl: true,
            content_type: ContentType::default(),
            credentials: None,
            user_agent: None,
            accept_invalid_certs: false,
            app_name: None,
            cache_dir: None,
            connect_timeout_secs: None,
            read_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    const DEFAULT_HOST: &str = "localhost";
    const DEFAULT_PORT: u16 = 80;
    const DEFAULT_SSL_PORT: u16 = 443;
    const INSECURE_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    const INSECURE_READ_TIMEOUT: Duration = Duration::from_secs(45);

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unset variables keep
    /// their defaults; set but unparsable ones are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup("RESTCACHE_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "RESTCACHE_PORT")? {
            config.port = port;
        }
        if let Some(port) = parse_var(&lookup, "RESTCACHE_SSL_PORT")? {
            config.ssl_port = port;
        }
        if let Some(use_ssl) = parse_var(&lookup, "RESTCACHE_USE_SSL")? {
            config.use_ssl = use_ssl;
        }
        if let Some(raw) = lookup("RESTCACHE_CONTENT_TYPE") {
            config.content_type =
                raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "RESTCACHE_CONTENT_TYPE".to_string(),
                    value: raw.clone(),
                })?;
        }
        match (lookup("RESTCACHE_USERNAME"), lookup("RESTCACHE_PASSWORD")) {
            (Some(username), Some(password)) => {
                config.credentials = Some(Credentials { username, password });
            }
            (Some(_), None) | (None, Some(_)) => {
                warn!("only one of RESTCACHE_USERNAME / RESTCACHE_PASSWORD is set, basic auth disabled");
            }
            (None, None) => {}
        }
        config.user_agent = lookup("RESTCACHE_USER_AGENT");
        if let Some(insecure) = parse_var(&lookup, "RESTCACHE_ACCEPT_INVALID_CERTS")? {
            config.accept_invalid_certs = insecure;
        }
        config.app_name = lookup("RESTCACHE_APP_NAME");
        config.cache_dir = lookup("RESTCACHE_CACHE_DIR").map(PathBuf::from);
        config.connect_timeout_secs = parse_var(&lookup, "RESTCACHE_CONNECT_TIMEOUT_SECS")?;
        config.read_timeout_secs = parse_var(&lookup, "RESTCACHE_READ_TIMEOUT_SECS")?;
        if config.accept_invalid_certs {
            warn!("TLS certificate verification is disabled");
        }
        Ok(config)
    }

    /// Scheme, host and port every relative endpoint is resolved against.
    /// Standard ports are omitted.
    pub fn origin(&self) -> String {
        let (scheme, port, default_port) = if self.use_ssl {
            ("https", self.ssl_port, Self::DEFAULT_SSL_PORT)
        } else {
            ("http", self.port, Self::DEFAULT_PORT)
        };
        if port == default_port {
            format!("{scheme}://{}", self.host)
        } else {
            format!("{scheme}://{}:{port}", self.host)
        }
    }

    /// Directory the file cache lives in: `cache_dir`, else `app_name` under
    /// the user cache directory. `None` when neither is configured.
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Some(dir.clone());
        }
        let app_name = self.app_name.as_deref().filter(|name| !name.trim().is_empty())?;
        user_cache_dir().map(|base| base.join(app_name))
    }

    /// Explicit connect timeout, or 15s when certificate checks are off.
    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout_secs {
            Some(secs) => Some(Duration::from_secs(secs)),
            None if self.accept_invalid_certs => Some(Self::INSECURE_CONNECT_TIMEOUT),
            None => None,
        }
    }

    /// Explicit read timeout, or 45s when certificate checks are off.
    pub fn read_timeout(&self) -> Option<Duration> {
        match self.read_timeout_secs {
            Some(secs) => Some(Duration::from_secs(secs)),
            None if self.accept_invalid_certs => Some(Self::INSECURE_READ_TIMEOUT),
            None => None,
        }
    }
}

/// Per-user cache root for the current platform.
pub fn user_cache_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        env::var_os("LOCALAPPDATA").map(PathBuf::from)
    }
    #[cfg(target_os = "macos")]
    {
        home::home_dir().map(|p| p.join("Library/Caches"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        env::var_os("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .filter(|p| p.is_absolute())
            .or_else(|| home::home_dir().map(|p| p.join(".cache")))
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}
