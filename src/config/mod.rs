//! Configuration module for the meme generation service

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::path::PathBuf;

/// Main application settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub store: StoreSettings,
    pub assets: AssetSettings,
    pub fetch: FetchSettings,
    pub error_tracking: ErrorTrackingSettings,
    pub cleanup: CleanupSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Credentials and shared secrets
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Application secret, kept for session-bound surfaces
    pub client_secret: String,
    /// Shared secret required in addition to a valid key for restricted endpoints
    pub memer_token: Option<String>,
}

/// Which backend holds usage counters and API keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Counter and key store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub redis_url: String,
    /// Namespace prepended to every Redis key
    pub key_prefix: String,
    /// Keys seeded into the in-process key store
    pub static_keys: Vec<String>,
}

/// Template asset location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetSettings {
    pub path: PathBuf,
}

/// Avatar download limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub max_bytes: usize,
}

/// External error tracking collector
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ErrorTrackingSettings {
    pub dsn: Option<String>,
    pub environment: String,
}

/// Background cleanup cadence
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupSettings {
    pub interval_secs: u64,
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (prefixed with MEMEGEN_)
    /// 2. config.json (legacy single-file config)
    /// 3. config/local.toml (gitignored)
    /// 4. config/default.toml
    /// 5. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Legacy flat keys (client_secret, memer_token, sentry_dsn) are folded in below
            .add_source(File::from(PathBuf::from("config.json")).required(false))
            // MEMEGEN_AUTH__MEMER_TOKEN, MEMEGEN_STORE__REDIS_URL, ...
            .add_source(
                Environment::with_prefix("MEMEGEN")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("store.static_keys"),
            );

        let raw = builder.build()?;
        let mut settings: Settings = raw.clone().try_deserialize()?;
        settings.apply_legacy_keys(&raw);
        Ok(settings)
    }

    /// The legacy config.json carries its secrets at the top level
    fn apply_legacy_keys(&mut self, raw: &Config) {
        if self.auth.client_secret.is_empty() {
            if let Ok(secret) = raw.get_string("client_secret") {
                self.auth.client_secret = secret;
            }
        }
        if self.auth.memer_token.is_none() {
            self.auth.memer_token = raw.get_string("memer_token").ok();
        }
        if self.error_tracking.dsn.is_none() {
            self.error_tracking.dsn = raw.get_string("sentry_dsn").ok();
        }
    }

    /// Worker count, defaulting to two per CPU
    pub fn workers(&self) -> usize {
        self.server.workers.unwrap_or_else(|| num_cpus::get() * 2)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "memegen".to_string(),
            static_keys: Vec::new(),
        }
    }
}

impl Default for AssetSettings {
    fn default() -> Self {
        AssetSettings {
            path: PathBuf::from("assets"),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            timeout_secs: 10,
            max_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Default for ErrorTrackingSettings {
    fn default() -> Self {
        ErrorTrackingSettings {
            dsn: None,
            environment: "production".to_string(),
        }
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        CleanupSettings { interval_secs: 60 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults_without_sources() {
        let settings: Settings = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.fetch.timeout_secs, 10);
        assert!(settings.auth.memer_token.is_none());
    }

    #[test]
    fn test_legacy_json_keys() {
        let raw = Config::builder()
            .add_source(File::from_str(
                r#"{"client_secret": "s3cret", "memer_token": "bot-token", "sentry_dsn": "https://collector.example/1"}"#,
                FileFormat::Json,
            ))
            .build()
            .unwrap();

        let mut settings: Settings = raw.clone().try_deserialize().unwrap();
        settings.apply_legacy_keys(&raw);

        assert_eq!(settings.auth.client_secret, "s3cret");
        assert_eq!(settings.auth.memer_token.as_deref(), Some("bot-token"));
        assert_eq!(
            settings.error_tracking.dsn.as_deref(),
            Some("https://collector.example/1")
        );
    }

    #[test]
    fn test_nested_sections_override_defaults() {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(
                r#"
                [store]
                backend = "redis"
                static_keys = ["abc"]

                [cleanup]
                interval_secs = 5
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.store.backend, StoreBackend::Redis);
        assert_eq!(settings.store.static_keys, vec!["abc".to_string()]);
        assert_eq!(settings.store.key_prefix, "memegen");
        assert_eq!(settings.cleanup.interval_secs, 5);
    }
}
