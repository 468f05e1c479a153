//! campus.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration_or;

/// Environment variable overriding `[api] base_url`.
pub const ENV_API_URL: &str = "CAMPUS_API_URL";
/// Environment variable overriding `[session] state_dir`.
pub const ENV_STATE_DIR: &str = "CAMPUS_STATE_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampusConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout, e.g. "30s".
    pub request_timeout: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long fetched data is served without a network call.
    pub stale_time: String,
    /// How long an unobserved entry is retained.
    pub cache_time: String,
    /// Automatic retries for failed reads.
    pub retry: u32,
    /// How often the garbage collector sweeps idle entries.
    pub gc_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding `session.json`.
    pub state_dir: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            request_timeout: "30s".to_string(),
            user_agent: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: "30s".to_string(),
            cache_time: "5m".to_string(),
            retry: 3,
            gc_interval: "60s".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_dir: ".campus".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        parse_duration_or(&self.request_timeout, Duration::from_secs(30))
    }
}

impl CacheConfig {
    pub fn stale_time(&self) -> Duration {
        parse_duration_or(&self.stale_time, Duration::from_secs(30))
    }

    pub fn cache_time(&self) -> Duration {
        parse_duration_or(&self.cache_time, Duration::from_secs(300))
    }

    pub fn gc_interval(&self) -> Duration {
        parse_duration_or(&self.gc_interval, Duration::from_secs(60))
    }
}

impl SessionConfig {
    pub fn state_dir(&self) -> PathBuf {
        PathBuf::from(&self.state_dir)
    }
}

impl CampusConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CampusConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Read `path` if it exists (defaults otherwise), then apply
    /// environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(dir) = lookup(ENV_STATE_DIR).filter(|v| !v.trim().is_empty()) {
            self.session.state_dir = dir.trim().to_string();
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a campus.toml pointing at the given backend.
    pub fn scaffold(base_url: &str) -> Self {
        CampusConfig {
            api: ApiConfig {
                base_url: base_url.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold() {
        let config = CampusConfig::scaffold("http://school.local/api");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("http://school.local/api"));
        assert!(toml_str.contains("stale_time"));
    }

    #[test]
    fn test_parse_partial() {
        let toml_str = r#"
[api]
base_url = "http://10.0.0.5:8080"
request_timeout = "10s"

[cache]
stale_time = "1m"
cache_time = "10m"
retry = 0
gc_interval = "30s"
"#;
        let config: CampusConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api.base_url, "http://10.0.0.5:8080");
        assert_eq!(config.api.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.cache.stale_time(), Duration::from_secs(60));
        assert_eq!(config.cache.retry, 0);
        // Missing section falls back to defaults.
        assert_eq!(config.session.state_dir, ".campus");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CampusConfig::default();
        config.apply_overrides(|key| match key {
            ENV_API_URL => Some("https://backend.example/api".to_string()),
            ENV_STATE_DIR => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.api.base_url, "https://backend.example/api");
        assert_eq!(config.session.state_dir, ".campus");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CampusConfig::load(&dir.path().join("campus.toml")).unwrap();
        assert_eq!(config.cache.cache_time(), Duration::from_secs(300));
    }

    #[test]
    fn test_malformed_durations_fall_back() {
        let mut config = CampusConfig::default();
        config.api.request_timeout = "forever".to_string();
        assert_eq!(config.api.request_timeout(), Duration::from_secs(30));
    }
}
