pub mod browse;
pub mod enroll;
pub mod session;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, bail};
use serde_json::Value;

use campus_client::{ApiClient, SessionStore, StorageClient};
use campus_core::CampusConfig;
use campus_sync::SyncCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Text,
    Json,
}

impl Output {
    pub fn parse(format: &str) -> anyhow::Result<Self> {
        match format {
            "text" => Ok(Output::Text),
            "json" => Ok(Output::Json),
            other => bail!("unknown output format '{other}' (expected text or json)"),
        }
    }

    pub fn print(&self, value: &Value) -> anyhow::Result<()> {
        match self {
            Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
            Output::Text => match value {
                Value::Array(items) => {
                    for item in items {
                        println!("{item}");
                    }
                    println!("({} items)", items.len());
                }
                other => println!("{other}"),
            },
        }
        Ok(())
    }
}

/// Everything a networked command needs, built from campus.toml.
pub struct Context {
    pub config: CampusConfig,
    pub session: SessionStore,
    pub api: Arc<ApiClient>,
    pub storage: Arc<StorageClient>,
    pub sync: SyncCoordinator,
}

impl Context {
    pub fn open(config_path: &Path) -> anyhow::Result<Self> {
        let config = load_config(config_path)?;
        let session = open_session(&config)?;
        let api = ApiClient::new(&config.api, session.clone());
        let storage = Arc::new(StorageClient::new(api.clone()));
        let sync = SyncCoordinator::from_config(&config.cache);
        sync.watch_session(session.subscribe());
        Ok(Self {
            config,
            session,
            api: Arc::new(api),
            storage,
            sync,
        })
    }

    /// Logged-in user id, for storage uploads.
    pub fn user_id(&self) -> Option<String> {
        self.session.current().user_id()
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<CampusConfig> {
    CampusConfig::load(path).with_context(|| format!("reading {}", path.display()))
}

pub fn open_session(config: &CampusConfig) -> anyhow::Result<SessionStore> {
    let dir = config.session.state_dir();
    SessionStore::open(&dir).with_context(|| format!("opening session in {}", dir.display()))
}

/// Split `key=value` filter arguments.
pub fn parse_filters(filters: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    filters
        .iter()
        .map(|raw| match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => bail!("invalid filter '{raw}' (expected key=value)"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_parse() {
        let parsed = parse_filters(&["grado=3A".into(), " turno = tarde ".into()]).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("grado".to_string(), "3A".to_string()),
                ("turno".to_string(), "tarde".to_string())
            ]
        );
        assert!(parse_filters(&["grado".into()]).is_err());
        assert!(parse_filters(&["=3A".into()]).is_err());
    }

    #[test]
    fn output_formats() {
        assert_eq!(Output::parse("json").unwrap(), Output::Json);
        assert!(Output::parse("yaml").is_err());
    }
}
