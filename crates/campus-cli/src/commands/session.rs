use std::path::Path;

use anyhow::bail;
use serde_json::Value;

use campus_client::AuthSession;
use campus_core::CampusConfig;

use super::{load_config, open_session};

pub fn init(path: &Path, base_url: &str, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = CampusConfig::scaffold(base_url);
    std::fs::write(path, config.to_toml_string()?)?;
    println!("✓ Generated {}", path.display());
    Ok(())
}

pub fn login(
    config_path: &Path,
    token: &str,
    user: Option<&str>,
    role: Option<String>,
) -> anyhow::Result<()> {
    if token.trim().is_empty() {
        bail!("token must not be empty");
    }
    let config = load_config(config_path)?;
    let store = open_session(&config)?;
    store.save(AuthSession::signed_in(token.trim(), user.map(parse_user), role))?;
    println!("✓ Logged in ({})", config.api.base_url);
    Ok(())
}

pub fn logout(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    open_session(&config)?.clear()?;
    println!("✓ Logged out");
    Ok(())
}

/// A JSON object is taken as-is; anything else is a bare user id.
fn parse_user(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(user @ Value::Object(_)) => user,
        _ => serde_json::json!({ "id": raw.trim() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_argument_forms() {
        assert_eq!(parse_user("42"), json!({"id": "42"}));
        assert_eq!(
            parse_user(r#"{"idUsuario": 7, "nombre": "Ana"}"#),
            json!({"idUsuario": 7, "nombre": "Ana"})
        );
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campus.toml");

        init(&path, "http://school.test/api", false).unwrap();
        let written = CampusConfig::from_file(&path).unwrap();
        assert_eq!(written.api.base_url, "http://school.test/api");

        assert!(init(&path, "http://other.test", false).is_err());
        init(&path, "http://other.test", true).unwrap();
        assert_eq!(
            CampusConfig::from_file(&path).unwrap().api.base_url,
            "http://other.test"
        );
    }
}
