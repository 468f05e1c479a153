//! Persisted authentication state.
//!
//! The auth blob lives in `<state_dir>/session.json` and is rehydrated
//! when the store is opened. Every change is written through to disk and
//! announced on a broadcast channel so long-lived consumers (the sync
//! coordinator, a UI shell) can react to sign-out or expiry.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// File name of the persisted session inside the state directory.
pub const SESSION_FILE: &str = "session.json";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The persisted auth blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    #[serde(default)]
    pub user: Option<Value>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub is_authenticated: bool,
}

impl AuthSession {
    pub fn signed_in(token: &str, user: Option<Value>, role: Option<String>) -> Self {
        Self {
            user,
            token: Some(token.to_string()),
            role,
            permissions: Vec::new(),
            is_authenticated: true,
        }
    }

    /// Best-effort user id (`user.id` or `user.idUsuario`) as a string.
    pub fn user_id(&self) -> Option<String> {
        let user = self.user.as_ref()?;
        ["id", "idUsuario", "userId"]
            .iter()
            .find_map(|field| match user.get(field)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    /// The backend answered 401; the session was cleared.
    Expired,
}

/// Thread-safe handle to the persisted session.
#[derive(Clone)]
pub struct SessionStore {
    path: Option<PathBuf>,
    current: Arc<RwLock<AuthSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Open the store in `state_dir`, rehydrating any saved session.
    ///
    /// A corrupt file is ignored (logged) and replaced on the next save.
    pub fn open(state_dir: &Path) -> Result<Self, SessionError> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join(SESSION_FILE);
        let session = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<AuthSession>(&content) {
                Ok(session) => session,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
                    AuthSession::default()
                }
            }
        } else {
            AuthSession::default()
        };
        debug!(
            path = %path.display(),
            authenticated = session.is_authenticated,
            "session rehydrated"
        );
        Ok(Self::with_session(Some(path), session))
    }

    /// Non-persistent store (for testing).
    pub fn in_memory() -> Self {
        Self::with_session(None, AuthSession::default())
    }

    fn with_session(path: Option<PathBuf>, session: AuthSession) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            path,
            current: Arc::new(RwLock::new(session)),
            events,
        }
    }

    pub fn current(&self) -> AuthSession {
        self.current.read().expect("session lock").clone()
    }

    /// The bearer token, if signed in.
    pub fn token(&self) -> Option<String> {
        let session = self.current.read().expect("session lock");
        if session.is_authenticated {
            session.token.clone()
        } else {
            None
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Replace the session and persist it.
    pub fn save(&self, session: AuthSession) -> Result<(), SessionError> {
        self.persist(&session)?;
        *self.current.write().expect("session lock") = session;
        info!("session saved");
        let _ = self.events.send(SessionEvent::SignedIn);
        Ok(())
    }

    /// Sign out explicitly.
    pub fn clear(&self) -> Result<(), SessionError> {
        self.reset()?;
        info!("session cleared");
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }

    /// Tear the session down after the backend rejected the token.
    pub fn expire(&self) {
        if let Err(e) = self.reset() {
            warn!(error = %e, "failed to remove expired session file");
        }
        warn!("session expired");
        let _ = self.events.send(SessionEvent::Expired);
    }

    fn reset(&self) -> Result<(), SessionError> {
        *self.current.write().expect("session lock") = AuthSession::default();
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn persist(&self, session: &AuthSession) -> Result<(), SessionError> {
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(session)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }
}
