use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::PharmError;

pub const DEFAULT_TOKEN_FILE: &str = "~/.config/pharmtv/token";

/// Credentials of a logged in admin.
///
/// Only a successful login creates one; logout or any 401 answer drops it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    token: String,
    #[serde(default)]
    username: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>, username: Option<String>) -> Self {
        Session {
            token: token.into(),
            username,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

/// Keeps the session token between runs.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// `path` may use `~` and environment variables.
    pub fn new(path: &str) -> Result<Self, PharmError> {
        let expanded = shellexpand::full(path)
            .map_err(|e| PharmError::Config(format!("token file {path}: {e}")))?;
        Ok(TokenStore {
            path: PathBuf::from(expanded.as_ref()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Session>, PharmError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Session>(&content) {
                Ok(session) => {
                    debug!("Loaded session from {:?}", self.path);
                    Ok(Some(session))
                }
                Err(e) => {
                    info!("Ignoring unreadable token file {:?}: {e}", self.path);
                    Ok(None)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), PharmError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(session)
            .map_err(|e| PharmError::Config(format!("cannot encode session: {e}")))?;
        fs::write(&self.path, content)?;
        debug!("Stored session in {:?}", self.path);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), PharmError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/token");
        let store = TokenStore::new(path.to_str().unwrap()).unwrap();

        assert_eq!(store.load().unwrap(), None);

        let session = Session::new("abc.def", Some("admin".into()));
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn garbage_token_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        fs::write(&path, "not json").unwrap();
        let store = TokenStore::new(path.to_str().unwrap()).unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
