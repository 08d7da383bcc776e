//! User credential storage backed by a JSON file.
//!
//! A flat username-to-password map guarded by a mutex. Registration
//! persists the whole map; persistence failures are logged and the
//! in-memory registration still stands.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

/// Registration failure reasons.
#[derive(Debug, PartialEq, Eq)]
pub enum RegisterError {
    /// The username is already taken.
    UserExists,
    /// Username or password was empty.
    EmptyCredentials,
}

impl std::fmt::Display for RegisterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterError::UserExists => write!(f, "username already taken"),
            RegisterError::EmptyCredentials => write!(f, "username and password must not be empty"),
        }
    }
}

impl std::error::Error for RegisterError {}

/// Thread-safe credential store.
pub struct UserStore {
    users: Mutex<HashMap<String, String>>,
    /// Backing JSON file. `None` disables persistence.
    path: Option<PathBuf>,
}

impl UserStore {
    /// Create a store, loading any existing users from the backing file.
    pub fn new(path: Option<PathBuf>) -> Self {
        let users = match path.as_ref().map(std::fs::read_to_string) {
            Some(Ok(data)) => match serde_json::from_str::<HashMap<String, String>>(&data) {
                Ok(users) => users,
                Err(e) => {
                    warn!(error = %e, "Malformed user database, starting empty");
                    HashMap::new()
                }
            },
            _ => HashMap::new(),
        };

        if !users.is_empty() {
            info!(count = users.len(), "Loaded user database");
        }

        UserStore {
            users: Mutex::new(users),
            path,
        }
    }

    /// Check a username/password pair against the stored credentials.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let users = self.users.lock().expect("user lock poisoned");
        users.get(username).is_some_and(|stored| stored == password)
    }

    /// Register a new user and persist the database best-effort.
    pub fn register(&self, username: &str, password: &str) -> Result<(), RegisterError> {
        if username.is_empty() || password.is_empty() {
            return Err(RegisterError::EmptyCredentials);
        }

        let mut users = self.users.lock().expect("user lock poisoned");
        if users.contains_key(username) {
            return Err(RegisterError::UserExists);
        }
        users.insert(username.to_string(), password.to_string());

        if let Some(ref path) = self.path {
            let result = serde_json::to_string_pretty(&*users)
                .map_err(std::io::Error::other)
                .and_then(|data| std::fs::write(path, data));
            if let Err(e) = result {
                warn!(error = %e, path = %path.display(), "Failed to persist user database");
            }
        }

        info!(username, "User registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_authenticate() {
        let store = UserStore::new(None);
        store.register("alice", "secret").unwrap();

        assert!(store.authenticate("alice", "secret"));
        assert!(!store.authenticate("alice", "wrong"));
        assert!(!store.authenticate("nobody", "secret"));
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let store = UserStore::new(None);
        store.register("alice", "secret").unwrap();
        assert_eq!(
            store.register("alice", "other"),
            Err(RegisterError::UserExists)
        );
        // First password still valid.
        assert!(store.authenticate("alice", "secret"));
    }

    #[test]
    fn test_register_empty_credentials_rejected() {
        let store = UserStore::new(None);
        assert_eq!(
            store.register("", "pw"),
            Err(RegisterError::EmptyCredentials)
        );
        assert_eq!(
            store.register("user", ""),
            Err(RegisterError::EmptyCredentials)
        );
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        {
            let store = UserStore::new(Some(path.clone()));
            store.register("alice", "secret").unwrap();
        }

        let reloaded = UserStore::new(Some(path));
        assert!(reloaded.authenticate("alice", "secret"));
    }

    #[test]
    fn test_malformed_database_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = UserStore::new(Some(path));
        assert!(!store.authenticate("anyone", "anything"));
    }
}
