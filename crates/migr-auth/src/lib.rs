use migr_core::error::MigrError;

/// Keychain key of the platform API token.
pub const PLATFORM_TOKEN_KEY: &str = "migr:platform";

/// Environment variable overriding the platform API token.
pub const PLATFORM_TOKEN_ENV: &str = "MIGR_TOKEN";

/// Trait for credential storage backends.
pub trait CredentialStore: Send + Sync {
    /// Store a token under the given key.
    fn store(&self, key: &str, token: &str) -> Result<(), MigrError>;

    /// Retrieve a token by key.
    fn get(&self, key: &str) -> Result<Option<String>, MigrError>;

    /// Delete a stored token.
    fn delete(&self, key: &str) -> Result<(), MigrError>;
}

/// OS keychain-backed credential store using the `keyring` crate.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: "migr".to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, MigrError> {
        keyring::Entry::new(&self.service, key).map_err(|e| MigrError::CredentialError {
            message: e.to_string(),
        })
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn store(&self, key: &str, token: &str) -> Result<(), MigrError> {
        self.entry(key)?
            .set_password(token)
            .map_err(|e| MigrError::CredentialError {
                message: e.to_string(),
            })
    }

    fn get(&self, key: &str) -> Result<Option<String>, MigrError> {
        match self.entry(key)?.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(MigrError::CredentialError {
                message: e.to_string(),
            }),
        }
    }

    fn delete(&self, key: &str) -> Result<(), MigrError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(MigrError::CredentialError {
                message: e.to_string(),
            }),
        }
    }
}

/// In-memory credential store for testing.
pub struct MemoryStore {
    store: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            store: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, std::collections::HashMap<String, String>>, MigrError>
    {
        self.store.lock().map_err(|_| MigrError::CredentialError {
            message: "memory store poisoned".to_string(),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for MemoryStore {
    fn store(&self, key: &str, token: &str) -> Result<(), MigrError> {
        self.lock()?.insert(key.to_string(), token.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, MigrError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), MigrError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Resolve a token: a non-empty environment variable wins over the store.
pub fn resolve_token<F>(
    store: &dyn CredentialStore,
    key: &str,
    env_var: &str,
    lookup: F,
) -> Result<Option<String>, MigrError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup(env_var).filter(|t| !t.trim().is_empty()) {
        tracing::debug!(env_var, "using token from environment");
        return Ok(Some(token.trim().to_string()));
    }
    store.get(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_crud() {
        let store = MemoryStore::new();
        assert_eq!(store.get("test-key").unwrap(), None);
        store.store("test-key", "secret-token").unwrap();
        assert_eq!(store.get("test-key").unwrap(), Some("secret-token".to_string()));
        store.delete("test-key").unwrap();
        assert_eq!(store.get("test-key").unwrap(), None);
    }

    #[test]
    fn test_memory_store_delete_nonexistent() {
        let store = MemoryStore::new();
        store.delete("no-such-key").unwrap();
    }

    #[test]
    fn test_env_token_wins_over_store() {
        let store = MemoryStore::new();
        store.store(PLATFORM_TOKEN_KEY, "from-keychain").unwrap();

        let token = resolve_token(&store, PLATFORM_TOKEN_KEY, PLATFORM_TOKEN_ENV, |_| {
            Some(" from-env ".to_string())
        })
        .unwrap();
        assert_eq!(token.as_deref(), Some("from-env"));

        let token = resolve_token(&store, PLATFORM_TOKEN_KEY, PLATFORM_TOKEN_ENV, |_| {
            Some(String::new())
        })
        .unwrap();
        assert_eq!(token.as_deref(), Some("from-keychain"));
    }
}
