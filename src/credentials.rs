//! API key resolution.
//!
//! The key is looked up in the platform secret store first, then in the
//! `OPENAI_API_KEY` environment variable, then in the config file.

use crate::config::Config;
use crate::error::{HowtoError, Result};
use tracing::debug;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const SECRET_SERVICE: &str = "howto";
pub const SECRET_ACCOUNT: &str = "openai_api_key";

/// Supplies the secret used to authenticate completion requests.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> Result<String>;
}

/// Persistent storage for the API key.
pub trait SecretStore: Send + Sync {
    /// Returns `Ok(None)` when no key is stored.
    fn get(&self) -> Result<Option<String>>;

    fn set(&self, secret: &str) -> Result<()>;
}

/// Secret store backed by the OS keychain (Keychain, Credential Manager, kernel keyring).
pub struct KeyringSecretStore {
    service: String,
    account: String,
}

impl KeyringSecretStore {
    pub fn new() -> Self {
        Self {
            service: SECRET_SERVICE.to_string(),
            account: SECRET_ACCOUNT.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| HowtoError::Credential(format!("secret store unavailable: {}", e)))
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(HowtoError::Credential(format!("failed to read secret store: {}", e))),
        }
    }

    fn set(&self, secret: &str) -> Result<()> {
        self.entry()?
            .set_password(secret)
            .map_err(|e| HowtoError::Credential(format!("failed to write secret store: {}", e)))
    }
}

/// Resolves the key from the secret store, the environment, then the config file.
pub struct ConfigCredentialProvider {
    secrets: Box<dyn SecretStore>,
    env_key: Option<String>,
    config_key: Option<String>,
}

impl ConfigCredentialProvider {
    pub fn new(config: &Config) -> Self {
        Self::with_sources(
            Box::new(KeyringSecretStore::new()),
            std::env::var(API_KEY_ENV).ok(),
            config.openai_api_key.clone(),
        )
    }

    pub fn with_sources(
        secrets: Box<dyn SecretStore>,
        env_key: Option<String>,
        config_key: Option<String>,
    ) -> Self {
        Self {
            secrets,
            env_key,
            config_key,
        }
    }

    fn stored_key(&self) -> Option<String> {
        match self.secrets.get() {
            Ok(key) => key.filter(|k| !k.trim().is_empty()),
            // Secret stores are unreliable on headless Linux; fall through to the other sources.
            Err(e) => {
                debug!("Skipping secret store: {}", e);
                None
            }
        }
    }
}

impl CredentialProvider for ConfigCredentialProvider {
    fn api_key(&self) -> Result<String> {
        let key = if let Some(k) = self.stored_key() {
            debug!("Using API key from secret store");
            k
        } else {
            match (&self.env_key, &self.config_key) {
                (Some(k), _) if !k.trim().is_empty() => {
                    debug!("Using API key from {}", API_KEY_ENV);
                    k.clone()
                }
                (_, Some(k)) if !k.trim().is_empty() => {
                    debug!("Using API key from config file");
                    k.clone()
                }
                _ => {
                    return Err(HowtoError::Credential(format!(
                        "No OpenAI API key found. Please set it using one of these methods:

1. Store it in the system keychain:
   howto --setup

2. Set environment variable:
   export {}=sk-your-key-here

Get your API key from: https://platform.openai.com/account/api-keys",
                        API_KEY_ENV
                    )));
                }
            }
        };

        let key = key.trim().to_string();
        validate_api_key(&key)?;
        Ok(key)
    }
}

pub fn validate_api_key(key: &str) -> Result<()> {
    if key.starts_with("sk-") {
        Ok(())
    } else {
        Err(HowtoError::Credential(
            "OpenAI API key is invalid (it should start with `sk-`). Run `howto --setup` to set it."
                .to_string(),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemorySecretStore;
    use super::*;

    fn provider(secrets: MemorySecretStore, env: Option<&str>, config: Option<&str>) -> ConfigCredentialProvider {
        ConfigCredentialProvider::with_sources(
            Box::new(secrets),
            env.map(String::from),
            config.map(String::from),
        )
    }

    #[test]
    fn test_secret_store_wins_over_env_and_config() {
        let provider = provider(
            MemorySecretStore::with_secret("sk-from-keychain"),
            Some("sk-from-env"),
            Some("sk-from-config"),
        );
        assert_eq!(provider.api_key().unwrap(), "sk-from-keychain");
    }

    #[test]
    fn test_env_key_wins_over_config() {
        let provider = provider(MemorySecretStore::default(), Some("sk-from-env"), Some("sk-from-config"));
        assert_eq!(provider.api_key().unwrap(), "sk-from-env");
    }

    #[test]
    fn test_unavailable_secret_store_falls_back_to_env() {
        let provider = provider(MemorySecretStore::broken(), Some("sk-from-env"), None);
        assert_eq!(provider.api_key().unwrap(), "sk-from-env");
    }

    #[test]
    fn test_falls_back_to_config_key() {
        let provider = provider(MemorySecretStore::default(), Some("  "), Some("sk-cfg"));
        assert_eq!(provider.api_key().unwrap(), "sk-cfg");
    }

    #[test]
    fn test_missing_key_is_credential_error() {
        let err = provider(MemorySecretStore::default(), None, None).api_key().unwrap_err();
        assert!(matches!(err, HowtoError::Credential(_)));
        assert!(err.to_string().contains(API_KEY_ENV));
    }

    #[test]
    fn test_malformed_key_is_rejected() {
        let err = provider(MemorySecretStore::with_secret("abc"), None, None).api_key().unwrap_err();
        assert!(err.to_string().contains("invalid"));
    }

    #[test]
    fn test_memory_store_set_then_get() {
        let store = MemorySecretStore::default();
        assert_eq!(store.get().unwrap(), None);
        store.set("sk-new").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("sk-new"));
    }
}
