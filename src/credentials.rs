//! The API credential side-channel.
//!
//! The host decides where the key comes from. The workflow only asks whether
//! one is selected, asks the host to let the user pick one, and fetches the
//! current key right before each remote call so a newly selected key takes
//! effect immediately.

use log::info;
use std::sync::RwLock;

use crate::config::RemoteConfig;

pub trait CredentialStore: Send + Sync {
    fn api_key(&self) -> Option<String>;

    fn has_selected_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Lets the user choose a key. Callers treat a return as success, so an
    /// implementation should only return once a key is in place.
    fn open_selector(&self) {}
}

/// Reads the key from an environment variable, with the config file's key
/// as a fallback. A key set through [`EnvCredentials::select`] wins over both.
pub struct EnvCredentials {
    env_var: String,
    configured: Option<String>,
    selected: RwLock<Option<String>>,
}

impl EnvCredentials {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            env_var: config.api_key_env.clone(),
            configured: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            selected: RwLock::new(None),
        }
    }

    pub fn select(&self, key: impl Into<String>) {
        let key = key.into();
        let mut selected = self.selected.write().unwrap_or_else(|e| e.into_inner());
        *selected = Some(key).filter(|k| !k.trim().is_empty());
    }
}

impl CredentialStore for EnvCredentials {
    fn api_key(&self) -> Option<String> {
        let selected = self.selected.read().unwrap_or_else(|e| e.into_inner());
        if let Some(key) = selected.as_ref() {
            return Some(key.clone());
        }
        std::env::var(&self.env_var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.configured.clone())
    }

    /// Only points the user at the environment variable. Hosts with a real
    /// key picker call [`EnvCredentials::select`] with the chosen key.
    fn open_selector(&self) {
        info!("Set {} or select a key to connect the rendering service", self.env_var);
    }
}
