//! Stores the fanart.tv API key in the OS keyring and resolves the key a run uses.

use keyring::Entry;
use log::warn;

const SERVICE: &str = "fanart-sync.fanart";
const ACCOUNT: &str = "api_key";

/// Where the key used for a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySource {
    Config,
    Keyring,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedApiKey {
    pub key: String,
    pub source: ApiKeySource,
}

fn keyring_error(action: &'static str) -> impl FnOnce(keyring::Error) -> String {
    move |err| format!("failed to {action} fanart API key in keyring: {err}")
}

fn entry() -> Result<Entry, String> {
    Entry::new(SERVICE, ACCOUNT).map_err(keyring_error("open"))
}

/// Saves `api_key` after trimming it. Blank keys are rejected so `clear_api_key`
/// stays the only way to remove one.
pub fn store_api_key(api_key: &str) -> Result<(), String> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err("refusing to store an empty fanart API key; use --clear".to_string());
    }
    entry()?
        .set_password(api_key)
        .map_err(keyring_error("store"))
}

/// A missing entry counts as cleared.
pub fn clear_api_key() -> Result<(), String> {
    match entry()?.delete_password() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(err) => Err(keyring_error("delete")(err)),
    }
}

fn stored_api_key() -> Result<Option<String>, String> {
    match entry()?.get_password() {
        Ok(api_key) => Ok(Some(api_key.trim().to_string()).filter(|key| !key.is_empty())),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(keyring_error("read")(err)),
    }
}

/// A key set in the config file wins and the keyring is not touched.
/// Keyring failures are logged and treated as no key.
pub fn resolve_api_key(configured: &str) -> ResolvedApiKey {
    let configured = configured.trim();
    if !configured.is_empty() {
        return ResolvedApiKey {
            key: configured.to_string(),
            source: ApiKeySource::Config,
        };
    }
    let stored = stored_api_key().unwrap_or_else(|err| {
        warn!("{}", err);
        None
    });
    match stored {
        Some(key) => ResolvedApiKey {
            key,
            source: ApiKeySource::Keyring,
        },
        None => ResolvedApiKey {
            key: String::new(),
            source: ApiKeySource::Missing,
        },
    }
}
