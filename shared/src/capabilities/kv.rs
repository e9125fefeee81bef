//! Thin checks in front of `crux_kv`: keys and values are validated before a
//! request reaches the shell, and shell errors are folded into [`KvError`] so
//! events stay serializable with our own types.

use crux_kv::error::KeyValueError;
use crux_kv::KeyValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// A storage key as the shell sees it, e.g. `clt_data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KvKey(String);

impl KvKey {
    pub fn new(key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        if key.trim().is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey {
                key: key.chars().take(50).collect::<String>() + "...",
                reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} bytes"),
            });
        }

        if key.chars().any(char::is_control) {
            return Err(KvError::InvalidKey {
                key: key.escape_default().to_string(),
                reason: "key contains control characters".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl From<KeyValueError> for KvError {
    fn from(error: KeyValueError) -> Self {
        Self::Storage {
            message: format!("{error:?}"),
        }
    }
}

pub type KvResult = Result<Option<Vec<u8>>, KvError>;

pub fn check_value(value: &[u8]) -> Result<(), KvError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(KvError::ValueTooLarge {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// Reads `key`; the answer comes back through `make_event`.
pub fn read<Ev, F>(kv: &KeyValue<Ev>, key: &str, make_event: F) -> Result<(), KvError>
where
    Ev: Send + 'static,
    F: FnOnce(KvResult) -> Ev + Send + Sync + 'static,
{
    let key = KvKey::new(key)?;
    kv.get(key.into_inner(), move |result| {
        make_event(result.map_err(KvError::from))
    });
    Ok(())
}

/// Writes `value` under `key`. The callback gets the previous value, if any.
pub fn write<Ev, F>(
    kv: &KeyValue<Ev>,
    key: &str,
    value: Vec<u8>,
    make_event: F,
) -> Result<(), KvError>
where
    Ev: Send + 'static,
    F: FnOnce(KvResult) -> Ev + Send + Sync + 'static,
{
    let key = KvKey::new(key)?;
    check_value(&value)?;
    kv.set(key.into_inner(), value, move |result| {
        make_event(result.map_err(KvError::from))
    });
    Ok(())
}
