//! Durable storage of session state

use std::fmt;

use async_trait::async_trait;

use crate::BoxError;

#[cfg(feature = "file")]
pub mod file;
pub mod memory;

#[cfg(feature = "file")]
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// The entries kept in [`Storage`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// The current refresh token
    RefreshToken,
    /// The current ID token
    IdToken,
    /// The serialized access token cache
    AccessTokenMap,
}

impl StorageKey {
    /// The string form of the key
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RefreshToken => "logto_refresh_token",
            Self::IdToken => "logto_id_token",
            Self::AccessTokenMap => "logto_access_token_map",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string-keyed store for session state
///
/// Implementations need not support deletion. An empty value is treated the same as an
/// absent one.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reads an entry
    async fn get_item(&self, key: StorageKey) -> Result<Option<String>, BoxError>;

    /// Writes an entry, replacing any previous value
    async fn set_item(&self, key: StorageKey, value: &str) -> Result<(), BoxError>;
}

/// Reads an entry, folding empty values into `None`
pub(crate) async fn get_non_empty(
    storage: &dyn Storage,
    key: StorageKey,
) -> Result<Option<String>, BoxError> {
    Ok(storage.get_item(key).await?.filter(|v| !v.is_empty()))
}
