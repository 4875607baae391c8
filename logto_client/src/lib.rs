//! Token lifecycle management for Logto clients
//!
//! A [`LogtoClient`] obtains, caches, refreshes, and verifies access tokens and ID tokens
//! on behalf of an application acting either as a signed-in user or as a machine
//! principal using the _client credentials_ grant.
//!
//! Tokens are cached per [`AccessTokenKey`], which combines the requested scopes, the
//! API resource, and the organization. A single client can therefore hold tokens for
//! the default resource, for any number of declared API resources, and for every
//! organization the user belongs to, all valid at the same time. A cached token is
//! returned as-is while it is still valid; otherwise a fresh one is exchanged for at the
//! provider's token endpoint.
//!
//! The refresh token, the ID token, and the serialized token cache live in a pluggable
//! [`Storage`], so that a session survives process restarts. Storage is written before
//! the in-memory cache is updated, and concurrent requests for the same stale token are
//! collapsed into a single exchange, since rotating refresh tokens are typically only
//! good for one use.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use logto_client::{storage::MemoryStorage, LogtoClient, LogtoConfig};
//! use logto_core::{AppId, AppSecret, Resource};
//!
//! # async fn run() -> Result<(), logto_client::Error> {
//! let config = LogtoConfig::new("https://tenant.logto.app", AppId::from_static("app-id"))
//!     .with_app_secret(AppSecret::from_static("app-secret"))
//!     .with_resources(vec![Resource::from_static("https://api.example.com")]);
//!
//! let client = LogtoClient::new(config, Arc::new(MemoryStorage::new())).await?;
//!
//! let token = client
//!     .get_machine_access_token(&Resource::from_static("https://api.example.com"))
//!     .await?;
//!
//! tracing::info!(token = format_args!("{:#?}", token.token()), "machine access token");
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! * `file` (default): provides [`storage::FileStorage`], which keeps the session in a
//!   JSON document on the local filesystem.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod cache;
mod client;
mod config;
mod error;
mod flight;
pub mod oidc;
pub mod provider;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_util;

pub use cache::{AccessToken, AccessTokenKey, Principal, TokenCache};
pub use client::LogtoClient;
pub use config::{IdTokenVerification, LogtoConfig};
pub use error::{BoxError, Error};
pub use provider::{HttpProvider, Provider};
pub use storage::{Storage, StorageKey};
