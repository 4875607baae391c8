//! Wire-level building blocks for talking to a Logto identity provider
//!
//! This crate holds the request/response glue used by [`logto_client`][client]: the
//! discovery document fetch, the token endpoint exchanges for the _refresh token_ and
//! _client credentials_ grants, the user info and user management calls, and the
//! decoding of the claims carried by ID tokens and organization access tokens.
//!
//! Nothing in here holds state across calls. Caching, refresh decisions, and persistence
//! are the concern of the client crate.
//!
//! # Claims decoding
//!
//! Two decoding paths are offered:
//!
//! * [`claims::decode_unverified`] parses the token structurally and deserializes the
//!   payload. It performs **no** signature check and is only appropriate when the token
//!   was obtained directly from the token endpoint.
//! * [`claims::JwksVerifier`] verifies the signature against the provider's JSON Web Key
//!   Set and validates the issuer, audience, and expiry before handing back the claims.
//!   Use it whenever the claims feed an authorization decision.
//!
//! [client]: https://docs.rs/logto_client
//!
//! # Features
//!
//! * `rsa` (default): verification of RSA-signed tokens
//! * `ec`: verification of elliptic-curve-signed tokens (requires OpenSSL)
//! * `hmac`: verification of HMAC-signed tokens
//! * `rustls-tls` (default) / `default-tls`: TLS backend used by `reqwest`

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

mod braids;
pub mod claims;
pub mod oidc;
pub mod token;
pub mod user;

pub use braids::*;

/// The scope that must be requested before organization tokens can be issued
pub const ORGANIZATIONS_SCOPE: &str = "urn:logto:scope:organizations";

/// The resource that organization tokens are granted for
pub const ORGANIZATIONS_RESOURCE: &str = "urn:logto:resource:organizations";

/// Scopes that are always requested by a Logto client
pub const RESERVED_SCOPES: [&str; 3] = ["openid", "offline_access", "profile"];
