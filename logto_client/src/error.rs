use std::error;

use logto_core::{claims::ClaimsError, user::UserRequestError, RefreshToken, Resource};
use thiserror::Error;

/// A boxed error as returned by pluggable collaborators
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// An error produced by the [`LogtoClient`][crate::LogtoClient]
#[derive(Debug, Error)]
pub enum Error {
    /// No session has been established, or the session has no refresh token
    #[error("not authenticated")]
    NotAuthenticated,

    /// The requested resource is not one of the resources declared in the configuration
    #[error("resource '{0}' has not been declared in the client configuration")]
    UnacknowledgedResourceFound(Resource),

    /// An organization token was requested without declaring the organizations scope
    #[error("the organizations scope has not been declared in the client configuration")]
    MissingScopeOrganizations,

    /// A machine token for the default management resource was requested, but no
    /// resource is declared
    #[error("no resource has been declared in the client configuration")]
    NoResourceDeclared,

    /// The provider's OIDC configuration or key set could not be obtained
    #[error("unable to resolve the provider's OIDC configuration")]
    ConfigResolutionFailed(#[source] BoxError),

    /// The provider rejected the token exchange, or the exchange could not be performed
    #[error("token exchange failed")]
    ExchangeFailed(#[source] BoxError),

    /// An ID token or organization token could not be decoded or verified
    #[error("unable to decode token claims")]
    ClaimsDecodeFailed(#[from] ClaimsError),

    /// Session state could not be read from storage
    #[error("unable to read session state from storage")]
    Storage(#[source] BoxError),

    /// The tokens returned by an exchange could not be persisted
    ///
    /// If the provider rotated the refresh token and the new refresh token could not be
    /// written, it is handed back in `rotated_refresh_token` so that the caller can
    /// store it through [`LogtoClient::set_refresh_token`][crate::LogtoClient::set_refresh_token]
    /// once storage is available again. The previous refresh token may already have
    /// been invalidated by the provider.
    #[error("unable to persist exchanged tokens")]
    PersistenceFailed {
        /// The storage error
        #[source]
        source: BoxError,
        /// The rotated refresh token that did not make it into storage
        rotated_refresh_token: Option<RefreshToken>,
    },

    /// A user info or user management request failed
    #[error(transparent)]
    UserRequest(#[from] UserRequestError),
}
