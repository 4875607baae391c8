use std::{error, fmt, sync::Arc};

use aliri_clock::{Clock, System};
use logto_core::{
    claims::{self, IdTokenClaims, JwksVerifier, OrganizationAccessTokenClaims},
    user::{CustomData, UserInfo},
    IdToken, IdTokenRef, OrganizationIdRef, RefreshToken, RefreshTokenRef, UserIdRef,
};
use reqwest::Client;
use tokio::sync::{Mutex, RwLock};

use crate::{
    flight::FlightGuards,
    oidc::OidcConfigResolver,
    provider::{HttpProvider, Provider},
    storage::{self, Storage, StorageKey},
    Error, LogtoConfig, TokenCache,
};

mod acquire;
mod persist;

/// A client that manages the tokens of a Logto session
///
/// The client can be shared between tasks behind an [`Arc`].
pub struct LogtoClient<P = HttpProvider, C = System> {
    config: LogtoConfig,
    provider: P,
    storage: Arc<dyn Storage>,
    cache: RwLock<TokenCache>,
    oidc: OidcConfigResolver,
    flights: FlightGuards,
    session: Mutex<()>,
    verifier: RwLock<Option<Arc<JwksVerifier>>>,
    clock: C,
}

impl<P: fmt::Debug, C: fmt::Debug> fmt::Debug for LogtoClient<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogtoClient")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .field("oidc", &self.oidc)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl LogtoClient {
    /// Constructs a client that talks to the Logto endpoint named in `config`
    ///
    /// Any access tokens persisted in `storage` by a previous client are loaded.
    pub async fn new(config: LogtoConfig, storage: Arc<dyn Storage>) -> Result<Self, Error> {
        let provider = HttpProvider::new(Client::new(), config.endpoint());
        Self::with_provider(config, provider, storage).await
    }
}

impl<P: Provider> LogtoClient<P> {
    /// Constructs a client that uses `provider` to reach the identity provider
    pub async fn with_provider(
        config: LogtoConfig,
        provider: P,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, Error> {
        let config = config.normalized();
        let cache = load_cache(&*storage).await?;

        tracing::debug!(
            endpoint = config.endpoint(),
            app_id = %config.app_id(),
            cached_tokens = cache.len(),
            "constructed Logto client"
        );

        Ok(Self {
            oidc: OidcConfigResolver::new(config.oidc_config_ttl()),
            config,
            provider,
            storage,
            cache: RwLock::new(cache),
            flights: FlightGuards::new(),
            session: Mutex::new(()),
            verifier: RwLock::new(None),
            clock: System,
        })
    }
}

async fn load_cache(storage: &dyn Storage) -> Result<TokenCache, Error> {
    let blob = storage::get_non_empty(storage, StorageKey::AccessTokenMap)
        .await
        .map_err(Error::Storage)?;

    let Some(blob) = blob else {
        return Ok(TokenCache::new());
    };

    match TokenCache::from_blob(&blob) {
        Ok(cache) => Ok(cache),
        Err(error) => {
            tracing::warn!(
                error = (&error as &dyn error::Error),
                "discarding unreadable access token cache"
            );
            Ok(TokenCache::new())
        }
    }
}

impl<P, C> LogtoClient<P, C> {
    /// Replaces the clock used to judge token expiry
    pub fn with_clock<C2: Clock>(self, clock: C2) -> LogtoClient<P, C2> {
        LogtoClient {
            config: self.config,
            provider: self.provider,
            storage: self.storage,
            cache: self.cache,
            oidc: self.oidc,
            flights: self.flights,
            session: self.session,
            verifier: self.verifier,
            clock,
        }
    }

    /// The normalized configuration of the client
    pub fn config(&self) -> &LogtoConfig {
        &self.config
    }

    /// Whether a session has been established, i.e. an ID token is stored
    pub async fn is_authenticated(&self) -> Result<bool, Error> {
        Ok(self.get_id_token().await?.is_some())
    }

    /// The stored refresh token
    pub async fn get_refresh_token(&self) -> Result<Option<RefreshToken>, Error> {
        let value = storage::get_non_empty(&*self.storage, StorageKey::RefreshToken)
            .await
            .map_err(Error::Storage)?;
        Ok(value.map(RefreshToken::new))
    }

    /// Replaces the stored refresh token
    pub async fn set_refresh_token(&self, refresh_token: &RefreshTokenRef) -> Result<(), Error> {
        self.storage
            .set_item(StorageKey::RefreshToken, refresh_token.as_str())
            .await
            .map_err(Error::Storage)
    }

    /// The stored ID token
    pub async fn get_id_token(&self) -> Result<Option<IdToken>, Error> {
        let value = storage::get_non_empty(&*self.storage, StorageKey::IdToken)
            .await
            .map_err(Error::Storage)?;
        Ok(value.map(IdToken::new))
    }

    /// Replaces the stored ID token
    pub async fn set_id_token(&self, id_token: &IdTokenRef) -> Result<(), Error> {
        self.storage
            .set_item(StorageKey::IdToken, id_token.as_str())
            .await
            .map_err(Error::Storage)
    }

    /// Forgets the stored refresh token and ID token
    ///
    /// Cached access tokens are kept, but can no longer be obtained through
    /// [`get_access_token`][Self::get_access_token] or
    /// [`get_organization_token`][Self::get_organization_token].
    pub async fn clear_session(&self) -> Result<(), Error> {
        let _session = self.session.lock().await;
        self.storage
            .set_item(StorageKey::RefreshToken, "")
            .await
            .map_err(Error::Storage)?;
        self.storage
            .set_item(StorageKey::IdToken, "")
            .await
            .map_err(Error::Storage)?;
        tracing::info!("cleared session");
        Ok(())
    }

    /// Decodes the claims of the stored ID token
    ///
    /// The signature is **not** verified here. ID tokens are checked as configured by
    /// [`IdTokenVerification`][crate::IdTokenVerification] when they are received.
    pub async fn get_id_token_claims(&self) -> Result<IdTokenClaims, Error> {
        let id_token = self.get_id_token().await?.ok_or(Error::NotAuthenticated)?;
        Ok(claims::decode_id_token(id_token.as_str())?)
    }

    pub(crate) async fn require_session(&self) -> Result<(), Error> {
        if self.is_authenticated().await? {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }
}

impl<P, C> LogtoClient<P, C>
where
    P: Provider,
    C: Clock + Send + Sync,
{
    /// Obtains a token for the organization and decodes its claims
    ///
    /// The claims are decoded **without** verifying the token's signature. The token
    /// comes straight from the provider's token endpoint, so the claims are suitable
    /// for display, but not for authorization decisions made on behalf of a third
    /// party.
    pub async fn get_organization_token_claims(
        &self,
        organization_id: &OrganizationIdRef,
    ) -> Result<OrganizationAccessTokenClaims, Error> {
        let token = self.get_organization_token(organization_id).await?;
        Ok(claims::decode_unverified(token.token().as_str())?)
    }

    /// Fetches the claims of the signed-in user from the userinfo endpoint
    pub async fn fetch_user_info(&self) -> Result<UserInfo, Error> {
        self.require_session().await?;
        let oidc = self.resolve_oidc_config().await?;
        let token = self.get_access_token(None).await?;
        Ok(self
            .provider
            .fetch_user_info(&oidc.userinfo_endpoint, token.token())
            .await?)
    }

    /// Replaces a user's custom data through the management API
    ///
    /// The call is authorized with a machine token for the first declared resource.
    #[tracing::instrument(err, skip(self, custom_data))]
    pub async fn update_user_custom_data(
        &self,
        user_id: &UserIdRef,
        custom_data: &CustomData,
    ) -> Result<(), Error> {
        let token = self.management_token().await?;
        Ok(self
            .provider
            .update_user_custom_data(user_id.as_str(), token.token(), custom_data)
            .await?)
    }

    /// Sets a user's password through the management API
    ///
    /// The call is authorized with a machine token for the first declared resource.
    #[tracing::instrument(err, skip(self, new_password))]
    pub async fn update_user_password(
        &self,
        user_id: &UserIdRef,
        new_password: &str,
    ) -> Result<(), Error> {
        let token = self.management_token().await?;
        Ok(self
            .provider
            .update_user_password(user_id.as_str(), token.token(), new_password)
            .await?)
    }

    async fn management_token(&self) -> Result<crate::AccessToken, Error> {
        let resource = self
            .config
            .resources()
            .first()
            .ok_or(Error::NoResourceDeclared)?;
        self.get_machine_access_token(resource).await
    }
}
