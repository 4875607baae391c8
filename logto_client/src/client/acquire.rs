use std::sync::Arc;

use aliri_clock::Clock;
use logto_core::{
    oidc::OidcConfig,
    token::{ClientCredentialsGrant, RefreshTokenGrant, TokenRequestError, TokenResponse},
    OrganizationIdRef, RefreshToken, ResourceRef, ORGANIZATIONS_SCOPE,
};

use super::LogtoClient;
use crate::{
    provider::Provider,
    storage::{self, StorageKey},
    AccessToken, AccessTokenKey, Error,
};

impl<P, C> LogtoClient<P, C>
where
    P: Provider,
    C: Clock + Send + Sync,
{
    /// Obtains an access token for the signed-in user
    ///
    /// With a `resource` of `None`, the token is issued for the provider's default
    /// resource. Otherwise, `resource` must be one of the declared resources.
    ///
    /// A cached token is returned without contacting the provider while it is still
    /// valid. Otherwise, the stored refresh token is exchanged for a new one.
    #[tracing::instrument(err, skip(self))]
    pub async fn get_access_token(
        &self,
        resource: Option<&ResourceRef>,
    ) -> Result<AccessToken, Error> {
        self.require_session().await?;

        let resource = resource.filter(|r| !r.as_str().is_empty());
        if let Some(resource) = resource {
            if !self.config.has_resource(resource) {
                return Err(Error::UnacknowledgedResourceFound(resource.to_owned()));
            }
        }

        self.acquire_user_token(AccessTokenKey::for_resource(resource))
            .await
    }

    /// Obtains an access token for the signed-in user, scoped to an organization
    ///
    /// The organizations scope must have been declared.
    #[tracing::instrument(err, skip(self))]
    pub async fn get_organization_token(
        &self,
        organization_id: &OrganizationIdRef,
    ) -> Result<AccessToken, Error> {
        if !self.config.has_scope(ORGANIZATIONS_SCOPE) {
            return Err(Error::MissingScopeOrganizations);
        }

        self.require_session().await?;

        self.acquire_user_token(AccessTokenKey::for_organization(organization_id))
            .await
    }

    /// Obtains an access token for `resource` on behalf of the application itself,
    /// using the client credentials grant
    ///
    /// No session is required.
    #[tracing::instrument(err, skip(self))]
    pub async fn get_machine_access_token(
        &self,
        resource: &ResourceRef,
    ) -> Result<AccessToken, Error> {
        let key = AccessTokenKey::for_machine(resource);

        if let Some(token) = self.cached_token(&key).await {
            tracing::trace!(%key, "using cached access token");
            return Ok(token);
        }

        let _flight = self.flights.acquire(&key).await;

        if let Some(token) = self.cached_token(&key).await {
            tracing::trace!(%key, "access token acquired by concurrent request");
            return Ok(token);
        }

        let oidc = self.resolve_oidc_config().await?;

        let grant = ClientCredentialsGrant {
            client_id: self.config.app_id().to_owned(),
            client_secret: self.config.app_secret().map(ToOwned::to_owned),
            resource: resource.to_owned(),
            scopes: Vec::new(),
        };

        tracing::debug!(%key, "requesting machine access token");

        let response = self
            .provider
            .fetch_token_by_client_credentials(&oidc.token_endpoint, &grant)
            .await;
        let response = self.after_exchange(response).await?;

        self.accept_response(response, key, &oidc).await
    }

    async fn acquire_user_token(&self, key: AccessTokenKey) -> Result<AccessToken, Error> {
        if let Some(token) = self.cached_token(&key).await {
            tracing::trace!(%key, "using cached access token");
            return Ok(token);
        }

        let _flight = self.flights.acquire(&key).await;

        if let Some(token) = self.cached_token(&key).await {
            tracing::trace!(%key, "access token acquired by concurrent request");
            return Ok(token);
        }

        // Exchanges for other keys rotate the same refresh token.
        let _session = self.session.lock().await;

        let refresh_token = storage::get_non_empty(&*self.storage, StorageKey::RefreshToken)
            .await
            .map_err(Error::Storage)?
            .ok_or(Error::NotAuthenticated)?;

        let oidc = self.resolve_oidc_config().await?;

        let grant = RefreshTokenGrant {
            client_id: self.config.app_id().to_owned(),
            client_secret: self.config.app_secret().map(ToOwned::to_owned),
            refresh_token: RefreshToken::new(refresh_token),
            resource: key.resource().map(ToOwned::to_owned),
            scopes: key.scopes().cloned().collect(),
            organization_id: key.organization_id().map(ToOwned::to_owned),
        };

        tracing::debug!(%key, "refreshing access token");

        let response = self
            .provider
            .fetch_token_by_refresh_token(&oidc.token_endpoint, &grant)
            .await;
        let response = self.after_exchange(response).await?;

        self.accept_response(response, key, &oidc).await
    }

    async fn after_exchange(
        &self,
        response: Result<TokenResponse, TokenRequestError>,
    ) -> Result<TokenResponse, Error> {
        match response {
            Ok(response) => Ok(response),
            Err(error) => {
                // The token endpoint may have moved; rediscover on the next exchange.
                self.oidc.invalidate().await;
                Err(Error::ExchangeFailed(error.into()))
            }
        }
    }

    async fn accept_response(
        &self,
        response: TokenResponse,
        key: AccessTokenKey,
        oidc: &OidcConfig,
    ) -> Result<AccessToken, Error> {
        let token = AccessToken::from_response(&response, self.clock.now());

        self.verify_and_save(
            response.id_token,
            response.refresh_token,
            key,
            token.clone(),
            oidc,
        )
        .await?;

        Ok(token)
    }

    async fn cached_token(&self, key: &AccessTokenKey) -> Option<AccessToken> {
        self.cache
            .read()
            .await
            .get_fresh(key, self.clock.now(), self.config.minimum_validity())
            .cloned()
    }

    pub(super) async fn resolve_oidc_config(&self) -> Result<Arc<OidcConfig>, Error> {
        self.oidc
            .resolve(&self.provider, &self.clock)
            .await
            .map_err(|e| Error::ConfigResolutionFailed(e.into()))
    }
}
