//! The seam between the token lifecycle and the identity provider

use async_trait::async_trait;
use logto_core::{
    claims::Jwks,
    oidc::{self, OidcConfig},
    token::{self, ClientCredentialsGrant, RefreshTokenGrant, TokenRequestError, TokenResponse},
    user::{self, CustomData, UserInfo, UserRequestError},
    BearerTokenRef,
};
use reqwest::Client;

/// The calls the client makes against the identity provider
///
/// [`HttpProvider`] is the implementation used in practice. Other implementations can
/// stand in for the provider in tests.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Fetches the OIDC discovery document
    async fn fetch_oidc_config(&self) -> Result<OidcConfig, reqwest::Error>;

    /// Fetches the provider's JSON Web Key Set
    async fn fetch_jwks(&self, jwks_uri: &str) -> Result<Jwks, reqwest::Error>;

    /// Exchanges a refresh token at the token endpoint
    async fn fetch_token_by_refresh_token(
        &self,
        token_endpoint: &str,
        grant: &RefreshTokenGrant,
    ) -> Result<TokenResponse, TokenRequestError>;

    /// Obtains a token using the client credentials grant
    async fn fetch_token_by_client_credentials(
        &self,
        token_endpoint: &str,
        grant: &ClientCredentialsGrant,
    ) -> Result<TokenResponse, TokenRequestError>;

    /// Fetches the claims of the user that `access_token` was issued to
    async fn fetch_user_info(
        &self,
        userinfo_endpoint: &str,
        access_token: &BearerTokenRef,
    ) -> Result<UserInfo, UserRequestError>;

    /// Replaces a user's custom data
    async fn update_user_custom_data(
        &self,
        user_id: &str,
        access_token: &BearerTokenRef,
        custom_data: &CustomData,
    ) -> Result<(), UserRequestError>;

    /// Sets a user's password
    async fn update_user_password(
        &self,
        user_id: &str,
        access_token: &BearerTokenRef,
        new_password: &str,
    ) -> Result<(), UserRequestError>;
}

/// A provider reached over HTTP
#[derive(Clone, Debug)]
pub struct HttpProvider {
    client: Client,
    endpoint: String,
}

impl HttpProvider {
    /// Constructs a provider for the Logto tenant at `endpoint`
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// The Logto endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn fetch_oidc_config(&self) -> Result<OidcConfig, reqwest::Error> {
        oidc::fetch_oidc_config(&self.client, &self.endpoint).await
    }

    #[tracing::instrument(err, skip(self))]
    async fn fetch_jwks(&self, jwks_uri: &str) -> Result<Jwks, reqwest::Error> {
        let response = self.client.get(jwks_uri).send().await?;
        response.error_for_status_ref()?;
        let jwks = response.json::<Jwks>().await?;
        tracing::debug!("fetched JWKS");
        Ok(jwks)
    }

    async fn fetch_token_by_refresh_token(
        &self,
        token_endpoint: &str,
        grant: &RefreshTokenGrant,
    ) -> Result<TokenResponse, TokenRequestError> {
        token::fetch_token_by_refresh_token(&self.client, token_endpoint, grant).await
    }

    async fn fetch_token_by_client_credentials(
        &self,
        token_endpoint: &str,
        grant: &ClientCredentialsGrant,
    ) -> Result<TokenResponse, TokenRequestError> {
        token::fetch_token_by_client_credentials(&self.client, token_endpoint, grant).await
    }

    async fn fetch_user_info(
        &self,
        userinfo_endpoint: &str,
        access_token: &BearerTokenRef,
    ) -> Result<UserInfo, UserRequestError> {
        user::fetch_user_info(&self.client, userinfo_endpoint, access_token).await
    }

    async fn update_user_custom_data(
        &self,
        user_id: &str,
        access_token: &BearerTokenRef,
        custom_data: &CustomData,
    ) -> Result<(), UserRequestError> {
        let endpoint = user::user_endpoint(&self.endpoint, user_id)?;
        user::update_user_custom_data(&self.client, endpoint.as_str(), access_token, custom_data)
            .await
    }

    async fn update_user_password(
        &self,
        user_id: &str,
        access_token: &BearerTokenRef,
        new_password: &str,
    ) -> Result<(), UserRequestError> {
        let endpoint = user::user_password_endpoint(&self.endpoint, user_id)?;
        user::update_user_password(&self.client, endpoint.as_str(), access_token, new_password)
            .await
    }
}
