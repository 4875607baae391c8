//! Exchanges against the Logto token endpoint

use reqwest::Client;
use thiserror::Error;

use crate::{AppIdRef, AppSecretRef, ResourceRef};

pub mod dto;

pub use dto::{ClientCredentialsGrant, RefreshTokenGrant, TokenResponse};

/// A grant that can be presented to the token endpoint
pub trait TokenGrant: serde::Serialize {
    /// The client ID of the client making the request
    fn client_id(&self) -> &AppIdRef;
    /// The client secret, used for HTTP Basic client authentication when present
    fn client_secret(&self) -> Option<&AppSecretRef>;
    /// The grant type or flow to be performed
    fn grant_type() -> &'static str;
    /// The optional resource of the request
    fn resource(&self) -> Option<&ResourceRef>;
}

/// An error while attempting to request a new token from the provider
#[derive(Debug, Error)]
pub enum TokenRequestError {
    /// An error from the provider with an error body
    #[error("error requesting token from provider: {body}")]
    ErrorWithBody {
        /// The underlying request error
        source: reqwest::Error,
        /// The body of the error
        body: String,
    },
    /// Unable to deserialize the token body
    #[error("error deserializing token body from provider")]
    TokenBodyError(#[from] serde_json::Error),
    /// Unable to read the response
    #[error("error reading response body")]
    BodyReadError(#[source] reqwest::Error),
    /// Unable to send a token request to the provider
    #[error("error sending request to provider")]
    RequestSend(#[source] reqwest::Error),
}

fn maybe_value<'a, T: tracing::Value + 'a>(v: &'a Option<T>) -> &'a dyn tracing::Value {
    if let Some(v) = v {
        v
    } else {
        &tracing::field::Empty
    }
}

/// Exchanges a refresh token for a new token set
pub async fn fetch_token_by_refresh_token(
    client: &Client,
    token_endpoint: &str,
    grant: &RefreshTokenGrant,
) -> Result<TokenResponse, TokenRequestError> {
    request_token(client, token_endpoint, grant).await
}

/// Obtains a machine-to-machine token using the client credentials grant
pub async fn fetch_token_by_client_credentials(
    client: &Client,
    token_endpoint: &str,
    grant: &ClientCredentialsGrant,
) -> Result<TokenResponse, TokenRequestError> {
    request_token(client, token_endpoint, grant).await
}

#[tracing::instrument(
    err,
    skip(client, grant),
    fields(
        token_endpoint = %token_endpoint,
        grant.grant_type = G::grant_type(),
        grant.client_id = %grant.client_id(),
        grant.resource = maybe_value(&grant.resource().map(|r| r.as_str())),
    ),
)]
async fn request_token<G: TokenGrant>(
    client: &Client,
    token_endpoint: &str,
    grant: &G,
) -> Result<TokenResponse, TokenRequestError> {
    tracing::trace!("requesting token from provider");

    let mut req = client.post(token_endpoint).form(grant);
    if let Some(secret) = grant.client_secret() {
        req = req.basic_auth(grant.client_id().as_str(), Some(secret.as_str()));
    }

    let resp = req.send().await.map_err(TokenRequestError::RequestSend)?;

    tracing::debug!(
        response.status = resp.status().as_u16(),
        "received token response from provider"
    );

    if let Err(error) = resp.error_for_status_ref() {
        let body = resp
            .text()
            .await
            .map_err(TokenRequestError::BodyReadError)?;
        return Err(TokenRequestError::ErrorWithBody {
            source: error,
            body,
        });
    }

    let body = resp
        .bytes()
        .await
        .map_err(TokenRequestError::BodyReadError)?;
    let resp: TokenResponse = serde_json::from_slice(&body)?;

    tracing::info!(
        has_id_token = resp.id_token.is_some(),
        has_refresh_token = resp.refresh_token.is_some(),
        lifetime = resp.expires_in.0,
        "received new tokens"
    );

    Ok(resp)
}
