//! User info and user management calls

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BearerTokenRef, OrganizationId, UserId};

/// A schema-less JSON document, as used for a user's custom data
pub type CustomData = serde_json::Map<String, serde_json::Value>;

/// An error while calling a user endpoint
#[derive(Debug, Error)]
pub enum UserRequestError {
    /// The provider rejected the bearer token
    #[error("unauthorized")]
    Unauthorized,
    /// The provider responded with an unexpected status
    #[error("request failed with status {status}: {body}")]
    Status {
        /// The response status
        status: StatusCode,
        /// The response body
        body: String,
    },
    /// The Logto endpoint cannot be extended with a management API path
    #[error("invalid Logto endpoint: {endpoint}")]
    InvalidEndpoint {
        /// The configured endpoint
        endpoint: String,
    },
    /// The request could not be sent, or the response could not be read
    #[error("error communicating with provider")]
    Request(#[from] reqwest::Error),
}

/// The response of the userinfo endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserInfo {
    /// The user ID
    pub sub: UserId,
    /// Full name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Primary email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the primary email is verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Primary phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Whether the primary phone number is verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number_verified: Option<bool>,
    /// Role names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// IDs of the organizations the user is a member of
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<OrganizationId>,
    /// Organization roles, formatted as `organization_id:role_name`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organization_roles: Vec<String>,
    /// Custom data, when the `custom_data` scope was granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<CustomData>,
    /// Social and enterprise identities, when the `identities` scope was granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identities: Option<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomDataPatch<'a> {
    custom_data: &'a CustomData,
}

#[derive(Serialize)]
struct PasswordPatch<'a> {
    password: &'a str,
}

/// The management API URL of a user
///
/// `user_id` is percent-encoded as a single path segment.
pub fn user_endpoint(endpoint: &str, user_id: &str) -> Result<Url, UserRequestError> {
    management_url(endpoint, &["api", "users", user_id])
}

/// The management API URL of a user's password
pub fn user_password_endpoint(endpoint: &str, user_id: &str) -> Result<Url, UserRequestError> {
    management_url(endpoint, &["api", "users", user_id, "password"])
}

fn management_url(endpoint: &str, segments: &[&str]) -> Result<Url, UserRequestError> {
    let invalid = || UserRequestError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
    };

    let mut url = Url::parse(endpoint).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|()| invalid())?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, UserRequestError> {
    let status = resp.status();

    if status == StatusCode::UNAUTHORIZED {
        tracing::debug!("provider rejected bearer token");
        return Err(UserRequestError::Unauthorized);
    }

    if !status.is_success() {
        let body = resp.text().await?;
        tracing::debug!(response.status = status.as_u16(), "user request failed");
        return Err(UserRequestError::Status { status, body });
    }

    Ok(resp)
}

/// Fetches the claims of the user that `access_token` was issued to
#[tracing::instrument(err, skip(client, access_token))]
pub async fn fetch_user_info(
    client: &Client,
    userinfo_endpoint: &str,
    access_token: &BearerTokenRef,
) -> Result<UserInfo, UserRequestError> {
    let resp = client
        .get(userinfo_endpoint)
        .bearer_auth(access_token.as_str())
        .send()
        .await?;

    let resp = check_status(resp).await?;

    Ok(resp.json().await?)
}

/// Replaces a user's custom data through the management API
#[tracing::instrument(err, skip(client, access_token, custom_data))]
pub async fn update_user_custom_data(
    client: &Client,
    endpoint: &str,
    access_token: &BearerTokenRef,
    custom_data: &CustomData,
) -> Result<(), UserRequestError> {
    let resp = client
        .patch(endpoint)
        .bearer_auth(access_token.as_str())
        .json(&CustomDataPatch { custom_data })
        .send()
        .await?;

    check_status(resp).await?;

    tracing::info!("updated user custom data");

    Ok(())
}

/// Sets a user's password through the management API
#[tracing::instrument(err, skip(client, access_token, new_password))]
pub async fn update_user_password(
    client: &Client,
    password_endpoint: &str,
    access_token: &BearerTokenRef,
    new_password: &str,
) -> Result<(), UserRequestError> {
    let resp = client
        .patch(password_endpoint)
        .bearer_auth(access_token.as_str())
        .json(&PasswordPatch {
            password: new_password,
        })
        .send()
        .await?;

    check_status(resp).await?;

    tracing::info!("updated user password");

    Ok(())
}
