//! DTOs for interacting with the Logto token endpoint

use aliri_clock::DurationSecs;
use serde::{Deserialize, Serialize, Serializer};

use crate::{
    AppId, AppIdRef, AppSecret, AppSecretRef, BearerToken, IdToken, OrganizationId, RefreshToken,
    Resource, ResourceRef, Scope,
};

fn join_scopes(scopes: &[Scope]) -> Option<String> {
    if scopes.is_empty() {
        None
    } else {
        Some(
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

/// Parameters of a `refresh_token` grant
#[derive(Debug, Clone)]
pub struct RefreshTokenGrant {
    /// The client ID
    pub client_id: AppId,

    /// The client secret, if the application is confidential
    pub client_secret: Option<AppSecret>,

    /// The refresh token to exchange
    pub refresh_token: RefreshToken,

    /// The resource the new access token should be issued for
    pub resource: Option<Resource>,

    /// Scopes to narrow the new access token to
    pub scopes: Vec<Scope>,

    /// The organization the new access token should be issued for
    pub organization_id: Option<OrganizationId>,
}

impl Serialize for RefreshTokenGrant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("RefreshTokenGrant", 6)?;
        ser.serialize_field("grant_type", "refresh_token")?;
        ser.serialize_field("client_id", &self.client_id)?;
        ser.serialize_field("refresh_token", &self.refresh_token)?;
        if let Some(resource) = &self.resource {
            ser.serialize_field("resource", resource)?;
        } else {
            ser.skip_field("resource")?;
        }
        if let Some(scope) = join_scopes(&self.scopes) {
            ser.serialize_field("scope", &scope)?;
        } else {
            ser.skip_field("scope")?;
        }
        if let Some(organization_id) = &self.organization_id {
            ser.serialize_field("organization_id", organization_id)?;
        } else {
            ser.skip_field("organization_id")?;
        }
        ser.end()
    }
}

impl super::TokenGrant for RefreshTokenGrant {
    fn client_id(&self) -> &AppIdRef {
        &self.client_id
    }
    fn client_secret(&self) -> Option<&AppSecretRef> {
        self.client_secret.as_deref()
    }
    fn grant_type() -> &'static str {
        "refresh_token"
    }
    fn resource(&self) -> Option<&ResourceRef> {
        self.resource.as_deref()
    }
}

/// Parameters of a `client_credentials` grant
#[derive(Debug, Clone)]
pub struct ClientCredentialsGrant {
    /// The client ID
    pub client_id: AppId,

    /// The client secret
    pub client_secret: Option<AppSecret>,

    /// The resource the access token should be issued for
    pub resource: Resource,

    /// Scopes to request, if any
    pub scopes: Vec<Scope>,
}

impl Serialize for ClientCredentialsGrant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("ClientCredentialsGrant", 4)?;
        ser.serialize_field("grant_type", "client_credentials")?;
        ser.serialize_field("client_id", &self.client_id)?;
        ser.serialize_field("resource", &self.resource)?;
        if let Some(scope) = join_scopes(&self.scopes) {
            ser.serialize_field("scope", &scope)?;
        } else {
            ser.skip_field("scope")?;
        }
        ser.end()
    }
}

impl super::TokenGrant for ClientCredentialsGrant {
    fn client_id(&self) -> &AppIdRef {
        &self.client_id
    }
    fn client_secret(&self) -> Option<&AppSecretRef> {
        self.client_secret.as_deref()
    }
    fn grant_type() -> &'static str {
        "client_credentials"
    }
    fn resource(&self) -> Option<&ResourceRef> {
        Some(&self.resource)
    }
}

/// A successful response from the token endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// The issued access token
    pub access_token: BearerToken,

    /// A new ID token, if the provider chose to issue one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<IdToken>,

    /// A rotated refresh token, if the provider chose to issue one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,

    /// The space-delimited scopes granted to the access token
    #[serde(default)]
    pub scope: String,

    /// How long the access token is valid for
    pub expires_in: DurationSecs,
}
