//! OpenID Connect discovery

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// The path, relative to the Logto endpoint, of the discovery document
pub const DISCOVERY_PATH: &str = "oidc/.well-known/openid-configuration";

/// The subset of the provider's discovery document used by this crate family
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OidcConfig {
    /// The issuer identifier, expected in the `iss` claim of issued tokens
    pub issuer: String,
    /// Where the provider publishes its JSON Web Key Set
    pub jwks_uri: String,
    /// The token endpoint used for all grants
    pub token_endpoint: String,
    /// The userinfo endpoint
    pub userinfo_endpoint: String,
    /// The authorization endpoint used by the interactive flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    /// The RP-initiated logout endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    /// The token revocation endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
}

/// Builds the discovery document URL for a Logto endpoint
///
/// Trailing slashes on `endpoint` are ignored.
pub fn discovery_url(endpoint: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), DISCOVERY_PATH)
}

/// Fetches the discovery document from the Logto endpoint
#[tracing::instrument(err, skip(client), fields(discovery_url = tracing::field::Empty))]
pub async fn fetch_oidc_config(client: &Client, endpoint: &str) -> Result<OidcConfig, reqwest::Error> {
    let url = discovery_url(endpoint);
    tracing::Span::current().record("discovery_url", url.as_str());

    let response = client.get(&url).send().await?;
    response.error_for_status_ref()?;

    let config = response.json::<OidcConfig>().await?;

    tracing::debug!(issuer = %config.issuer, "fetched OIDC configuration");

    Ok(config)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn discovery_url_ignores_trailing_slashes() {
        assert_eq!(
            discovery_url("https://tenant.logto.app/"),
            "https://tenant.logto.app/oidc/.well-known/openid-configuration"
        );
        assert_eq!(
            discovery_url("https://tenant.logto.app"),
            "https://tenant.logto.app/oidc/.well-known/openid-configuration"
        );
    }

    #[test]
    fn deserializes_discovery_document_with_unknown_fields() -> Result<()> {
        const DATA: &str = r#"{
            "issuer": "https://tenant.logto.app/oidc",
            "jwks_uri": "https://tenant.logto.app/oidc/jwks",
            "token_endpoint": "https://tenant.logto.app/oidc/token",
            "userinfo_endpoint": "https://tenant.logto.app/oidc/me",
            "end_session_endpoint": "https://tenant.logto.app/oidc/session/end",
            "claims_supported": ["sub", "name"]
        }"#;

        let config: OidcConfig = serde_json::from_str(DATA)?;

        assert_eq!(config.token_endpoint, "https://tenant.logto.app/oidc/token");
        assert_eq!(config.authorization_endpoint, None);
        assert_eq!(
            config.end_session_endpoint.as_deref(),
            Some("https://tenant.logto.app/oidc/session/end")
        );

        Ok(())
    }
}
