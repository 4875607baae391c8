//! Claims carried by Logto-issued tokens and the means of decoding them

use aliri::{
    jwa,
    jwt::{self, CoreHeaders, HasAlgorithm},
    JwtRef,
};
use aliri_base64::Base64Url;
use aliri_clock::UnixTime;
use arc_swap::ArcSwap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::{AppIdRef, OrganizationId, UserId};

pub use aliri::Jwks;

/// An error produced while decoding or verifying the claims of a token
#[derive(Debug, Error)]
pub enum ClaimsError {
    /// The token could not be split into header, payload, and signature, or the
    /// header could not be parsed
    #[error("malformed token")]
    Malformed(#[source] aliri::error::JwtVerifyError),
    /// The payload is not valid base64url
    #[error("malformed token payload encoding")]
    PayloadEncoding(#[from] aliri_base64::InvalidBase64Data),
    /// The payload does not deserialize into the requested claims
    #[error("malformed token payload")]
    Payload(#[from] serde_json::Error),
    /// No key in the key set matches the token header
    #[error("no matching key found to validate token")]
    UnknownKeyId,
    /// The signature or the claims were rejected
    #[error("token rejected")]
    Rejected(#[source] aliri::error::JwtVerifyError),
}

/// Claims of a Logto ID token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdTokenClaims {
    /// Issuer
    pub iss: jwt::Issuer,
    /// The user ID
    pub sub: UserId,
    /// The application the token was issued to
    #[serde(default)]
    pub aud: jwt::Audiences,
    /// Expiry
    pub exp: UnixTime,
    /// Issued at
    pub iat: UnixTime,
    /// Access token hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
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
}

impl jwt::CoreClaims for IdTokenClaims {
    fn nbf(&self) -> Option<UnixTime> {
        None
    }

    fn exp(&self) -> Option<UnixTime> {
        Some(self.exp)
    }

    fn aud(&self) -> &jwt::Audiences {
        &self.aud
    }

    fn iss(&self) -> Option<&jwt::IssuerRef> {
        Some(&self.iss)
    }

    fn sub(&self) -> Option<&jwt::SubjectRef> {
        Some(jwt::SubjectRef::from_str(self.sub.as_str()))
    }
}

/// Claims of an access token issued for an organization
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrganizationAccessTokenClaims {
    /// Token ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Issuer
    pub iss: jwt::Issuer,
    /// The user ID
    pub sub: UserId,
    /// Audience, `urn:logto:organization:{organization_id}`
    #[serde(default)]
    pub aud: jwt::Audiences,
    /// Expiry
    pub exp: UnixTime,
    /// Issued at
    pub iat: UnixTime,
    /// The application the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Space-delimited organization scopes
    #[serde(default)]
    pub scope: String,
}

impl OrganizationAccessTokenClaims {
    /// The organization scopes granted by this token
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }
}

/// Decodes the payload of a JWT **without** verifying its signature
///
/// Only suitable for tokens received directly from the provider's token endpoint.
/// Claims that feed an authorization decision must go through [`JwksVerifier`].
pub fn decode_unverified<C: DeserializeOwned>(token: &str) -> Result<C, ClaimsError> {
    let decomposed = JwtRef::from_str(token)
        .decompose::<jwt::BasicHeaders>()
        .map_err(ClaimsError::Malformed)?;

    let payload = Base64Url::from_encoded(decomposed.untrusted_payload())?;

    Ok(serde_json::from_slice(payload.as_slice())?)
}

/// Decodes the identity claims of an ID token without verifying its signature
pub fn decode_id_token(id_token: &str) -> Result<IdTokenClaims, ClaimsError> {
    decode_unverified(id_token)
}

/// Verifies tokens against a JSON Web Key Set
///
/// The key set can be swapped out at any time, e.g. after re-fetching it from the
/// provider's `jwks_uri`.
#[derive(Debug)]
pub struct JwksVerifier {
    jwks: ArcSwap<Jwks>,
    validator: jwt::CoreValidator,
}

impl JwksVerifier {
    /// Constructs a verifier from a key set and a validation plan
    pub fn new(jwks: Jwks, validator: jwt::CoreValidator) -> Self {
        Self {
            jwks: ArcSwap::from_pointee(jwks),
            validator,
        }
    }

    /// Constructs a verifier for ID tokens issued by `issuer` to the application `app_id`
    ///
    /// A leeway of 60 seconds is allowed on the expiry check.
    pub fn for_id_tokens(jwks: Jwks, issuer: &str, app_id: &AppIdRef) -> Self {
        let validator =
            id_token_validator(issuer, app_id).extend_approved_algorithms(approved_algorithms());

        Self::new(jwks, validator)
    }

    /// Replaces the key set used for verification
    pub fn set_jwks(&self, jwks: Jwks) {
        self.jwks.store(Arc::new(jwks));
    }

    /// Verifies the token's signature and claims, then returns the claims
    pub fn verify<C>(&self, token: &str) -> Result<C, ClaimsError>
    where
        C: DeserializeOwned + jwt::CoreClaims,
    {
        let decomposed = JwtRef::from_str(token)
            .decompose::<jwt::BasicHeaders>()
            .map_err(ClaimsError::Malformed)?;

        let guard = self.jwks.load();

        let key = {
            let kid = decomposed.kid();
            let alg = decomposed.alg();

            guard.get_key_by_opt(kid, alg).ok_or_else(|| {
                if let Some(kid) = kid {
                    tracing::debug!(%kid, %alg, "unable to find matching key");
                } else {
                    tracing::debug!(%alg, "unable to find matching key");
                }
                ClaimsError::UnknownKeyId
            })?
        };

        let validated: jwt::Validated<C> = decomposed
            .verify(key, &self.validator)
            .map_err(ClaimsError::Rejected)?;

        let (_, claims) = validated.extract();

        Ok(claims)
    }
}

fn id_token_validator(issuer: &str, app_id: &AppIdRef) -> jwt::CoreValidator {
    jwt::CoreValidator::default()
        .require_issuer(jwt::Issuer::new(issuer.to_owned()))
        .add_allowed_audience(jwt::Audience::new(app_id.as_str().to_owned()))
        .with_leeway_secs(60)
}

fn approved_algorithms() -> Vec<jwa::Algorithm> {
    #[allow(unused_mut)]
    let mut algs = Vec::new();
    #[cfg(feature = "rsa")]
    algs.extend([
        jwa::Algorithm::RS256,
        jwa::Algorithm::RS384,
        jwa::Algorithm::RS512,
        jwa::Algorithm::PS256,
        jwa::Algorithm::PS384,
        jwa::Algorithm::PS512,
    ]);
    #[cfg(feature = "ec")]
    algs.extend([
        jwa::Algorithm::ES256,
        jwa::Algorithm::ES384,
        jwa::Algorithm::ES512,
    ]);
    #[cfg(feature = "hmac")]
    algs.extend([
        jwa::Algorithm::HS256,
        jwa::Algorithm::HS384,
        jwa::Algorithm::HS512,
    ]);
    algs
}


#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use serde_json::json;

    use super::{test_util::unsigned_token, *};

    fn id_token_payload() -> serde_json::Value {
        json!({
            "iss": "https://tenant.logto.app/oidc",
            "sub": "user-1",
            "aud": "app",
            "exp": 4_000_000_000u64,
            "iat": 1_700_000_000u64,
            "name": "Ada",
            "organizations": ["org1", "org2"],
        })
    }

    #[test]
    fn decodes_id_token_claims_without_verification() -> Result<()> {
        let token = unsigned_token(&id_token_payload());

        let claims = decode_id_token(&token)?;

        assert_eq!(claims.sub.as_str(), "user-1");
        assert_eq!(claims.name.as_deref(), Some("Ada"));
        assert_eq!(claims.exp, UnixTime(4_000_000_000));
        assert_eq!(
            claims.organizations,
            vec![
                OrganizationId::from_static("org1"),
                OrganizationId::from_static("org2")
            ]
        );

        Ok(())
    }

    #[test]
    fn decodes_organization_token_scopes() -> Result<()> {
        let token = unsigned_token(&json!({
            "iss": "https://tenant.logto.app/oidc",
            "sub": "user-1",
            "aud": "urn:logto:organization:org1",
            "exp": 4_000_000_000u64,
            "iat": 1_700_000_000u64,
            "scope": "read:members invite:members",
        }));

        let claims: OrganizationAccessTokenClaims = decode_unverified(&token)?;

        assert_eq!(
            claims.scopes().collect::<Vec<_>>(),
            vec!["read:members", "invite:members"]
        );

        Ok(())
    }

    #[test]
    fn rejects_token_without_three_sections() {
        let err = decode_id_token("not-a-jwt").unwrap_err();
        assert!(matches!(err, ClaimsError::Malformed(_)));
    }

    #[test]
    fn rejects_payload_that_is_not_json_claims() {
        let token = unsigned_token(&json!({ "sub": 42 }));
        let err = decode_id_token(&token).unwrap_err();
        assert!(matches!(err, ClaimsError::Payload(_)));
    }

    #[test]
    fn verifier_without_matching_key_rejects_token() {
        let token = unsigned_token(&id_token_payload());
        let verifier = JwksVerifier::for_id_tokens(
            Jwks::default(),
            "https://tenant.logto.app/oidc",
            crate::AppIdRef::from_str("app"),
        );

        let err = verifier.verify::<IdTokenClaims>(&token).unwrap_err();
        assert!(matches!(err, ClaimsError::UnknownKeyId));
    }

    mod with_signed_tokens {
        use aliri::{jwa, jwt, Jwk, Jwt};
        use aliri_base64::Base64Url;
        use color_eyre::Result;

        use super::*;

        fn signing_key() -> Jwk {
            Jwk::from(jwa::Hmac::new(Base64Url::from_raw(b"test-secret".to_vec())))
                .with_algorithm(jwa::Algorithm::HS256)
        }

        fn verifier() -> JwksVerifier {
            let mut jwks = Jwks::default();
            jwks.add_key(signing_key());
            let validator = id_token_validator(
                "https://tenant.logto.app/oidc",
                crate::AppIdRef::from_str("app"),
            )
            .add_approved_algorithm(jwa::Algorithm::HS256);
            JwksVerifier::new(jwks, validator)
        }

        #[test]
        fn accepts_correctly_signed_token() -> Result<()> {
            let headers = jwt::BasicHeaders::new(jwa::Algorithm::HS256);
            let token =
                Jwt::try_from_parts_with_signature(&headers, &id_token_payload(), &signing_key())?;

            let claims: IdTokenClaims = verifier().verify(token.as_str())?;

            assert_eq!(claims.sub.as_str(), "user-1");

            Ok(())
        }

        #[test]
        fn rejects_token_for_another_audience() -> Result<()> {
            let mut payload = id_token_payload();
            payload["aud"] = json!("someone-else");

            let headers = jwt::BasicHeaders::new(jwa::Algorithm::HS256);
            let token = Jwt::try_from_parts_with_signature(&headers, &payload, &signing_key())?;

            let err = verifier()
                .verify::<IdTokenClaims>(token.as_str())
                .unwrap_err();
            assert!(matches!(err, ClaimsError::Rejected(_)));

            Ok(())
        }

        #[test]
        fn rejects_token_from_another_issuer() -> Result<()> {
            let mut payload = id_token_payload();
            payload["iss"] = json!("https://elsewhere.example.com/oidc");

            let headers = jwt::BasicHeaders::new(jwa::Algorithm::HS256);
            let token = Jwt::try_from_parts_with_signature(&headers, &payload, &signing_key())?;

            let err = verifier()
                .verify::<IdTokenClaims>(token.as_str())
                .unwrap_err();
            assert!(matches!(err, ClaimsError::Rejected(_)));

            Ok(())
        }

        #[test]
        fn rejects_token_with_tampered_payload() -> Result<()> {
            let headers = jwt::BasicHeaders::new(jwa::Algorithm::HS256);
            let token =
                Jwt::try_from_parts_with_signature(&headers, &id_token_payload(), &signing_key())?;

            let mut forged = id_token_payload();
            forged["sub"] = json!("user-2");
            let forged_payload = unsigned_token(&forged);
            let mut parts: Vec<&str> = token.as_str().split('.').collect();
            parts[1] = forged_payload.split('.').nth(1).unwrap();
            let tampered = parts.join(".");

            let err = verifier().verify::<IdTokenClaims>(&tampered).unwrap_err();
            assert!(matches!(err, ClaimsError::Rejected(_)));

            Ok(())
        }
    }
}
