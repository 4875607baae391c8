use std::sync::Arc;

use aliri_clock::Clock;
use logto_core::{
    claims::{self, ClaimsError, IdTokenClaims, JwksVerifier},
    oidc::OidcConfig,
    IdToken, IdTokenRef, RefreshToken,
};

use super::LogtoClient;
use crate::{
    provider::Provider, storage::StorageKey, AccessToken, AccessTokenKey, Error,
    IdTokenVerification,
};

impl<P, C> LogtoClient<P, C>
where
    P: Provider,
    C: Clock + Send + Sync,
{
    /// Checks the tokens returned by an exchange, writes them to storage, then caches
    /// the access token
    ///
    /// Absent ID and refresh tokens leave the stored ones in place. Storage is written
    /// in the order refresh token, ID token, access token cache, and the in-memory cache
    /// only changes once all writes have succeeded.
    pub(super) async fn verify_and_save(
        &self,
        id_token: Option<IdToken>,
        refresh_token: Option<RefreshToken>,
        key: AccessTokenKey,
        token: AccessToken,
        oidc: &OidcConfig,
    ) -> Result<(), Error> {
        if let Some(id_token) = &id_token {
            self.verify_id_token(id_token, oidc).await?;
        }

        let mut cache = self.cache.write().await;

        let mut updated = cache.clone();
        updated.insert(key, token);
        let blob = updated
            .to_blob()
            .map_err(|source| Error::PersistenceFailed {
                source: source.into(),
                rotated_refresh_token: refresh_token.clone(),
            })?;

        if let Some(refresh_token) = refresh_token {
            if let Err(source) = self
                .storage
                .set_item(StorageKey::RefreshToken, refresh_token.as_str())
                .await
            {
                tracing::warn!("unable to store rotated refresh token");
                return Err(Error::PersistenceFailed {
                    source,
                    rotated_refresh_token: Some(refresh_token),
                });
            }
        }

        if let Some(id_token) = &id_token {
            self.storage
                .set_item(StorageKey::IdToken, id_token.as_str())
                .await
                .map_err(|source| Error::PersistenceFailed {
                    source,
                    rotated_refresh_token: None,
                })?;
        }

        self.storage
            .set_item(StorageKey::AccessTokenMap, &blob)
            .await
            .map_err(|source| Error::PersistenceFailed {
                source,
                rotated_refresh_token: None,
            })?;

        *cache = updated;

        tracing::debug!(cached_tokens = cache.len(), "persisted exchanged tokens");

        Ok(())
    }

    async fn verify_id_token(&self, id_token: &IdTokenRef, oidc: &OidcConfig) -> Result<(), Error> {
        match self.config.id_token_verification() {
            IdTokenVerification::Structural => {
                claims::decode_id_token(id_token.as_str())?;
            }
            IdTokenVerification::Signature => {
                let verifier = self.id_token_verifier(oidc).await?;
                match verifier.verify::<IdTokenClaims>(id_token.as_str()) {
                    Err(ClaimsError::UnknownKeyId) => {
                        tracing::debug!("ID token signed by unknown key, refreshing JWKS");
                        let jwks = self
                            .provider
                            .fetch_jwks(&oidc.jwks_uri)
                            .await
                            .map_err(|e| Error::ConfigResolutionFailed(e.into()))?;
                        verifier.set_jwks(jwks);
                        verifier.verify::<IdTokenClaims>(id_token.as_str())?;
                    }
                    result => {
                        result?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn id_token_verifier(&self, oidc: &OidcConfig) -> Result<Arc<JwksVerifier>, Error> {
        if let Some(verifier) = self.verifier.read().await.as_ref() {
            return Ok(Arc::clone(verifier));
        }

        let mut slot = self.verifier.write().await;
        if let Some(verifier) = slot.as_ref() {
            return Ok(Arc::clone(verifier));
        }

        let jwks = self
            .provider
            .fetch_jwks(&oidc.jwks_uri)
            .await
            .map_err(|e| Error::ConfigResolutionFailed(e.into()))?;

        let verifier = Arc::new(JwksVerifier::for_id_tokens(
            jwks,
            &oidc.issuer,
            self.config.app_id(),
        ));
        *slot = Some(Arc::clone(&verifier));

        Ok(verifier)
    }
}
