//! Resolution of the provider's OIDC configuration

use std::sync::Arc;

use aliri_clock::{Clock, DurationSecs, UnixTime};
use logto_core::oidc::OidcConfig;
use tokio::sync::RwLock;

use crate::provider::Provider;

/// Fetches the OIDC discovery document and keeps it for a configured time
#[derive(Debug)]
pub struct OidcConfigResolver {
    ttl: Option<DurationSecs>,
    cached: RwLock<Option<(Arc<OidcConfig>, UnixTime)>>,
}

impl OidcConfigResolver {
    /// Constructs a resolver that reuses a fetched configuration for `ttl`
    ///
    /// With a `ttl` of `None`, every call to [`resolve`][Self::resolve] fetches the
    /// configuration anew.
    pub fn new(ttl: Option<DurationSecs>) -> Self {
        Self {
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Returns the cached configuration, or fetches it if absent or outdated
    pub async fn resolve<P, C>(
        &self,
        provider: &P,
        clock: &C,
    ) -> Result<Arc<OidcConfig>, reqwest::Error>
    where
        P: Provider + ?Sized,
        C: Clock,
    {
        let ttl = match self.ttl {
            Some(ttl) => ttl,
            None => return Ok(Arc::new(provider.fetch_oidc_config().await?)),
        };

        if let Some(config) = self.cached_at(clock.now()).await {
            tracing::trace!("using cached OIDC configuration");
            return Ok(config);
        }

        let mut cached = self.cached.write().await;
        let now = clock.now();
        if let Some((config, fetched)) = cached.as_ref() {
            if is_current(*fetched, ttl, now) {
                return Ok(Arc::clone(config));
            }
        }

        let config = Arc::new(provider.fetch_oidc_config().await?);
        *cached = Some((Arc::clone(&config), now));

        Ok(config)
    }

    /// Drops the cached configuration
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn cached_at(&self, now: UnixTime) -> Option<Arc<OidcConfig>> {
        let ttl = self.ttl?;
        let cached = self.cached.read().await;
        let (config, fetched) = cached.as_ref()?;
        if is_current(*fetched, ttl, now) {
            Some(Arc::clone(config))
        } else {
            None
        }
    }
}

fn is_current(fetched: UnixTime, ttl: DurationSecs, now: UnixTime) -> bool {
    now.0 < fetched.0.saturating_add(ttl.0)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::test_util::{FakeProvider, SharedClock};

    #[tokio::test]
    async fn reuses_configuration_within_ttl() -> Result<()> {
        let provider = FakeProvider::new();
        let clock = SharedClock::new(1_000);
        let resolver = OidcConfigResolver::new(Some(DurationSecs(60)));

        resolver.resolve(&provider, &clock).await?;
        clock.advance(59);
        resolver.resolve(&provider, &clock).await?;
        assert_eq!(provider.discovery_calls(), 1);

        clock.advance(1);
        resolver.resolve(&provider, &clock).await?;
        assert_eq!(provider.discovery_calls(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn fetches_every_time_without_ttl() -> Result<()> {
        let provider = FakeProvider::new();
        let clock = SharedClock::new(1_000);
        let resolver = OidcConfigResolver::new(None);

        resolver.resolve(&provider, &clock).await?;
        resolver.resolve(&provider, &clock).await?;

        assert_eq!(provider.discovery_calls(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn refetches_after_invalidation() -> Result<()> {
        let provider = FakeProvider::new();
        let clock = SharedClock::new(1_000);
        let resolver = OidcConfigResolver::new(Some(DurationSecs(60)));

        resolver.resolve(&provider, &clock).await?;
        resolver.invalidate().await;
        resolver.resolve(&provider, &clock).await?;

        assert_eq!(provider.discovery_calls(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn unbounded_ttl_keeps_configuration() -> Result<()> {
        let provider = FakeProvider::new();
        let clock = SharedClock::new(1_000);
        let resolver = OidcConfigResolver::new(Some(DurationSecs(u64::MAX)));

        resolver.resolve(&provider, &clock).await?;
        clock.advance(1_000_000);
        resolver.resolve(&provider, &clock).await?;

        assert_eq!(provider.discovery_calls(), 1);

        Ok(())
    }
}
