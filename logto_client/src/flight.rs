use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::AccessTokenKey;

/// Per-key guards that let at most one acquisition per key be in flight
///
/// A caller holding the guard for a key is the only one that may exchange a token for
/// it. Callers that queue behind it re-check the cache once they get the guard.
#[derive(Debug, Default)]
pub(crate) struct FlightGuards {
    guards: std::sync::Mutex<HashMap<AccessTokenKey, Arc<Mutex<()>>>>,
}

impl FlightGuards {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn acquire(&self, key: &AccessTokenKey) -> OwnedMutexGuard<()> {
        let guard = {
            let mut guards = self
                .guards
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // An entry only the map refers to is neither held nor awaited.
            guards.retain(|_, guard| Arc::strong_count(guard) > 1);
            Arc::clone(guards.entry(key.clone()).or_default())
        };

        guard.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use logto_core::ResourceRef;

    use super::*;

    #[tokio::test]
    async fn second_acquire_for_same_key_waits() {
        let flights = FlightGuards::new();
        let key = AccessTokenKey::for_resource(Some(ResourceRef::from_str("res1")));

        let held = flights.acquire(&key).await;

        let blocked = tokio::time::timeout(Duration::from_millis(20), flights.acquire(&key)).await;
        assert!(blocked.is_err());

        drop(held);

        let reacquired =
            tokio::time::timeout(Duration::from_millis(200), flights.acquire(&key)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let flights = FlightGuards::new();

        let _a = flights.acquire(&AccessTokenKey::for_resource(None)).await;
        let b = tokio::time::timeout(
            Duration::from_millis(200),
            flights.acquire(&AccessTokenKey::for_resource(Some(ResourceRef::from_str(
                "res1",
            )))),
        )
        .await;

        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        use logto_core::OrganizationIdRef;

        let flights = FlightGuards::new();
        let held = flights.acquire(&AccessTokenKey::for_resource(None)).await;

        for org in ["org1", "org2", "org3"] {
            let key = AccessTokenKey::for_organization(OrganizationIdRef::from_str(org));
            drop(flights.acquire(&key).await);
        }

        let _last = flights
            .acquire(&AccessTokenKey::for_organization(OrganizationIdRef::from_str("org4")))
            .await;

        let tracked = flights.guards.lock().unwrap().len();
        assert_eq!(tracked, 2);

        drop(held);
    }
}
