use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use aliri_clock::{DurationSecs, UnixTime};
use logto_core::{
    token::TokenResponse, BearerToken, BearerTokenRef, OrganizationId, OrganizationIdRef, Resource,
    ResourceRef, Scope,
};
use serde::{Deserialize, Serialize};

/// An access token along with the scopes it grants and its expiry
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    token: BearerToken,
    scope: String,
    expires_at: UnixTime,
}

impl AccessToken {
    /// Constructs a new access token
    pub fn new(token: BearerToken, scope: impl Into<String>, expires_at: UnixTime) -> Self {
        Self {
            token,
            scope: scope.into(),
            expires_at,
        }
    }

    /// Constructs an access token from a token endpoint response received at `now`
    pub fn from_response(response: &TokenResponse, now: UnixTime) -> Self {
        Self {
            token: response.access_token.clone(),
            scope: response.scope.clone(),
            expires_at: UnixTime(now.0.saturating_add(response.expires_in.0)),
        }
    }

    /// The bearer token
    pub fn token(&self) -> &BearerTokenRef {
        &self.token
    }

    /// The space-delimited scopes granted to the token
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// When the token expires
    pub fn expires_at(&self) -> UnixTime {
        self.expires_at
    }

    /// Whether the token is still valid at `now` with at least `minimum_validity` to spare
    pub fn is_fresh_at(&self, now: UnixTime, minimum_validity: DurationSecs) -> bool {
        self.expires_at.0 > now.0.saturating_add(minimum_validity.0)
    }
}

/// On whose behalf an access token was issued
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Principal {
    /// The signed-in user, through the refresh token grant
    #[default]
    User,
    /// The application itself, through the client credentials grant
    Machine,
}

impl Principal {
    fn is_user(&self) -> bool {
        *self == Self::User
    }
}

/// Identifies a cached access token by the principal, scopes, resource, and
/// organization it was requested for
///
/// Scopes are held as a set, so the order in which they are given does not matter.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenKey {
    #[serde(default, skip_serializing_if = "Principal::is_user")]
    principal: Principal,
    #[serde(default)]
    scopes: BTreeSet<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource: Option<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    organization_id: Option<OrganizationId>,
}

impl AccessTokenKey {
    /// Constructs the key of a token issued to the signed-in user
    pub fn new(
        scopes: impl IntoIterator<Item = Scope>,
        resource: Option<&ResourceRef>,
        organization_id: Option<&OrganizationIdRef>,
    ) -> Self {
        Self {
            principal: Principal::User,
            scopes: scopes.into_iter().collect(),
            resource: resource.map(ToOwned::to_owned),
            organization_id: organization_id.map(ToOwned::to_owned),
        }
    }

    /// The key of a token for `resource`, or for the default resource if `None`
    pub fn for_resource(resource: Option<&ResourceRef>) -> Self {
        Self::new(None, resource, None)
    }

    /// The key of a token for the organization `organization_id`
    pub fn for_organization(organization_id: &OrganizationIdRef) -> Self {
        Self::new(None, None, Some(organization_id))
    }

    /// The key of a token issued to the application itself for `resource`
    pub fn for_machine(resource: &ResourceRef) -> Self {
        Self {
            principal: Principal::Machine,
            ..Self::for_resource(Some(resource))
        }
    }

    /// The principal
    pub fn principal(&self) -> Principal {
        self.principal
    }

    /// The scopes
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    /// The resource
    pub fn resource(&self) -> Option<&ResourceRef> {
        self.resource.as_deref()
    }

    /// The organization
    pub fn organization_id(&self) -> Option<&OrganizationIdRef> {
        self.organization_id.as_deref()
    }
}

impl fmt::Display for AccessTokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.principal == Principal::Machine {
            f.write_str("machine:")?;
        }
        let mut first = true;
        for scope in &self.scopes {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope.as_str())?;
            first = false;
        }
        f.write_str("@")?;
        if let Some(resource) = &self.resource {
            f.write_str(resource.as_str())?;
        }
        f.write_str("#")?;
        if let Some(organization_id) = &self.organization_id {
            f.write_str(organization_id.as_str())?;
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize)]
struct Entry<K, T> {
    key: K,
    token: T,
}

/// Access tokens by the key they were requested for
///
/// Entries are only ever overwritten, never evicted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenCache {
    tokens: BTreeMap<AccessTokenKey, AccessToken>,
}

impl TokenCache {
    /// Constructs an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The token cached for `key`, whether or not it has expired
    pub fn get(&self, key: &AccessTokenKey) -> Option<&AccessToken> {
        self.tokens.get(key)
    }

    /// The token cached for `key`, if it is still valid at `now` with at least
    /// `minimum_validity` to spare
    pub fn get_fresh(
        &self,
        key: &AccessTokenKey,
        now: UnixTime,
        minimum_validity: DurationSecs,
    ) -> Option<&AccessToken> {
        self.get(key)
            .filter(|token| token.is_fresh_at(now, minimum_validity))
    }

    /// Caches `token` under `key`, replacing any previous token
    pub fn insert(&mut self, key: AccessTokenKey, token: AccessToken) {
        self.tokens.insert(key, token);
    }

    /// The number of cached tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Serializes the cache for storage
    pub fn to_blob(&self) -> Result<String, serde_json::Error> {
        let entries: Vec<_> = self
            .tokens
            .iter()
            .map(|(key, token)| Entry { key, token })
            .collect();
        serde_json::to_string(&entries)
    }

    /// Restores a cache serialized with [`to_blob`][Self::to_blob]
    ///
    /// An empty blob restores an empty cache.
    pub fn from_blob(blob: &str) -> Result<Self, serde_json::Error> {
        if blob.trim().is_empty() {
            return Ok(Self::new());
        }

        let entries: Vec<Entry<AccessTokenKey, AccessToken>> = serde_json::from_str(blob)?;
        Ok(Self {
            tokens: entries.into_iter().map(|e| (e.key, e.token)).collect(),
        })
    }
}
