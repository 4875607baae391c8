use aliri_clock::DurationSecs;
use logto_core::{
    AppId, AppIdRef, AppSecret, AppSecretRef, Resource, ResourceRef, Scope, ORGANIZATIONS_RESOURCE,
    ORGANIZATIONS_SCOPE, RESERVED_SCOPES,
};
use serde::{Deserialize, Serialize};

/// How ID tokens returned by an exchange are checked before they are stored
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdTokenVerification {
    /// Only check that the token is a well-formed JWT carrying ID token claims
    ///
    /// The token arrives straight from the token endpoint, so tampering in transit is
    /// limited to what TLS already rules out.
    #[default]
    Structural,
    /// Verify the signature against the provider's key set and validate the issuer,
    /// audience, and expiry
    Signature,
}

const fn default_oidc_config_ttl() -> Option<u64> {
    Some(3600)
}

/// Configuration of a Logto client
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogtoConfig {
    endpoint: String,
    app_id: AppId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_secret: Option<AppSecret>,
    #[serde(default)]
    resources: Vec<Resource>,
    #[serde(default)]
    scopes: Vec<Scope>,
    #[serde(default = "default_oidc_config_ttl")]
    oidc_config_ttl_secs: Option<u64>,
    #[serde(default)]
    minimum_validity_secs: u64,
    #[serde(default)]
    id_token_verification: IdTokenVerification,
}

impl LogtoConfig {
    /// Constructs a configuration for the application `app_id` of the Logto tenant at
    /// `endpoint`
    ///
    /// The OIDC configuration is cached for an hour, cached tokens are used right up to
    /// their expiry, and ID tokens are checked structurally.
    pub fn new(endpoint: impl Into<String>, app_id: AppId) -> Self {
        Self {
            endpoint: endpoint.into(),
            app_id,
            app_secret: None,
            resources: Vec::new(),
            scopes: Vec::new(),
            oidc_config_ttl_secs: default_oidc_config_ttl(),
            minimum_validity_secs: 0,
            id_token_verification: IdTokenVerification::Structural,
        }
    }

    /// Sets the application secret
    pub fn with_app_secret(mut self, app_secret: AppSecret) -> Self {
        self.app_secret = Some(app_secret);
        self
    }

    /// Sets the API resources that access tokens may be requested for
    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }

    /// Sets the scopes granted to the client
    pub fn with_scopes(mut self, scopes: Vec<Scope>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets how long a fetched OIDC configuration may be reused
    ///
    /// `None` fetches the configuration on every exchange.
    pub fn with_oidc_config_ttl(mut self, ttl: Option<DurationSecs>) -> Self {
        self.oidc_config_ttl_secs = ttl.map(|t| t.0);
        self
    }

    /// Sets the minimum remaining validity a cached token must have to be reused
    pub fn with_minimum_validity(mut self, minimum_validity: DurationSecs) -> Self {
        self.minimum_validity_secs = minimum_validity.0;
        self
    }

    /// Sets how ID tokens returned by an exchange are checked
    pub fn with_id_token_verification(mut self, verification: IdTokenVerification) -> Self {
        self.id_token_verification = verification;
        self
    }

    /// Fills in the reserved scopes and the organizations resource, and removes
    /// duplicates
    ///
    /// Order of the declared scopes and resources is otherwise preserved.
    pub fn normalized(mut self) -> Self {
        let mut scopes: Vec<Scope> = RESERVED_SCOPES
            .iter()
            .map(|s| Scope::new((*s).to_owned()))
            .collect();
        for scope in self.scopes {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        self.scopes = scopes;

        let mut resources: Vec<Resource> = Vec::with_capacity(self.resources.len() + 1);
        for resource in self.resources {
            if !resources.contains(&resource) {
                resources.push(resource);
            }
        }
        let organizations = Resource::new(ORGANIZATIONS_RESOURCE.to_owned());
        if self.scopes.iter().any(|s| s.as_str() == ORGANIZATIONS_SCOPE)
            && !resources.contains(&organizations)
        {
            resources.push(organizations);
        }
        self.resources = resources;

        self
    }

    /// The Logto endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The application ID
    pub fn app_id(&self) -> &AppIdRef {
        &self.app_id
    }

    /// The application secret
    pub fn app_secret(&self) -> Option<&AppSecretRef> {
        self.app_secret.as_deref()
    }

    /// The declared API resources
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// The declared scopes
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// How long a fetched OIDC configuration may be reused
    pub fn oidc_config_ttl(&self) -> Option<DurationSecs> {
        self.oidc_config_ttl_secs.map(DurationSecs)
    }

    /// The minimum remaining validity a cached token must have to be reused
    pub fn minimum_validity(&self) -> DurationSecs {
        DurationSecs(self.minimum_validity_secs)
    }

    /// How ID tokens returned by an exchange are checked
    pub fn id_token_verification(&self) -> IdTokenVerification {
        self.id_token_verification
    }

    /// Whether `resource` is one of the declared resources
    pub fn has_resource(&self, resource: &ResourceRef) -> bool {
        self.resources.iter().any(|r| r.as_str() == resource.as_str())
    }

    /// Whether `scope` is one of the declared scopes
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s.as_str() == scope)
    }
}
