use std::{
    collections::{HashSet, VecDeque},
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use aliri_base64::Base64Url;
use aliri_clock::{Clock, DurationSecs, UnixTime};
use async_trait::async_trait;
use logto_core::{
    claims::Jwks,
    oidc::OidcConfig,
    token::{ClientCredentialsGrant, RefreshTokenGrant, TokenRequestError, TokenResponse},
    user::{CustomData, UserInfo, UserRequestError},
    BearerToken, BearerTokenRef, IdToken, RefreshToken, UserId,
};

use crate::{
    provider::Provider,
    storage::{MemoryStorage, Storage, StorageKey},
    BoxError,
};

pub const ISSUER: &str = "https://tenant.logto.app/oidc";
pub const APP_ID: &str = "app";

/// A clock that can be moved forward while shared with a client
#[derive(Clone, Debug)]
pub struct SharedClock(Arc<AtomicU64>);

impl SharedClock {
    pub fn new(now: u64) -> Self {
        Self(Arc::new(AtomicU64::new(now)))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for SharedClock {
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::SeqCst))
    }
}

pub fn oidc_config() -> OidcConfig {
    OidcConfig {
        issuer: ISSUER.to_owned(),
        jwks_uri: format!("{ISSUER}/jwks"),
        token_endpoint: format!("{ISSUER}/token"),
        userinfo_endpoint: format!("{ISSUER}/me"),
        authorization_endpoint: None,
        end_session_endpoint: None,
        revocation_endpoint: None,
    }
}

pub fn unsigned_token(payload: &serde_json::Value) -> String {
    let header = Base64Url::from_raw(br#"{"alg":"RS256","kid":"k1"}"#.to_vec());
    let payload = Base64Url::from_raw(serde_json::to_vec(payload).unwrap());
    let signature = Base64Url::from_raw(b"not-a-signature".to_vec());
    format!("{}.{}.{}", header, payload, signature)
}

pub fn id_token(sub: &str) -> IdToken {
    IdToken::new(unsigned_token(&serde_json::json!({
        "iss": ISSUER,
        "sub": sub,
        "aud": APP_ID,
        "exp": 4_000_000_000u64,
        "iat": 1_700_000_000u64,
        "organizations": ["org1"],
    })))
}

pub fn token_response(access_token: &str, expires_in: u64) -> TokenResponse {
    TokenResponse {
        access_token: BearerToken::new(access_token.to_owned()),
        id_token: None,
        refresh_token: None,
        scope: "s".to_owned(),
        expires_in: DurationSecs(expires_in),
    }
}

pub fn request_error() -> reqwest::Error {
    reqwest::Client::new()
        .get("not a url")
        .build()
        .unwrap_err()
}

/// A provider that counts calls and hands out queued or generated tokens
#[derive(Debug, Default)]
pub struct FakeProvider {
    discovery_calls: AtomicUsize,
    jwks_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
    refresh_grants: Mutex<Vec<RefreshTokenGrant>>,
    client_credentials_grants: Mutex<Vec<ClientCredentialsGrant>>,
    responses: Mutex<VecDeque<TokenResponse>>,
    user_calls: Mutex<Vec<(&'static str, String, String)>>,
    fail_discovery: AtomicBool,
    fail_exchange: AtomicBool,
    delay: Option<Duration>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push_response(&self, response: TokenResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn fail_discovery(&self) {
        self.fail_discovery.store(true, Ordering::SeqCst);
    }

    pub fn fail_exchange(&self) {
        self.fail_exchange.store(true, Ordering::SeqCst);
    }

    pub fn recover_exchange(&self) {
        self.fail_exchange.store(false, Ordering::SeqCst);
    }

    pub fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }

    pub fn jwks_calls(&self) -> usize {
        self.jwks_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.discovery_calls()
            + self.jwks_calls()
            + self.exchange_calls()
            + self.user_calls.lock().unwrap().len()
    }

    pub fn refresh_grants(&self) -> Vec<RefreshTokenGrant> {
        self.refresh_grants.lock().unwrap().clone()
    }

    pub fn client_credentials_grants(&self) -> Vec<ClientCredentialsGrant> {
        self.client_credentials_grants.lock().unwrap().clone()
    }

    pub fn user_calls(&self) -> Vec<(&'static str, String, String)> {
        self.user_calls.lock().unwrap().clone()
    }

    async fn exchange(&self) -> Result<TokenResponse, TokenRequestError> {
        let n = self.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(TokenRequestError::RequestSend(request_error()));
        }

        let queued = self.responses.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| token_response(&format!("AT{n}"), 3600)))
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn fetch_oidc_config(&self) -> Result<OidcConfig, reqwest::Error> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_discovery.load(Ordering::SeqCst) {
            return Err(request_error());
        }
        Ok(oidc_config())
    }

    async fn fetch_jwks(&self, _jwks_uri: &str) -> Result<Jwks, reqwest::Error> {
        self.jwks_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Jwks::default())
    }

    async fn fetch_token_by_refresh_token(
        &self,
        _token_endpoint: &str,
        grant: &RefreshTokenGrant,
    ) -> Result<TokenResponse, TokenRequestError> {
        self.refresh_grants.lock().unwrap().push(grant.clone());
        self.exchange().await
    }

    async fn fetch_token_by_client_credentials(
        &self,
        _token_endpoint: &str,
        grant: &ClientCredentialsGrant,
    ) -> Result<TokenResponse, TokenRequestError> {
        self.client_credentials_grants
            .lock()
            .unwrap()
            .push(grant.clone());
        self.exchange().await
    }

    async fn fetch_user_info(
        &self,
        _userinfo_endpoint: &str,
        access_token: &BearerTokenRef,
    ) -> Result<UserInfo, UserRequestError> {
        self.user_calls.lock().unwrap().push((
            "userinfo",
            String::new(),
            access_token.as_str().to_owned(),
        ));
        Ok(UserInfo {
            sub: UserId::from_static("user-1"),
            name: Some("Ada".to_owned()),
            username: None,
            picture: None,
            email: None,
            email_verified: None,
            phone_number: None,
            phone_number_verified: None,
            roles: Vec::new(),
            organizations: Vec::new(),
            organization_roles: Vec::new(),
            custom_data: None,
            identities: None,
        })
    }

    async fn update_user_custom_data(
        &self,
        user_id: &str,
        access_token: &BearerTokenRef,
        _custom_data: &CustomData,
    ) -> Result<(), UserRequestError> {
        self.user_calls.lock().unwrap().push((
            "custom_data",
            user_id.to_owned(),
            access_token.as_str().to_owned(),
        ));
        Ok(())
    }

    async fn update_user_password(
        &self,
        user_id: &str,
        access_token: &BearerTokenRef,
        _new_password: &str,
    ) -> Result<(), UserRequestError> {
        self.user_calls.lock().unwrap().push((
            "password",
            user_id.to_owned(),
            access_token.as_str().to_owned(),
        ));
        Ok(())
    }
}

/// In-memory storage whose writes to selected keys fail
#[derive(Debug, Default)]
pub struct FailingStorage {
    inner: MemoryStorage,
    failing: Mutex<HashSet<StorageKey>>,
}

impl FailingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_to(&self, key: StorageKey) {
        self.failing.lock().unwrap().insert(key);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl Storage for FailingStorage {
    async fn get_item(&self, key: StorageKey) -> Result<Option<String>, BoxError> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: StorageKey, value: &str) -> Result<(), BoxError> {
        if self.failing.lock().unwrap().contains(&key) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full").into());
        }
        self.inner.set_item(key, value).await
    }
}

pub fn refresh_token(value: &str) -> RefreshToken {
    RefreshToken::new(value.to_owned())
}
