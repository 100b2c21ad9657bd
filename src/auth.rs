use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

pub const OAUTH2_AUTHORIZE: &str = "https://accounts.airthings.com/authorize";
pub const OAUTH2_TOKEN: &str = "https://accounts-api.airthings.com/v1/token";

/// Tokens are refreshed this many seconds before their advertised expiry
const CLOCK_OUT_OF_SYNC_MAX_SECS: i64 = 20;

/// Bearer credential handed to the HTTP client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// A credential without a known expiry never expires locally
    pub fn is_expired(&self) -> bool {
        self.expires_within(Utc::now(), 0)
    }

    pub fn expires_within(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now + TimeDelta::seconds(margin_secs) >= expires_at,
            None => false,
        }
    }
}

/// Token set as issued by the token endpoint. `expires_at` is a Unix timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl AuthTokens {
    pub fn credential(&self) -> Credential {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        Credential::new(self.access_token.clone(), expires_at)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Trait for callbacks when tokens are refreshed
pub trait TokenRefreshCallback: Send + Sync {
    fn on_tokens_refreshed(&self, tokens: &AuthTokens);
}

/// Source of bearer credentials for the API client.
///
/// `ensure_valid` is a rendezvous point: it waits for any refresh already in
/// flight before deciding whether another one is needed, so two callers that
/// hit an expired token at the same time trigger a single refresh.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    fn current_token(&self) -> Credential;

    async fn ensure_valid(&self) -> Result<Credential>;

    /// Report that the server rejected `rejected`. Ignored if the provider has
    /// already moved on to a different token.
    fn invalidate(&self, _rejected: &Credential) {}
}

#[derive(Debug)]
struct SessionState {
    tokens: AuthTokens,
    stale: bool,
}

/// OAuth2 session backed by a refresh token
pub struct OAuthSession {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    state: RwLock<SessionState>,
    refresh_lock: Mutex<()>,
    refresh_callback: Option<Arc<dyn TokenRefreshCallback>>,
}

impl OAuthSession {
    pub fn new(
        client_id: String,
        client_secret: String,
        tokens: AuthTokens,
        refresh_callback: Option<Arc<dyn TokenRefreshCallback>>,
    ) -> Self {
        Self::new_with_token_url(
            client_id,
            client_secret,
            tokens,
            refresh_callback,
            OAUTH2_TOKEN.to_string(),
        )
    }

    pub fn new_with_token_url(
        client_id: String,
        client_secret: String,
        tokens: AuthTokens,
        refresh_callback: Option<Arc<dyn TokenRefreshCallback>>,
        token_url: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url,
            client_id,
            client_secret,
            state: RwLock::new(SessionState {
                tokens,
                stale: false,
            }),
            refresh_lock: Mutex::new(()),
            refresh_callback,
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn tokens(&self) -> AuthTokens {
        self.read_state(|state| state.tokens.clone())
    }

    /// Refresh unconditionally, still queueing behind any refresh in flight
    pub async fn force_refresh(&self) -> Result<AuthTokens> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh().await
    }

    fn read_state<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn needs_refresh(&self) -> bool {
        self.read_state(|state| {
            state.stale
                || state
                    .tokens
                    .credential()
                    .expires_within(Utc::now(), CLOCK_OUT_OF_SYNC_MAX_SECS)
        })
    }

    async fn refresh(&self) -> Result<AuthTokens> {
        let refresh_token = self.read_state(|state| state.tokens.refresh_token.clone());

        debug!("Refreshing access token at {}", self.token_url);
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            debug!("Token refresh failed with status: {}", status);
            return Err(Error::Auth(format!(
                "Token refresh failed: {}",
                response_text
            )));
        }

        let token_response: TokenResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::Auth(format!("Failed to parse token response: {}", e)))?;

        let tokens = AuthTokens {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token.unwrap_or(refresh_token),
            expires_at: token_response
                .expires_in
                .map(|secs| Utc::now().timestamp() + secs),
        };

        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.tokens = tokens.clone();
            state.stale = false;
        }
        debug!("Access token refreshed");

        if let Some(callback) = &self.refresh_callback {
            callback.on_tokens_refreshed(&tokens);
        }

        Ok(tokens)
    }
}

#[async_trait]
impl TokenProvider for OAuthSession {
    fn current_token(&self) -> Credential {
        self.read_state(|state| state.tokens.credential())
    }

    async fn ensure_valid(&self) -> Result<Credential> {
        let _guard = self.refresh_lock.lock().await;

        if self.needs_refresh() {
            self.refresh().await?;
        }

        Ok(self.current_token())
    }

    fn invalidate(&self, rejected: &Credential) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.tokens.access_token == rejected.access_token {
            warn!("Access token was rejected, marking it for refresh");
            state.stale = true;
        }
    }
}
