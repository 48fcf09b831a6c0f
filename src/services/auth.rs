//! OpenID Connect sign-in
//!
//! Authorization code flow with PKCE against a Keycloak realm. Tokens never
//! reach the browser: they are kept in the server-side session and attached
//! to backend calls by this server.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use data_encoding::BASE64URL_NOPAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::backend::BackendApi;
use crate::config::{OidcConfig, ServerConfig};
use crate::models::{ConnectedUser, FetchState};
use crate::services::session::Session;

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No login in progress")]
    NoPendingLogin,
    #[error("Login state does not match")]
    StateMismatch,
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
    #[error("Token refresh failed: {0}")]
    Refresh(String),
}

/// Provider URLs for one Keycloak realm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcEndpoints {
    pub authorization: String,
    pub token: String,
    pub end_session: String,
    pub account: String,
}

impl OidcEndpoints {
    pub fn keycloak(url: &str, realm: &str) -> Self {
        let realm_url = format!("{}/realms/{}", url.trim_end_matches('/'), realm);
        let protocol = format!("{}/protocol/openid-connect", realm_url);
        Self {
            authorization: format!("{}/auth", protocol),
            token: format!("{}/token", protocol),
            end_session: format!("{}/logout", protocol),
            account: format!("{}/account", realm_url),
        }
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Tokens of a signed-in visitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            expires_at: now + ChronoDuration::seconds(response.expires_in),
            refresh_expires_at: response
                .refresh_expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now + ChronoDuration::seconds(secs)),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the access token is gone within `secs` seconds
    pub fn expires_within(&self, secs: i64, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + ChronoDuration::seconds(secs)
    }

    /// A refresh response may omit tokens that stay valid
    fn refreshed(&self, response: TokenResponse, now: DateTime<Utc>) -> Self {
        let mut next = Self::from_response(response, now);
        if next.refresh_token.is_none() {
            next.refresh_token = self.refresh_token.clone();
            next.refresh_expires_at = self.refresh_expires_at;
        }
        if next.id_token.is_none() {
            next.id_token = self.id_token.clone();
        }
        next
    }
}

/// Login started but not yet completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub return_to: String,
}

/// Token endpoint calls
#[async_trait]
pub trait TokenClient: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;
}

/// `TokenClient` posting forms to the provider's token endpoint
pub struct HttpTokenClient {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl HttpTokenClient {
    pub fn new(endpoints: &OidcEndpoints, config: &OidcConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token_url: endpoints.token.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", self.client_id.as_str()));
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{}: {}", status, body.trim()));
        }

        response.json::<TokenResponse>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl TokenClient for HttpTokenClient {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.post_form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", redirect_uri),
        ])
        .await
        .map_err(AuthError::TokenExchange)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.post_form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .await
            .map_err(AuthError::Refresh)
    }
}

/// S256 challenge of a PKCE verifier
pub fn pkce_challenge(verifier: &str) -> String {
    BASE64URL_NOPAD.encode(&Sha256::digest(verifier.as_bytes()))
}

/// Only same-site absolute paths are accepted as redirect targets
pub fn safe_return_to(return_to: Option<&str>) -> String {
    match return_to {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

fn random_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Sign-in, token upkeep and sign-out
pub struct AuthService {
    endpoints: OidcEndpoints,
    client_id: String,
    scopes: String,
    public_url: String,
    min_validity_secs: i64,
    tokens: Arc<dyn TokenClient>,
    backend: Arc<dyn BackendApi>,
}

impl AuthService {
    pub fn new(
        oidc: &OidcConfig,
        server: &ServerConfig,
        tokens: Arc<dyn TokenClient>,
        backend: Arc<dyn BackendApi>,
    ) -> Self {
        Self {
            endpoints: OidcEndpoints::keycloak(&oidc.url, &oidc.realm),
            client_id: oidc.client_id.clone(),
            scopes: oidc.scopes.clone(),
            public_url: server.public_url.trim_end_matches('/').to_string(),
            min_validity_secs: oidc.min_token_validity_secs,
            tokens,
            backend,
        }
    }

    pub fn endpoints(&self) -> &OidcEndpoints {
        &self.endpoints
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.public_url)
    }

    pub fn is_authenticated(&self, session: &Session) -> bool {
        session.is_authenticated()
    }

    /// Start a login and return the provider URL to send the visitor to
    pub fn begin_login(&self, session: &mut Session, return_to: Option<&str>) -> String {
        let pending = PendingLogin {
            state: random_token(),
            nonce: random_token(),
            code_verifier: format!("{}{}", random_token(), random_token()),
            return_to: safe_return_to(return_to),
        };

        let url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&nonce={}&code_challenge={}&code_challenge_method=S256",
            self.endpoints.authorization,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri()),
            urlencoding::encode(&self.scopes),
            pending.state,
            pending.nonce,
            pkce_challenge(&pending.code_verifier),
        );

        session.pending_login = Some(pending);
        url
    }

    /// Finish the login started by `begin_login`. Returns where to send the
    /// visitor next.
    pub async fn complete_login(&self, session: &mut Session, code: &str, state: &str) -> Result<String, AuthError> {
        let pending = session.pending_login.take().ok_or(AuthError::NoPendingLogin)?;
        if pending.state != state {
            return Err(AuthError::StateMismatch);
        }

        let response = self
            .tokens
            .exchange_code(code, &pending.code_verifier, &self.redirect_uri())
            .await?;
        session.tokens = Some(TokenSet::from_response(response, Utc::now()));
        self.load_user(session).await;

        tracing::info!(user = ?session.user_id(), "User logged in");
        Ok(pending.return_to)
    }

    /// Resolve the signed-in user. A failed lookup still counts as signed in,
    /// shown as `NOT_CONNECTED`.
    pub async fn load_user(&self, session: &mut Session) {
        let Some(tokens) = &session.tokens else {
            session.user = FetchState::success(ConnectedUser::not_connected());
            return;
        };

        session.user = match self.backend.current_user(&tokens.access_token).await {
            Ok(profile) => FetchState::success(ConnectedUser::from(profile)),
            Err(e) => {
                tracing::warn!("Failed to load current user: {}", e);
                FetchState::success(ConnectedUser::not_connected())
            }
        };
    }

    /// A usable access token, refreshed when close to expiry.
    ///
    /// A failed refresh signs the visitor out only when the token has already
    /// expired; otherwise the current token is kept and refresh is retried on
    /// the next call.
    pub async fn access_token(&self, session: &mut Session) -> Option<String> {
        let tokens = session.tokens.clone()?;
        let now = Utc::now();
        if !tokens.expires_within(self.min_validity_secs, now) {
            return Some(tokens.access_token);
        }

        let result = match tokens.refresh_token.as_deref() {
            Some(refresh_token) => self.tokens.refresh(refresh_token).await,
            None => Err(AuthError::Refresh("no refresh token".to_string())),
        };

        match result {
            Ok(response) => {
                let next = tokens.refreshed(response, Utc::now());
                let access_token = next.access_token.clone();
                session.tokens = Some(next);
                tracing::debug!("Access token refreshed");
                Some(access_token)
            }
            Err(e) if tokens.is_expired(now) => {
                tracing::warn!("Session expired, signing out: {}", e);
                session.sign_out();
                None
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, keeping current token (temporary issue): {}", e);
                Some(tokens.access_token)
            }
        }
    }

    /// Sign the visitor out locally and return the provider logout URL
    pub fn logout_url(&self, session: &mut Session) -> String {
        let id_token = session.tokens.as_ref().and_then(|t| t.id_token.clone());
        session.sign_out();
        session.pending_login = None;

        let mut url = format!(
            "{}?client_id={}&post_logout_redirect_uri={}",
            self.endpoints.end_session,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&format!("{}/", self.public_url)),
        );
        if let Some(hint) = id_token {
            url.push_str("&id_token_hint=");
            url.push_str(&urlencoding::encode(&hint));
        }
        url
    }

    pub fn account_url(&self) -> &str {
        &self.endpoints.account
    }
}
