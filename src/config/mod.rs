//! Configuration management
//!
//! Configuration is loaded from:
//! - config.yml file
//! - Environment variables prefixed with `MYSITE_` (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Remote backend API
    #[serde(default)]
    pub backend: BackendConfig,
    /// OpenID Connect identity provider
    #[serde(default)]
    pub oidc: OidcConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    /// Static assets
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub blog: BlogConfig,
    /// AI chat assistant widget
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub toast: ToastConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL, used for OIDC redirects and share links
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// CORS allowed origin for the JSON API
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Seconds to wait for in-flight requests on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    /// Mark cookies `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            cors_origin: default_cors_origin(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            secure_cookies: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_public_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:4000".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL; endpoint paths such as `/v1/blog` are appended to it
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
    /// Extra attempts for idempotent reads
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Chat model bean the backend should use
    #[serde(default = "default_chat_client")]
    pub chat_client: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_backend_timeout(),
            max_retries: default_max_retries(),
            chat_client: default_chat_client(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_chat_client() -> String {
    "geminiChatClient".to_string()
}

/// OpenID Connect configuration (Keycloak layout)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    #[serde(default = "default_oidc_url")]
    pub url: String,
    #[serde(default = "default_realm")]
    pub realm: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Only needed for confidential clients
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: String,
    /// Refresh the access token when it expires within this many seconds
    #[serde(default = "default_min_validity")]
    pub min_token_validity_secs: i64,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            url: default_oidc_url(),
            realm: default_realm(),
            client_id: default_client_id(),
            client_secret: None,
            scopes: default_scopes(),
            min_token_validity_secs: default_min_validity(),
        }
    }
}

fn default_oidc_url() -> String {
    "http://localhost:9080".to_string()
}

fn default_realm() -> String {
    "mysite".to_string()
}

fn default_client_id() -> String {
    "mysite-frontend".to_string()
}

fn default_scopes() -> String {
    "openid profile email".to_string()
}

fn default_min_validity() -> i64 {
    10
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for cached post data in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Idle lifetime of a session in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            session_ttl_seconds: default_session_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

fn default_session_ttl() -> u64 {
    7 * 24 * 3600
}

/// Template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Directory with Tera templates; embedded templates are used when absent
    #[serde(default = "default_templates_path")]
    pub path: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            path: default_templates_path(),
        }
    }
}

fn default_templates_path() -> PathBuf {
    PathBuf::from("templates")
}

/// Static asset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_assets_path")]
    pub path: PathBuf,
    /// `Cache-Control` max-age for static assets
    #[serde(default = "default_assets_max_age")]
    pub max_age_secs: u64,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            path: default_assets_path(),
            max_age_secs: default_assets_max_age(),
        }
    }
}

fn default_assets_path() -> PathBuf {
    PathBuf::from("static")
}

fn default_assets_max_age() -> u64 {
    31_536_000
}

/// Blog page configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogConfig {
    #[serde(default = "default_comments_page_size")]
    pub comments_page_size: u32,
    #[serde(default = "default_replies_page_size")]
    pub replies_page_size: u32,
    /// Number of posts shown on the blog list
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            comments_page_size: default_comments_page_size(),
            replies_page_size: default_replies_page_size(),
            recent_limit: default_recent_limit(),
        }
    }
}

fn default_comments_page_size() -> u32 {
    10
}

fn default_replies_page_size() -> u32 {
    5
}

fn default_recent_limit() -> usize {
    99
}

/// A canned prompt offered by the assistant widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickPrompt {
    pub label: String,
    pub text: String,
}

impl QuickPrompt {
    fn new(label: &str, text: &str) -> Self {
        Self {
            label: label.to_string(),
            text: text.to_string(),
        }
    }
}

/// AI assistant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_quick_prompts")]
    pub quick_prompts: Vec<QuickPrompt>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            quick_prompts: default_quick_prompts(),
        }
    }
}

fn default_quick_prompts() -> Vec<QuickPrompt> {
    vec![
        QuickPrompt::new("👋 Introduction", "Tell me about Michael Kopp and his experience"),
        QuickPrompt::new("💼 Recent Projects", "What are some recent projects Michael has worked on?"),
        QuickPrompt::new("🛠️ Tech Stack", "What technologies does Michael work with?"),
        QuickPrompt::new("📚 Blog Posts", "Show me recent blog posts"),
        QuickPrompt::new("📧 Contact", "How can I contact Michael?"),
    ]
}

/// Toast notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToastConfig {
    /// Auto-hide delay in milliseconds, 0 keeps toasts until dismissed
    #[serde(default = "default_auto_hide")]
    pub auto_hide_ms: u64,
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            auto_hide_ms: default_auto_hide(),
        }
    }
}

fn default_auto_hide() -> u64 {
    2000
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - MYSITE_SERVER_HOST, MYSITE_SERVER_PORT, MYSITE_SERVER_PUBLIC_URL,
    ///   MYSITE_SERVER_CORS_ORIGIN
    /// - MYSITE_BACKEND_API_URL, MYSITE_BACKEND_TIMEOUT_SECS, MYSITE_BACKEND_MAX_RETRIES
    /// - MYSITE_OIDC_URL, MYSITE_OIDC_REALM, MYSITE_OIDC_CLIENT_ID, MYSITE_OIDC_CLIENT_SECRET
    /// - MYSITE_CACHE_TTL_SECONDS
    /// - MYSITE_TEMPLATES_PATH, MYSITE_ASSETS_PATH
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.blog.comments_page_size == 0 || self.blog.replies_page_size == 0 {
            return Err(ConfigError::ValidationError(
                "blog page sizes must be greater than zero".to_string(),
            ));
        }
        if !self.backend.api_url.starts_with("http://") && !self.backend.api_url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "backend.api_url must be an http(s) URL, got '{}'",
                self.backend.api_url
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MYSITE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("MYSITE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(url) = std::env::var("MYSITE_SERVER_PUBLIC_URL") {
            self.server.public_url = url;
        }
        if let Ok(cors_origin) = std::env::var("MYSITE_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(url) = std::env::var("MYSITE_BACKEND_API_URL") {
            self.backend.api_url = url;
        }
        if let Ok(timeout) = std::env::var("MYSITE_BACKEND_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.backend.timeout_secs = timeout;
            }
        }
        if let Ok(retries) = std::env::var("MYSITE_BACKEND_MAX_RETRIES") {
            if let Ok(retries) = retries.parse::<u32>() {
                self.backend.max_retries = retries;
            }
        }

        if let Ok(url) = std::env::var("MYSITE_OIDC_URL") {
            self.oidc.url = url;
        }
        if let Ok(realm) = std::env::var("MYSITE_OIDC_REALM") {
            self.oidc.realm = realm;
        }
        if let Ok(client_id) = std::env::var("MYSITE_OIDC_CLIENT_ID") {
            self.oidc.client_id = client_id;
        }
        if let Ok(secret) = std::env::var("MYSITE_OIDC_CLIENT_SECRET") {
            self.oidc.client_secret = Some(secret);
        }

        if let Ok(ttl) = std::env::var("MYSITE_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        if let Ok(path) = std::env::var("MYSITE_TEMPLATES_PATH") {
            self.templates.path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("MYSITE_ASSETS_PATH") {
            self.assets.path = PathBuf::from(path);
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches MYSITE_* variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_VARS: &[&str] = &[
    "MYSITE_SERVER_HOST",
    "MYSITE_SERVER_PORT",
    "MYSITE_SERVER_PUBLIC_URL",
    "MYSITE_SERVER_CORS_ORIGIN",
    "MYSITE_BACKEND_API_URL",
    "MYSITE_BACKEND_TIMEOUT_SECS",
    "MYSITE_BACKEND_MAX_RETRIES",
    "MYSITE_OIDC_URL",
    "MYSITE_OIDC_REALM",
    "MYSITE_OIDC_CLIENT_ID",
    "MYSITE_OIDC_CLIENT_SECRET",
    "MYSITE_CACHE_TTL_SECONDS",
    "MYSITE_TEMPLATES_PATH",
    "MYSITE_ASSETS_PATH",
];

#[cfg(test)]
fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}
