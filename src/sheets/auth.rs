use crate::config::{Config, ENV_TOKEN_FILE, GoogleConfig};
use crate::error::{AppError, Result};
use google_apis_common::GetToken;
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, RefreshToken, RequestTokenError, Scope, StandardRevocableToken,
    TokenResponse, TokenUrl,
    basic::{
        BasicClient, BasicErrorResponse, BasicRevocationErrorResponse,
        BasicTokenIntrospectionResponse, BasicTokenResponse,
    },
};
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Spreadsheet read/write plus Drive access limited to files created by
/// this application.
pub const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GoogleTokens {
    pub access_token: String,
    /// Google only issues this on consent; without it an expired access
    /// token means a fresh authorization flow.
    pub refresh_token: Option<String>,
    /// Expiry time as seconds since Unix epoch
    pub expires_at: i64,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl GoogleTokens {
    /// Check if the access token is expired or about to expire (within 5 minutes)
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        // Add 5 minute buffer to refresh before actual expiry
        self.expires_at < (now + 300)
    }
}

/// On-disk credential artifact, restricted to owner read/write.
pub(crate) struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub(crate) fn open() -> Result<Self> {
        let path = match std::env::var(ENV_TOKEN_FILE) {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => Config::cache_file("google_tokens.json")?,
        };
        Ok(Self { path })
    }

    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// A missing or unreadable artifact means "authorization required",
    /// never a hard failure.
    pub(crate) fn load(&self) -> Option<GoogleTokens> {
        let contents = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub(crate) fn save(&self, tokens: &GoogleTokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Auth(format!("Failed to create token cache directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(tokens)
            .map_err(|e| AppError::Auth(format!("Failed to serialize tokens: {}", e)))?;

        // Create file with owner-only permissions from the start to avoid
        // a window with a world-readable credential
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.path)
            .map_err(|e| AppError::Auth(format!("Failed to create tokens file: {}", e)))?;

        file.write_all(contents.as_bytes())
            .map_err(|e| AppError::Auth(format!("Failed to write tokens file: {}", e)))?;

        Ok(())
    }

    pub(crate) fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            debug!("No Google tokens to clear");
            return Ok(());
        }

        fs::remove_file(&self.path)
            .map_err(|e| AppError::Auth(format!("Failed to delete tokens file: {}", e)))?;
        info!("Cleared cached Google tokens");

        Ok(())
    }
}

// Type alias for the client when Auth and Token URLs are set
type ConfiguredClient = Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,    // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointNotSet, // HasRevocationUrl
    EndpointSet,    // HasTokenUrl
>;

/// Owns the Google authorization-code flow: URL generation, code exchange,
/// and single-shot refresh, persisting through the token store.
pub struct GoogleAuth {
    client: ConfiguredClient,
    http_client: reqwest::Client,
    store: TokenStore,
}

impl GoogleAuth {
    pub fn new(config: &GoogleConfig) -> Result<Self> {
        Self::with_store(config, TokenStore::open()?)
    }

    /// Single flow construction shared by URL generation and code
    /// exchange, so the two call sites can't drift apart.
    fn with_store(config: &GoogleConfig, store: TokenStore) -> Result<Self> {
        let client_id = ClientId::new(config.client_id.clone());
        let client_secret = ClientSecret::new(config.client_secret.clone());

        let auth_url = AuthUrl::new(GOOGLE_AUTH_URL.to_string())
            .map_err(|e| AppError::Config(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
            .map_err(|e| AppError::Config(format!("Invalid token URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(GoogleConfig::redirect_uri())
            .map_err(|e| AppError::Config(format!("Invalid redirect URI: {}", e)))?;

        let client = BasicClient::new(client_id)
            .set_client_secret(client_secret)
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);

        let http_client = reqwest::ClientBuilder::new()
            .redirect(Policy::none())
            .build()
            .map_err(|e| AppError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            http_client,
            store,
        })
    }

    /// Authorization URL for the manual flow. The code comes back out of
    /// band (the user pastes it into a later invocation), so no CSRF state
    /// or PKCE verifier is carried across runs.
    pub fn authorization_url(&self) -> Url {
        let scopes = OAUTH_SCOPES
            .iter()
            .map(|s| Scope::new(s.to_string()))
            .collect::<Vec<Scope>>();

        let (auth_url, _csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        auth_url
    }

    /// Exchange an authorization code for tokens and persist them.
    #[instrument(name = "Exchanging authorization code", skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleTokens> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::Request(e) => {
                    AppError::Network(format!("Token exchange failed: {}", e))
                }
                other => AppError::Auth(format!("Authorization code rejected: {}", other)),
            })?;

        let tokens = self.persist_tokens(token_result, None)?;
        info!("Authorization complete, credential stored");
        Ok(tokens)
    }

    #[instrument(name = "Refreshing access token", skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<GoogleTokens> {
        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::Request(e) => {
                    AppError::Network(format!("Token refresh failed: {}", e))
                }
                other => AppError::Auth(format!("Token refresh rejected: {}", other)),
            })?;

        self.persist_tokens(token_result, Some(refresh_token))
    }

    /// Parse a token response, save it to disk, and return the tokens.
    ///
    /// Google omits the refresh token on refresh grants, so the previous
    /// one is carried forward when provided.
    fn persist_tokens(
        &self,
        token_result: BasicTokenResponse,
        previous_refresh_token: Option<&str>,
    ) -> Result<GoogleTokens> {
        let access_token = token_result.access_token().secret().clone();

        let refresh_token = token_result
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| previous_refresh_token.map(str::to_string));

        let expires_in = token_result
            .expires_in()
            .map(|d| d.as_secs() as i64)
            .unwrap_or(3600); // Default to 1 hour if not provided
        let expires_at = chrono::Utc::now().timestamp() + expires_in;

        let scopes = token_result
            .scopes()
            .map(|s| s.iter().map(|scope| scope.to_string()).collect())
            .unwrap_or_else(|| OAUTH_SCOPES.iter().map(|s| s.to_string()).collect());

        let tokens = GoogleTokens {
            access_token,
            refresh_token,
            expires_at,
            scopes,
        };

        self.store.save(&tokens)?;

        Ok(tokens)
    }

    /// Load the persisted credential, refreshing it at most once when
    /// expired. A failed refresh is terminal so the caller can prompt for
    /// re-authorization; there is no interactive fallback here.
    pub async fn get_valid_tokens(&self) -> Result<GoogleTokens> {
        let Some(tokens) = self.store.load() else {
            return Err(AppError::Auth(
                "No stored Google credential. Generate an authorization URL and \
                 complete the flow first."
                    .to_string(),
            ));
        };

        if !tokens.is_expired() {
            debug!("Using cached Google tokens");
            return Ok(tokens);
        }

        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            return Err(AppError::Auth(
                "Access token expired and no refresh token is stored; \
                 re-authorization required"
                    .to_string(),
            ));
        };

        debug!("Access token expired, refreshing");
        self.refresh(refresh_token).await
    }
}

/// Cloneable handle bridging [`GoogleAuth`] into the Sheets and Drive hubs.
#[derive(Clone)]
pub(crate) struct SheetsAuthenticator {
    inner: Arc<GoogleAuth>,
}

impl SheetsAuthenticator {
    pub(crate) fn new(config: &GoogleConfig) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(GoogleAuth::new(config)?),
        })
    }

    pub(crate) async fn get_valid_tokens(&self) -> Result<GoogleTokens> {
        self.inner.get_valid_tokens().await
    }
}

impl GetToken for SheetsAuthenticator {
    fn get_token(
        &self,
        _scopes: &[&str],
    ) -> Pin<
        Box<
            dyn Future<
                    Output = std::result::Result<
                        Option<String>,
                        Box<dyn std::error::Error + Send + Sync>,
                    >,
                > + Send,
        >,
    > {
        let auth = self.clone();
        Box::pin(async move {
            let tokens = auth.inner.get_valid_tokens().await?;
            Ok(Some(tokens.access_token))
        })
    }
}

/// Clear cached Google tokens by deleting the token artifact
#[instrument(name = "Clearing Google auth tokens", skip_all)]
pub fn clear_tokens() -> Result<()> {
    TokenStore::open()?.clear()
}
