//! OAuth 2.0 authorization-code flow against Google.
//!
//! The provider owns the protocol: we build the consent URL, exchange the code
//! at the token endpoint and hand the ID token to the provider's `tokeninfo`
//! endpoint for verification. Only the audience and nonce are checked here.

use std::path::Path;
use std::time::Duration;

use agentverse_core::config::OAuthConfig;
use agentverse_core::{AgentverseError, UserProfile};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent URL the browser is redirected to.
    fn authorization_url(&self, state: &str, nonce: &str) -> String;

    /// Exchange an authorization code for a verified user profile.
    async fn exchange_code(&self, code: &str, nonce: &str) -> Result<UserProfile, AgentverseError>;
}

// ============================================================================
// client_secrets.json
// ============================================================================

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    web: Option<ClientSecrets>,
    installed: Option<ClientSecrets>,
}

/// One section of a Google `client_secrets.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: Option<String>,
    pub token_uri: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

pub fn load_client_secrets(path: &Path) -> Result<ClientSecrets, AgentverseError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AgentverseError::Config(format!("Cannot read {}: {}", path.display(), e))
    })?;
    let file: ClientSecretsFile = serde_json::from_str(&raw).map_err(|e| {
        AgentverseError::Config(format!("Invalid client secrets in {}: {}", path.display(), e))
    })?;

    file.web.or(file.installed).ok_or_else(|| {
        AgentverseError::Config(format!(
            "{} has neither a 'web' nor an 'installed' section",
            path.display()
        ))
    })
}

/// Fill client credentials and endpoints from the secrets file when they
/// are not configured directly.
pub fn resolve_oauth_config(config: &OAuthConfig) -> Result<OAuthConfig, AgentverseError> {
    let mut resolved = config.clone();
    if !resolved.client_id.is_empty() {
        return Ok(resolved);
    }

    let path = match &config.client_secrets_path {
        Some(p) => p,
        None => {
            return Err(AgentverseError::Config(
                "OAuth client is not configured: set GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET or oauth.client_secrets_path".to_string(),
            ))
        }
    };

    let secrets = load_client_secrets(Path::new(path))?;
    resolved.client_id = secrets.client_id;
    resolved.client_secret = secrets.client_secret;
    if let Some(uri) = secrets.auth_uri {
        resolved.auth_uri = uri;
    }
    if let Some(uri) = secrets.token_uri {
        resolved.token_uri = uri;
    }
    if !secrets.redirect_uris.is_empty() && !secrets.redirect_uris.contains(&resolved.redirect_uri) {
        tracing::warn!(
            redirect_uri = %resolved.redirect_uri,
            registered = ?secrets.redirect_uris,
            "Configured redirect URI is not registered in client secrets"
        );
    }
    Ok(resolved)
}

// ============================================================================
// Provider wire structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    aud: String,
    nonce: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

// ============================================================================
// GoogleOAuthClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    client: Client,
    client_id: String,
    client_secret: String,
    auth_url: Url,
    token_uri: String,
    tokeninfo_uri: String,
    redirect_uri: String,
    scopes: Vec<String>,
}

fn auth_err(context: &str, e: impl std::fmt::Display) -> AgentverseError {
    AgentverseError::Auth(format!("{}: {}", context, e))
}

impl GoogleOAuthClient {
    pub fn new(config: &OAuthConfig) -> Result<Self, AgentverseError> {
        let config = resolve_oauth_config(config)?;
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(AgentverseError::Config(
                "OAuth client id and secret are required".to_string(),
            ));
        }

        let auth_url = Url::parse(&config.auth_uri).map_err(|e| {
            AgentverseError::Config(format!("Invalid auth_uri '{}': {}", config.auth_uri, e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AgentverseError::Config(e.to_string()))?;

        Ok(Self {
            client,
            client_id: config.client_id,
            client_secret: config.client_secret,
            auth_url,
            token_uri: config.token_uri,
            tokeninfo_uri: config.tokeninfo_uri,
            redirect_uri: config.redirect_uri,
            scopes: config.scopes,
        })
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<IdTokenClaims, AgentverseError> {
        let response = self
            .client
            .get(&self.tokeninfo_uri)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| auth_err("ID token verification failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "ID token rejected");
            return Err(AgentverseError::Auth("ID token was rejected by the provider".to_string()));
        }

        let claims: IdTokenClaims = response
            .json()
            .await
            .map_err(|e| auth_err("Invalid token info response", e))?;

        if claims.aud != self.client_id {
            return Err(AgentverseError::Auth(
                "ID token was issued for a different client".to_string(),
            ));
        }
        Ok(claims)
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuthClient {
    fn authorization_url(&self, state: &str, nonce: &str) -> String {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("nonce", nonce)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("include_granted_scopes", "true");
        url.to_string()
    }

    async fn exchange_code(&self, code: &str, nonce: &str) -> Result<UserProfile, AgentverseError> {
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| auth_err("Token exchange failed", e))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let msg = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => body,
            };
            tracing::warn!(error = %msg, "Token exchange rejected");
            return Err(AgentverseError::Auth(format!("Token exchange failed: {}", msg)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| auth_err("Invalid token response", e))?;
        let id_token = token.id_token.ok_or_else(|| {
            AgentverseError::Auth("Token response did not include an ID token".to_string())
        })?;

        let claims = self.verify_id_token(&id_token).await?;
        if claims.nonce.as_deref() != Some(nonce) {
            return Err(AgentverseError::Auth("OAuth nonce mismatch".to_string()));
        }

        Ok(UserProfile {
            name: claims.name,
            email: claims.email,
        })
    }
}
