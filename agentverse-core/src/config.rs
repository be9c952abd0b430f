use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::AgentverseError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AgentverseConfig {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GraphConfig {
    /// `neo4j` (HTTP transactional endpoint) or `memory`
    pub backend: String,
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub timeout_seconds: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: "neo4j".to_string(),
            uri: String::new(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl GraphConfig {
    /// The Neo4j backend cannot start without a URI and password.
    pub fn require_credentials(&self) -> Result<(), AgentverseError> {
        if self.backend != "neo4j" {
            return Ok(());
        }
        if self.uri.trim().is_empty() || self.password.is_empty() {
            return Err(AgentverseError::Config(
                "NEO4J_URI and NEO4J_PASSWORD must be set".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: Option<f32>,
    /// Latest prompt/response pair is written here, overwriting each call.
    pub output_path: String,
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: None,
            output_path: "text_agent_output.json".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub host: String,
    pub port: u16,
    pub session_ttl_minutes: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            session_ttl_minutes: 8 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Google `client_secrets.json`; fills `client_id`/`client_secret` and
    /// endpoints when those are not set directly.
    pub client_secrets_path: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
    pub tokeninfo_uri: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            client_secrets_path: None,
            auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            tokeninfo_uri: "https://oauth2.googleapis.com/tokeninfo".to_string(),
            redirect_uri: "http://localhost:8501/oauth/callback".to_string(),
            scopes: vec![
                "openid".to_string(),
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
                "https://www.googleapis.com/auth/userinfo.profile".to_string(),
            ],
            timeout_seconds: 30,
        }
    }
}

/// Well-known environment variables and the config keys they override.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("NEO4J_URI", "graph.uri"),
    ("NEO4J_USER", "graph.user"),
    ("NEO4J_PASSWORD", "graph.password"),
    ("NEO4J_DATABASE", "graph.database"),
    ("GOOGLE_API_KEY", "generation.api_key"),
    ("GEMINI_API_KEY", "generation.api_key"),
    ("GOOGLE_CLIENT_ID", "oauth.client_id"),
    ("GOOGLE_CLIENT_SECRET", "oauth.client_secret"),
];

impl AgentverseConfig {
    /// Load from an optional TOML file, then `AGENTVERSE__SECTION__KEY`
    /// variables, then the well-known variables in `ENV_OVERRIDES`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(path: &str, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("AGENTVERSE").separator("__"));

        // Later entries win, so GEMINI_API_KEY beats GOOGLE_API_KEY.
        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = env(var).filter(|v| !v.is_empty()) {
                builder = builder.set_override(*key, value)?;
            }
        }

        builder.build()?.try_deserialize()
    }
}
