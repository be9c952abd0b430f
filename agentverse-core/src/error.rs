use thiserror::Error;

use crate::generation::GenerationError;
use crate::graph::GraphError;

#[derive(Error, Debug)]
pub enum AgentverseError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classes shared by every component. HTTP layers map these to
/// status codes; the chat UI maps them to user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    Config,
    Upstream,
}

impl AgentverseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentverseError::Validation(_) => ErrorKind::Validation,
            AgentverseError::Auth(_) => ErrorKind::Auth,
            AgentverseError::Config(_) => ErrorKind::Config,
            AgentverseError::Upstream(_) | AgentverseError::Io(_) => ErrorKind::Upstream,
        }
    }
}

impl From<config::ConfigError> for AgentverseError {
    fn from(e: config::ConfigError) -> Self {
        AgentverseError::Config(e.to_string())
    }
}

impl From<GenerationError> for AgentverseError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::EmptyPrompt => AgentverseError::Validation(e.to_string()),
            GenerationError::MissingApiKey => AgentverseError::Config(e.to_string()),
            other => AgentverseError::Upstream(other.to_string()),
        }
    }
}

impl From<GraphError> for AgentverseError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Validation(msg) => AgentverseError::Validation(msg),
            other => AgentverseError::Upstream(other.to_string()),
        }
    }
}
