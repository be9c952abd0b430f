pub mod config;
pub mod error;
pub mod extract;
pub mod generation;
pub mod graph;
pub mod models;

pub use config::AgentverseConfig;
pub use error::{AgentverseError, ErrorKind};
pub use generation::{
    create_generator, GeminiTextClient, GenerationError, GenerationRecord, OutputRecord, TextAgent,
    TextGenerator, UnconfiguredGenerator,
};
pub use graph::{create_store, GraphError, GraphStore, MemoryGraphStore, Neo4jHttpStore};
pub use models::chat::{ChatMessage, Role, UserProfile};
pub use models::graph::{
    GraphNode, GraphPayload, GraphQuery, GraphRelationship, PushSummary, QueryRequest, QueryResult,
    RelationshipRow,
};
