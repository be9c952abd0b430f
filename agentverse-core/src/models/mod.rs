pub mod chat;
pub mod graph;
