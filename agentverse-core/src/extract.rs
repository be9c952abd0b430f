//! Turn meeting notes and a transcript into a pushable graph payload by asking
//! the text generator for Neo4j-style JSON.

use crate::error::AgentverseError;
use crate::generation::TextGenerator;
use crate::graph::GraphError;
use crate::models::graph::GraphPayload;

const SCHEMA_EXAMPLE: &str = r#"{
  "nodes": [
    {
      "id": "person_alice",
      "label": "Person",
      "properties": {
        "name": "Alice",
        "role": "Project Lead",
        "details": "Ran quick sync; coordinated the fix activity.",
        "lastActivity": "2025-11-01"
      }
    }
  ],
  "relationships": [
    {
      "id": "r1",
      "type": "WORKS_ON",
      "from": "person_dana",
      "to": "project_team_nebula",
      "properties": {}
    }
  ]
}"#;

pub fn build_extraction_prompt(notes: &str, transcript: &str) -> String {
    format!(
        "Summarize the following `notes_text` and `transcript_text` into a Neo4j-style JSON.\n\
         First, understand the start of the transcript text to match person+ID to name.\n\
         \n\
         Include:\n\
         - People (name, role, details, lastActivity)\n\
         - Project (name, description, lastWorkedOn)\n\
         - Issues (title, description, status)\n\
         - Relationships (WORKS_ON, MANAGES, ASSIGNED_TO, AFFECTS), using \"from\" and \"to\"\n\
         Return ONLY valid JSON.\n\
         \n\
         Example detailing schema:\n\
         {}\n\
         \n\
         notes_text:\n\
         {}\n\
         \n\
         transcript_text:\n\
         {}\n",
        SCHEMA_EXAMPLE,
        notes.trim(),
        transcript.trim()
    )
}

/// Strip a ```` ```json ```` (or bare ```` ``` ````) fence if present.
fn fenced_body(reply: &str) -> &str {
    let after_open = reply
        .split_once("```json")
        .or_else(|| reply.split_once("```"))
        .map(|(_, rest)| rest);

    match after_open {
        Some(rest) => rest.split_once("```").map(|(body, _)| body).unwrap_or(rest).trim(),
        None => reply.trim(),
    }
}

pub fn parse_graph_reply(reply: &str) -> Result<GraphPayload, AgentverseError> {
    let body = fenced_body(reply);
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        AgentverseError::Upstream(format!("Model reply is not valid graph JSON: {}", e))
    })?;

    GraphPayload::parse(value).map_err(|e| match e {
        GraphError::Validation(msg) => {
            AgentverseError::Upstream(format!("Model reply is not a valid graph: {}", msg))
        }
        other => other.into(),
    })
}

pub async fn extract_graph(
    generator: &dyn TextGenerator,
    notes: &str,
    transcript: &str,
) -> Result<GraphPayload, AgentverseError> {
    if notes.trim().is_empty() && transcript.trim().is_empty() {
        return Err(AgentverseError::Validation(
            "notes and transcript are both empty".to_string(),
        ));
    }

    let prompt = build_extraction_prompt(notes, transcript);
    let reply = generator.generate(&prompt, Some(0.0)).await?;
    let payload = parse_graph_reply(&reply)?;

    tracing::info!(
        nodes = payload.nodes.len(),
        relationships = payload.relationships.len(),
        "Extracted graph from notes and transcript"
    );
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedGenerator {
        reply: String,
        seen: Mutex<Vec<(String, Option<f32>)>>,
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(
            &self,
            prompt: &str,
            temperature: Option<f32>,
        ) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push((prompt.to_string(), temperature));
            Ok(self.reply.clone())
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    const REPLY: &str = "Here is the graph:\n```json\n{\"nodes\": [{\"id\": \"person_dana\", \"label\": \"Person\", \"properties\": {\"name\": \"Dana\"}}], \"relationships\": []}\n```\nDone.";

    #[test]
    fn test_parse_fenced_reply() {
        let payload = parse_graph_reply(REPLY).unwrap();
        assert_eq!(payload.nodes.len(), 1);
        assert_eq!(payload.nodes[0].id, "person_dana");
    }

    #[test]
    fn test_parse_bare_json_reply() {
        let payload = parse_graph_reply(r#" {"nodes": [], "relationships": []} "#).unwrap();
        assert!(payload.nodes.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_graph() {
        let err = parse_graph_reply("```json\n{\"people\": []}\n```").unwrap_err();
        assert!(matches!(err, AgentverseError::Upstream(_)));

        let err = parse_graph_reply("I could not do that").unwrap_err();
        assert!(matches!(err, AgentverseError::Upstream(_)));
    }

    #[test]
    fn test_prompt_includes_inputs() {
        let prompt = build_extraction_prompt("Dana fixed the UI", "Ben: I'll help");
        assert!(prompt.contains("notes_text:\nDana fixed the UI"));
        assert!(prompt.contains("transcript_text:\nBen: I'll help"));
        assert!(prompt.contains("Return ONLY valid JSON."));
    }

    #[tokio::test]
    async fn test_extract_uses_zero_temperature() {
        let generator = CannedGenerator {
            reply: REPLY.to_string(),
            seen: Mutex::new(Vec::new()),
        };

        let payload = extract_graph(&generator, "notes", "transcript").await.unwrap();
        assert_eq!(payload.nodes.len(), 1);

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, Some(0.0));
    }

    #[tokio::test]
    async fn test_extract_rejects_empty_inputs() {
        let generator = CannedGenerator {
            reply: REPLY.to_string(),
            seen: Mutex::new(Vec::new()),
        };
        let err = extract_graph(&generator, " ", "").await.unwrap_err();
        assert!(matches!(err, AgentverseError::Validation(_)));
        assert!(generator.seen.lock().unwrap().is_empty());
    }
}
