use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::GraphError;

pub type Properties = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    /// Extractor output carries relationship ids; they are not stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub relationships: Vec<GraphRelationship>,
}

impl GraphPayload {
    /// Parse a raw request body, reporting missing fields the way callers
    /// expect to see them.
    pub fn parse(body: Value) -> Result<Self, GraphError> {
        let obj = match body.as_object() {
            Some(o) if !o.is_empty() => o,
            _ => return Err(GraphError::Validation("No JSON data provided".to_string())),
        };
        if !obj.contains_key("nodes") {
            return Err(GraphError::Validation(
                "Missing 'nodes' field in JSON".to_string(),
            ));
        }
        let payload: GraphPayload = serde_json::from_value(body)
            .map_err(|e| GraphError::Validation(format!("Invalid graph payload: {}", e)))?;
        payload.validate()?;
        Ok(payload)
    }

    /// Labels, relationship types and property keys end up inside Cypher
    /// text, so they must be plain identifiers.
    pub fn validate(&self) -> Result<(), GraphError> {
        for node in &self.nodes {
            require_identifier("label", &node.label)?;
            validate_properties(&node.properties)?;
        }
        for rel in &self.relationships {
            require_identifier("relationship type", &rel.rel_type)?;
            validate_properties(&rel.properties)?;
        }
        Ok(())
    }
}

/// Summary returned by a successful push. Counts are items processed, not
/// items newly created, so repeated pushes report the same numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSummary {
    pub status: String,
    pub nodes_created: usize,
    pub relationships_created: usize,
}

impl PushSummary {
    pub fn success(payload: &GraphPayload) -> Self {
        Self {
            status: "success".to_string(),
            nodes_created: payload.nodes.len(),
            relationships_created: payload.relationships.len(),
        }
    }
}

/// Wire form of a query. Exactly one of the raw or lookup forms is allowed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub cypher: Option<String>,
    #[serde(default)]
    pub parameters: Option<Properties>,
    pub label: Option<String>,
    pub property: Option<String>,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphQuery {
    Raw {
        cypher: String,
        parameters: Properties,
    },
    /// Exact match on `property = value`, or existence of `property` when
    /// no value is given.
    Lookup {
        label: String,
        property: String,
        value: Option<Value>,
    },
}

const MISSING_QUERY_FORM: &str = "Missing 'cypher' or 'label' and 'property' fields in JSON";

impl QueryRequest {
    pub fn into_query(self) -> Result<GraphQuery, GraphError> {
        let has_lookup = self.label.is_some() || self.property.is_some();

        match (self.cypher, has_lookup) {
            (Some(_), true) => Err(GraphError::Validation(
                "Provide either 'cypher' or 'label'/'property', not both".to_string(),
            )),
            (Some(cypher), false) => {
                if cypher.trim().is_empty() {
                    return Err(GraphError::Validation("'cypher' must not be empty".to_string()));
                }
                Ok(GraphQuery::Raw {
                    cypher,
                    parameters: self.parameters.unwrap_or_default(),
                })
            }
            (None, true) => match (self.label, self.property) {
                (Some(label), Some(property)) => {
                    require_identifier("label", &label)?;
                    require_identifier("property", &property)?;
                    Ok(GraphQuery::Lookup {
                        label,
                        property,
                        value: self.value.filter(|v| !v.is_null()),
                    })
                }
                _ => Err(GraphError::Validation(MISSING_QUERY_FORM.to_string())),
            },
            (None, false) => Err(GraphError::Validation(MISSING_QUERY_FORM.to_string())),
        }
    }
}

/// Rows from a query, each a column-name to value map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub result: Vec<Properties>,
    pub count: usize,
}

impl QueryResult {
    pub fn new(result: Vec<Properties>) -> Self {
        let count = result.len();
        Self { result, count }
    }
}

/// One `(from)-[type]->(to)` edge with both endpoints' properties and labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRow {
    pub from: Properties,
    #[serde(default)]
    pub from_labels: Vec<String>,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub properties: Properties,
    pub to: Properties,
    #[serde(default)]
    pub to_labels: Vec<String>,
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn require_identifier(what: &str, value: &str) -> Result<(), GraphError> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(GraphError::Validation(format!(
            "Invalid {} '{}': use letters, digits and underscores",
            what, value
        )))
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn validate_properties(properties: &Properties) -> Result<(), GraphError> {
    for (key, value) in properties {
        require_identifier("property key", key)?;
        let ok = match value {
            Value::Array(items) => items.iter().all(is_scalar),
            other => is_scalar(other),
        };
        if !ok {
            return Err(GraphError::Validation(format!(
                "Property '{}' must be a scalar or a list of scalars",
                key
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_example_payload() {
        let body = json!({
            "nodes": [
                {"id": "1", "label": "Person", "properties": {"name": "John", "age": 30}},
                {"id": "2", "label": "Company", "properties": {"name": "Acme Corp"}}
            ],
            "relationships": [
                {"id": "r1", "from": "1", "to": "2", "type": "WORKS_AT", "properties": {"since": 2020}}
            ]
        });

        let payload = GraphPayload::parse(body).unwrap();
        assert_eq!(payload.nodes.len(), 2);
        assert_eq!(payload.nodes[0].properties["age"], json!(30));
        assert_eq!(payload.relationships[0].rel_type, "WORKS_AT");
        assert_eq!(payload.relationships[0].id.as_deref(), Some("r1"));

        let summary = PushSummary::success(&payload);
        assert_eq!(summary.nodes_created, 2);
        assert_eq!(summary.relationships_created, 1);
    }

    #[test]
    fn test_parse_defaults_missing_properties_and_relationships() {
        let payload = GraphPayload::parse(json!({"nodes": [{"id": "1", "label": "Person"}]})).unwrap();
        assert!(payload.nodes[0].properties.is_empty());
        assert!(payload.relationships.is_empty());
    }

    #[test]
    fn test_parse_missing_nodes() {
        let err = GraphPayload::parse(json!({"relationships": []})).unwrap_err();
        assert_eq!(err.to_string(), "Missing 'nodes' field in JSON");

        let err = GraphPayload::parse(json!({})).unwrap_err();
        assert_eq!(err.to_string(), "No JSON data provided");
    }

    #[test]
    fn test_parse_rejects_injected_label() {
        let body = json!({"nodes": [{"id": "1", "label": "Person}) DETACH DELETE (m", "properties": {}}]});
        assert!(matches!(GraphPayload::parse(body), Err(GraphError::Validation(_))));
    }

    #[test]
    fn test_parse_rejects_nested_property() {
        let body = json!({"nodes": [{"id": "1", "label": "Person", "properties": {"address": {"city": "Leeds"}}}]});
        assert!(matches!(GraphPayload::parse(body), Err(GraphError::Validation(_))));

        let body = json!({"nodes": [{"id": "1", "label": "Person", "properties": {"tags": ["a", "b"]}}]});
        assert!(GraphPayload::parse(body).is_ok());
    }

    #[test]
    fn test_query_request_forms() {
        let raw: QueryRequest = serde_json::from_value(json!({"cypher": "MATCH (n) RETURN n"})).unwrap();
        assert!(matches!(raw.into_query().unwrap(), GraphQuery::Raw { .. }));

        let lookup: QueryRequest =
            serde_json::from_value(json!({"label": "Person", "property": "name", "value": "John"})).unwrap();
        assert_eq!(
            lookup.into_query().unwrap(),
            GraphQuery::Lookup {
                label: "Person".to_string(),
                property: "name".to_string(),
                value: Some(json!("John")),
            }
        );

        let exists: QueryRequest =
            serde_json::from_value(json!({"label": "Person", "property": "name"})).unwrap();
        assert!(matches!(
            exists.into_query().unwrap(),
            GraphQuery::Lookup { value: None, .. }
        ));
    }

    #[test]
    fn test_query_request_requires_exactly_one_form() {
        let neither: QueryRequest = serde_json::from_value(json!({"value": "John"})).unwrap();
        assert!(matches!(neither.into_query(), Err(GraphError::Validation(_))));

        let both: QueryRequest = serde_json::from_value(
            json!({"cypher": "RETURN 1", "label": "Person", "property": "name"}),
        )
        .unwrap();
        assert!(matches!(both.into_query(), Err(GraphError::Validation(_))));

        let half: QueryRequest = serde_json::from_value(json!({"label": "Person"})).unwrap();
        assert!(matches!(half.into_query(), Err(GraphError::Validation(_))));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("Person"));
        assert!(is_identifier("WORKS_AT"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier("a`b"));
    }
}
