//! Entities, relations and subgraphs

use super::value::PropertyMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node projected out of the graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identity assigned by the originating store
    pub id: String,

    /// Human-meaningful join key shared by the graph and vector stores
    pub name: String,

    /// Type tag, e.g. "Player" or "Event"
    pub label: String,

    #[serde(default)]
    pub properties: PropertyMap,

    /// Present only for vectorized entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            label: label.into(),
            properties: PropertyMap::new(),
            embedding: None,
        }
    }

    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.properties = properties;
        self
    }

    /// Text used when embedding this entity: the name followed by `key: value` pairs
    pub fn embedding_text(&self) -> String {
        let props: Vec<String> = self
            .properties
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();

        if props.is_empty() {
            self.name.clone()
        } else {
            format!("{}, {}", self.name, props.join(", "))
        }
    }
}

/// A directed, typed edge between two entities, addressed by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source_name: String,
    pub target_name: String,
    #[serde(rename = "type")]
    pub rel_type: String,
}

impl Relation {
    pub fn new(
        source_name: impl Into<String>,
        target_name: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            target_name: target_name.into(),
            rel_type: rel_type.into(),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source_name, self.rel_type, self.target_name)
    }
}

/// A slice of the knowledge graph
///
/// Entities are unique by store identity; relations keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

impl Subgraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subgraph with no entities carries no context
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }
}

/// Score assigned to one candidate subgraph by the evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: f64,
    #[serde(default)]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropertyValue;

    #[test]
    fn test_embedding_text_skips_null_properties() {
        let mut props = PropertyMap::new();
        props.insert("goals".into(), PropertyValue::Int(178));
        props.insert("league".into(), PropertyValue::Null);
        let entity = Entity::new("1", "Son", "Player").with_properties(props);

        assert_eq!(entity.embedding_text(), "Son, goals: 178");
        assert_eq!(Entity::new("2", "LAFC", "Team").embedding_text(), "LAFC");
    }

    #[test]
    fn test_relation_display() {
        let rel = Relation::new("A", "B", "PLAYS_FOR");
        assert_eq!(rel.to_string(), "A -[PLAYS_FOR]-> B");
    }

    #[test]
    fn test_relation_serializes_type_field() {
        let rel = Relation::new("A", "B", "PLAYS_FOR");
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(json["type"], "PLAYS_FOR");
    }

    #[test]
    fn test_empty_subgraph() {
        let subgraph = Subgraph::new();
        assert!(subgraph.is_empty());
        assert_eq!(subgraph.relation_count(), 0);
    }
}
