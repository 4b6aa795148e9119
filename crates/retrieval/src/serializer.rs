//! Context rendering for the answer prompt

use kgfusion_common::models::Subgraph;
use std::fmt::Write;

/// Rendered in place of an empty subgraph
pub const EMPTY_CONTEXT: &str = "No relevant information found in the knowledge graph.";

/// Render a subgraph as an entity-by-entity context block
///
/// Each entity is followed by the relations it is the source of. A relation
/// is listed under its source only, never under its target.
pub fn serialize_subgraph(subgraph: &Subgraph) -> String {
    if subgraph.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }

    let mut out = String::from("Found Entities and their relationships:\n");
    for entity in &subgraph.entities {
        let _ = writeln!(out, "\n- Entity: {} (Type: {})", entity.name, entity.label);
        for relation in subgraph
            .relations
            .iter()
            .filter(|r| r.source_name == entity.name)
        {
            let _ = writeln!(
                out,
                "  - [{}] --({})--> [{}]",
                relation.source_name, relation.rel_type, relation.target_name
            );
        }
    }
    out
}
