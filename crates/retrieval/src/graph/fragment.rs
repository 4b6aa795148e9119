//! Raw traversal results and subgraph assembly

use kgfusion_common::models::{Entity, Relation, Subgraph};
use std::collections::{HashMap, HashSet};

/// An edge as returned by the store, endpoints given by node identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub id: String,
    pub start: String,
    pub end: String,
    pub rel_type: String,
}

impl EdgeRecord {
    pub fn new(
        id: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            start: start.into(),
            end: end.into(),
            rel_type: rel_type.into(),
        }
    }
}

/// Nodes and edges produced by one store query
///
/// May contain repeats: path queries return the same node once per path.
#[derive(Debug, Clone, Default)]
pub struct GraphFragment {
    pub nodes: Vec<Entity>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphFragment {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builds a [`Subgraph`] from one or more fragments
///
/// Entities are unique by store identity and keep first-seen order. Edges are
/// unique by edge identity. Edges whose endpoints are not both present are
/// dropped when the subgraph is finished.
#[derive(Debug, Default)]
pub struct SubgraphAssembler {
    entities: Vec<Entity>,
    by_id: HashMap<String, usize>,
    edges: Vec<EdgeRecord>,
    seen_edges: HashSet<String>,
}

impl SubgraphAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, entity: Entity) {
        if self.by_id.contains_key(&entity.id) {
            return;
        }
        self.by_id.insert(entity.id.clone(), self.entities.len());
        self.entities.push(entity);
    }

    pub fn add_edge(&mut self, edge: EdgeRecord) {
        if self.seen_edges.insert(edge.id.clone()) {
            self.edges.push(edge);
        }
    }

    pub fn add_fragment(&mut self, fragment: GraphFragment) {
        for node in fragment.nodes {
            self.add_entity(node);
        }
        for edge in fragment.edges {
            self.add_edge(edge);
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn finish(self) -> Subgraph {
        let relations = self
            .edges
            .iter()
            .filter_map(|edge| {
                let source = self.by_id.get(&edge.start)?;
                let target = self.by_id.get(&edge.end)?;
                Some(Relation::new(
                    self.entities[*source].name.clone(),
                    self.entities[*target].name.clone(),
                    edge.rel_type.clone(),
                ))
            })
            .collect();

        Subgraph {
            entities: self.entities,
            relations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entities_dedup_by_identity_not_name() {
        let mut assembler = SubgraphAssembler::new();
        assembler.add_entity(Entity::new("1", "Son", "Player"));
        assembler.add_entity(Entity::new("1", "Son", "Player"));
        assembler.add_entity(Entity::new("7", "Son", "Event"));

        let subgraph = assembler.finish();
        assert_eq!(subgraph.entity_count(), 2);
        assert_eq!(subgraph.entities[1].label, "Event");
    }

    #[test]
    fn test_dangling_edges_are_dropped() {
        let mut assembler = SubgraphAssembler::new();
        assembler.add_fragment(GraphFragment {
            nodes: vec![Entity::new("1", "A", "Player"), Entity::new("2", "B", "Team")],
            edges: vec![
                EdgeRecord::new("e1", "1", "2", "PLAYS_FOR"),
                EdgeRecord::new("e2", "1", "99", "KNOWS"),
            ],
        });

        let subgraph = assembler.finish();
        assert_eq!(subgraph.relations, vec![Relation::new("A", "B", "PLAYS_FOR")]);
    }

    #[test]
    fn test_repeated_edges_across_fragments() {
        let path = GraphFragment {
            nodes: vec![Entity::new("1", "A", "X"), Entity::new("2", "B", "X")],
            edges: vec![EdgeRecord::new("e1", "1", "2", "R")],
        };

        let mut assembler = SubgraphAssembler::new();
        assembler.add_fragment(path.clone());
        assembler.add_fragment(path);

        let subgraph = assembler.finish();
        assert_eq!(subgraph.entity_count(), 2);
        assert_eq!(subgraph.relation_count(), 1);
    }
}
