//! In-process graph store
//!
//! Adjacency-list graph with the same query surface as the Neo4j store. Used
//! for offline runs (loaded from a JSON snapshot) and in tests.

use super::fragment::{EdgeRecord, GraphFragment};
use super::pagerank::PageRankScorer;
use super::{graph_error, GraphStore};
use async_trait::async_trait;
use kgfusion_common::errors::{AppError, Result};
use kgfusion_common::models::{Entity, PropertyMap};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct StoredEdge {
    id: String,
    source: usize,
    target: usize,
    rel_type: String,
}

/// Directed multigraph keyed by entity identity
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    nodes: Vec<Entity>,
    by_id: HashMap<String, usize>,
    edges: Vec<StoredEdge>,
    /// node -> indices of edges leaving it
    outgoing: Vec<Vec<usize>>,
    /// node -> indices of edges entering it
    incoming: Vec<Vec<usize>>,
}

/// Breadth-first search state from a set of source nodes
struct Bfs {
    dist: Vec<Option<u32>>,
    /// node -> (edge, previous node) pairs lying on a shortest path
    preds: Vec<Vec<(usize, usize)>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity; an entity with a known id is ignored
    pub fn add_entity(&mut self, entity: Entity) -> usize {
        if let Some(&index) = self.by_id.get(&entity.id) {
            return index;
        }
        let index = self.nodes.len();
        self.by_id.insert(entity.id.clone(), index);
        self.nodes.push(entity);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        index
    }

    /// Insert a directed relation; endpoints resolve by name, then by id
    pub fn add_relation(&mut self, source: &str, target: &str, rel_type: &str) -> Result<()> {
        let resolve = |key: &str| {
            self.find_by_name(key)
                .or_else(|| self.by_id.get(key).copied())
                .ok_or_else(|| graph_error(format!("unknown relation endpoint '{}'", key)))
        };
        let source = resolve(source)?;
        let target = resolve(target)?;

        let index = self.edges.len();
        self.edges.push(StoredEdge {
            id: format!("e{}", index),
            source,
            target,
            rel_type: rel_type.to_string(),
        });
        self.outgoing[source].push(index);
        self.incoming[target].push(index);
        Ok(())
    }

    pub fn nodes(&self) -> &[Entity] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// First node carrying `name`
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    fn nodes_named(&self, name: &str) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.name == name)
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn out_degree(&self, node: usize) -> usize {
        self.outgoing[node].len()
    }

    pub(crate) fn in_sources(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.incoming[node].iter().map(|&e| self.edges[e].source)
    }

    /// Incident edges in either direction as (edge, other endpoint)
    fn neighbours(&self, node: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let out = self.outgoing[node].iter().map(|&e| (e, self.edges[e].target));
        let inc = self.incoming[node].iter().map(|&e| (e, self.edges[e].source));
        out.chain(inc)
    }

    fn bfs(&self, sources: &[usize]) -> Bfs {
        let mut dist = vec![None; self.nodes.len()];
        let mut preds = vec![Vec::new(); self.nodes.len()];
        let mut queue = VecDeque::new();

        for &s in sources {
            dist[s] = Some(0);
            queue.push_back(s);
        }

        while let Some(current) = queue.pop_front() {
            let Some(d) = dist[current] else { continue };
            for (edge, next) in self.neighbours(current) {
                match dist[next] {
                    None => {
                        dist[next] = Some(d + 1);
                        preds[next].push((edge, current));
                        queue.push_back(next);
                    }
                    Some(nd) if nd == d + 1 => preds[next].push((edge, current)),
                    Some(_) => {}
                }
            }
        }

        Bfs { dist, preds }
    }

    fn edge_record(&self, index: usize) -> EdgeRecord {
        let edge = &self.edges[index];
        EdgeRecord::new(
            edge.id.clone(),
            self.nodes[edge.source].id.clone(),
            self.nodes[edge.target].id.clone(),
            edge.rel_type.clone(),
        )
    }

    fn fragment(&self, nodes: impl IntoIterator<Item = usize>, edges: impl IntoIterator<Item = usize>) -> GraphFragment {
        GraphFragment {
            nodes: nodes.into_iter().map(|i| self.nodes[i].clone()).collect(),
            edges: edges.into_iter().map(|e| self.edge_record(e)).collect(),
        }
    }

    pub fn one_hop(&self, name: &str) -> GraphFragment {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        for seed in self.nodes_named(name) {
            nodes.push(seed);
            for (edge, other) in self.neighbours(seed) {
                nodes.push(other);
                edges.push(edge);
            }
        }

        self.fragment(nodes, edges)
    }

    pub fn paths_within(&self, name: &str, max_hops: u32) -> GraphFragment {
        let seeds = self.nodes_named(name);
        if max_hops == 0 || seeds.is_empty() {
            return GraphFragment::default();
        }

        let Bfs { dist, .. } = self.bfs(&seeds);

        let reachable = dist.iter().any(|d| matches!(d, Some(d) if (1..=max_hops).contains(d)));
        if !reachable {
            return GraphFragment::default();
        }

        let mut nodes: Vec<(u32, usize)> = dist
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.filter(|d| *d <= max_hops).map(|d| (d, i)))
            .collect();
        nodes.sort();

        // An edge lies on some walk of length <= max_hops from the seed iff
        // its nearer endpoint is strictly closer than max_hops. A loop on the
        // seed also needs room for one more hop away from it, since a path
        // may not end where it started.
        let has_neighbour = dist.iter().any(|d| *d == Some(1));
        let edges = self.edges.iter().enumerate().filter_map(|(i, e)| {
            let near = match (dist[e.source], dist[e.target]) {
                (Some(a), Some(b)) => a.min(b),
                _ => return None,
            };
            if e.source == e.target && near == 0 {
                return (max_hops >= 2 && has_neighbour).then_some(i);
            }
            (near < max_hops).then_some(i)
        });

        self.fragment(nodes.into_iter().map(|(_, i)| i), edges.collect::<Vec<_>>())
    }

    pub fn shortest_paths(&self, from: &str, to: &str) -> GraphFragment {
        let sources = self.nodes_named(from);
        let targets: Vec<usize> = self
            .nodes_named(to)
            .into_iter()
            .filter(|t| !sources.contains(t))
            .collect();
        if sources.is_empty() || targets.is_empty() {
            return GraphFragment::default();
        }

        let Bfs { dist, preds } = self.bfs(&sources);

        let mut on_path = vec![false; self.nodes.len()];
        let mut edges = Vec::new();
        let mut stack: Vec<usize> = targets.into_iter().filter(|t| dist[*t].is_some()).collect();
        for &t in &stack {
            on_path[t] = true;
        }

        while let Some(node) = stack.pop() {
            for &(edge, prev) in &preds[node] {
                edges.push(edge);
                if !on_path[prev] {
                    on_path[prev] = true;
                    stack.push(prev);
                }
            }
        }

        if edges.is_empty() {
            return GraphFragment::default();
        }

        let mut nodes: Vec<(u32, usize)> = on_path
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .filter_map(|(i, _)| dist[i].map(|d| (d, i)))
            .collect();
        nodes.sort();
        edges.sort_unstable();
        edges.dedup();

        self.fragment(nodes.into_iter().map(|(_, i)| i), edges)
    }
}

/// JSON snapshot of a graph
///
/// Accepts snake_case keys as well as the `ID`/`Name`/`Label`/`Properties` and
/// `SourceName`/`TargetName`/`Type` keys produced by LLM entity extraction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub entities: Vec<SnapshotEntity>,
    #[serde(default)]
    pub relations: Vec<SnapshotRelation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotEntity {
    #[serde(alias = "ID")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Label", default)]
    pub label: String,
    #[serde(alias = "Properties", default)]
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRelation {
    #[serde(alias = "SourceName")]
    pub source_name: String,
    #[serde(alias = "TargetName")]
    pub target_name: String,
    #[serde(rename = "type", alias = "Type")]
    pub rel_type: String,
}

impl From<GraphSnapshot> for MemoryGraph {
    fn from(snapshot: GraphSnapshot) -> Self {
        let mut graph = MemoryGraph::new();
        for e in snapshot.entities {
            graph.add_entity(Entity::new(e.id, e.name, e.label).with_properties(e.properties));
        }
        for r in snapshot.relations {
            if let Err(e) = graph.add_relation(&r.source_name, &r.target_name, &r.rel_type) {
                warn!(error = %e, rel_type = %r.rel_type, "Skipping snapshot relation");
            }
        }
        graph
    }
}

/// [`GraphStore`] over a [`MemoryGraph`]
pub struct MemoryGraphStore {
    graph: Arc<MemoryGraph>,
    projections: RwLock<HashMap<String, Arc<MemoryGraph>>>,
    scorer: PageRankScorer,
}

impl MemoryGraphStore {
    pub fn new(graph: MemoryGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            projections: RwLock::new(HashMap::new()),
            scorer: PageRankScorer::default(),
        }
    }

    /// Load a [`GraphSnapshot`] JSON file
    pub async fn from_snapshot_file(path: &str) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| AppError::Configuration {
            message: format!("Failed to read graph snapshot '{}': {}", path, e),
        })?;
        let snapshot: GraphSnapshot = serde_json::from_str(&raw)?;
        let graph = MemoryGraph::from(snapshot);

        info!(
            path = path,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Loaded graph snapshot"
        );
        Ok(Self::new(graph))
    }

    pub fn graph(&self) -> &MemoryGraph {
        &self.graph
    }

    /// Names of projections currently alive
    pub async fn projection_names(&self) -> Vec<String> {
        self.projections.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn one_hop(&self, name: &str) -> Result<GraphFragment> {
        Ok(self.graph.one_hop(name))
    }

    async fn paths_within(&self, name: &str, max_hops: u32) -> Result<GraphFragment> {
        Ok(self.graph.paths_within(name, max_hops))
    }

    async fn create_projection(&self, projection: &str) -> Result<()> {
        let mut projections = self.projections.write().await;
        if projections.contains_key(projection) {
            return Err(graph_error(format!("projection '{}' already exists", projection)));
        }
        projections.insert(projection.to_string(), Arc::clone(&self.graph));
        Ok(())
    }

    async fn drop_projection(&self, projection: &str) -> Result<()> {
        self.projections.write().await.remove(projection);
        Ok(())
    }

    async fn page_rank(&self, projection: &str, top_k: usize) -> Result<Vec<String>> {
        let graph = self
            .projections
            .read()
            .await
            .get(projection)
            .cloned()
            .ok_or_else(|| graph_error(format!("projection '{}' does not exist", projection)))?;

        Ok(self
            .scorer
            .rank(&graph, top_k)
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    async fn shortest_paths(&self, from: &str, to: &str) -> Result<GraphFragment> {
        Ok(self.graph.shortest_paths(from, to))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::graph::SubgraphAssembler;
    use kgfusion_common::models::{Relation, Subgraph};

    /// Chain A - B - C - D plus an isolated node
    pub(crate) fn chain_graph() -> MemoryGraph {
        let mut g = MemoryGraph::new();
        for (id, name) in [("1", "A"), ("2", "B"), ("3", "C"), ("4", "D"), ("5", "Lonely")] {
            g.add_entity(Entity::new(id, name, "Node"));
        }
        g.add_relation("A", "B", "R1").unwrap();
        g.add_relation("B", "C", "R2").unwrap();
        g.add_relation("D", "C", "R3").unwrap();
        g
    }

    fn assemble(fragment: GraphFragment) -> Subgraph {
        let mut assembler = SubgraphAssembler::new();
        assembler.add_fragment(fragment);
        assembler.finish()
    }

    fn names(subgraph: &Subgraph) -> Vec<&str> {
        subgraph.entities.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_one_hop_ignores_direction() {
        let subgraph = assemble(chain_graph().one_hop("C"));
        assert_eq!(names(&subgraph), vec!["C", "B", "D"]);
        assert_eq!(
            subgraph.relations,
            vec![Relation::new("B", "C", "R2"), Relation::new("D", "C", "R3")]
        );
    }

    #[test]
    fn test_one_hop_isolated_and_missing() {
        let g = chain_graph();
        let lonely = assemble(g.one_hop("Lonely"));
        assert_eq!(lonely.entity_count(), 1);
        assert_eq!(lonely.relation_count(), 0);

        assert!(g.one_hop("Nobody").is_empty());
    }

    #[test]
    fn test_paths_within_bounds() {
        let g = chain_graph();

        let two = assemble(g.paths_within("A", 2));
        assert_eq!(names(&two), vec!["A", "B", "C"]);
        assert_eq!(two.relation_count(), 2);

        let all = assemble(g.paths_within("A", 10));
        assert_eq!(all.entity_count(), 4);
        assert_eq!(all.relation_count(), 3);

        assert!(g.paths_within("A", 0).is_empty());
        assert!(g.paths_within("Lonely", 3).is_empty());
    }

    #[test]
    fn test_paths_within_needs_room_past_a_seed_loop() {
        let mut g = chain_graph();
        g.add_relation("A", "A", "SELF").unwrap();

        let one = assemble(g.paths_within("A", 1));
        assert_eq!(names(&one), vec!["A", "B"]);
        assert_eq!(one.relations, vec![Relation::new("A", "B", "R1")]);

        let two = assemble(g.paths_within("A", 2));
        assert!(two.relations.contains(&Relation::new("A", "A", "SELF")));

        let mut lone = MemoryGraph::new();
        lone.add_entity(Entity::new("1", "Solo", "Node"));
        lone.add_relation("Solo", "Solo", "SELF").unwrap();
        assert!(lone.paths_within("Solo", 5).is_empty());
    }

    #[test]
    fn test_shortest_paths_collects_all_ties() {
        // Diamond: S - X - T and S - Y - T, plus a longer detour S - P - Q - T
        let mut g = MemoryGraph::new();
        for name in ["S", "X", "Y", "T", "P", "Q"] {
            g.add_entity(Entity::new(name, name, "Node"));
        }
        for (a, b) in [("S", "X"), ("X", "T"), ("S", "Y"), ("T", "Y"), ("S", "P"), ("P", "Q"), ("Q", "T")] {
            g.add_relation(a, b, "R").unwrap();
        }

        let subgraph = assemble(g.shortest_paths("S", "T"));
        let mut found = names(&subgraph);
        found.sort();
        assert_eq!(found, vec!["S", "T", "X", "Y"]);
        assert_eq!(subgraph.relation_count(), 4);
    }

    #[test]
    fn test_shortest_paths_unreachable_or_same() {
        let g = chain_graph();
        assert!(g.shortest_paths("A", "Lonely").is_empty());
        assert!(g.shortest_paths("A", "A").is_empty());
    }

    #[test]
    fn test_snapshot_accepts_extraction_format() {
        let raw = r#"{
            "entities": [
                {"ID": "son_heung_min", "Name": "Son", "Label": "Player", "Embedding": [],
                 "Properties": {"Goals": 178, "League": null}},
                {"ID": "tottenham_hotspur", "Name": "Tottenham", "Label": "Team", "Properties": {}}
            ],
            "relations": [
                {"SourceName": "son_heung_min", "TargetName": "tottenham_hotspur", "Type": "PLAYS_FOR"},
                {"SourceName": "son_heung_min", "TargetName": "nowhere", "Type": "LOST"}
            ]
        }"#;
        let snapshot: GraphSnapshot = serde_json::from_str(raw).unwrap();
        let g = MemoryGraph::from(snapshot);

        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
        let subgraph = assemble(g.one_hop("Son"));
        assert_eq!(subgraph.relations, vec![Relation::new("Son", "Tottenham", "PLAYS_FOR")]);
    }

    #[tokio::test]
    async fn test_projection_lifecycle() {
        let store = MemoryGraphStore::new(chain_graph());

        store.create_projection("p1").await.unwrap();
        assert!(store.create_projection("p1").await.is_err());

        let top = store.page_rank("p1", 1).await.unwrap();
        assert_eq!(top, vec!["C"]);

        store.drop_projection("p1").await.unwrap();
        store.drop_projection("p1").await.unwrap();
        assert!(store.projection_names().await.is_empty());
        assert!(store.page_rank("p1", 1).await.is_err());
    }
}
