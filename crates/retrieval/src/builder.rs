//! Subgraph construction
//!
//! Three strategies per seed entity:
//! - one-hop: the seed and its direct neighbours
//! - multi-hop: everything on a path of at most `max_hops` edges
//! - importance: shortest paths from the seed to the graph-wide PageRank hubs
//!
//! The importance strategy ranks over a transient named projection that is
//! always dropped, including when the surrounding future is cancelled.

use crate::graph::{GraphFragment, GraphStore, SubgraphAssembler};
use futures::stream::{self, StreamExt};
use kgfusion_common::errors::Result;
use kgfusion_common::metrics;
use kgfusion_common::models::{Candidate, Strategy, Subgraph};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-pass traversal parameters
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub max_hops: u32,
    pub importance_top_k: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_hops: 10,
            importance_top_k: 5,
        }
    }
}

fn assemble(fragment: GraphFragment) -> Subgraph {
    let mut assembler = SubgraphAssembler::new();
    assembler.add_fragment(fragment);
    assembler.finish()
}

/// Builds candidate subgraphs from a graph store
pub struct SubgraphBuilder {
    store: Arc<dyn GraphStore>,
    projection_prefix: String,
}

impl SubgraphBuilder {
    pub fn new(store: Arc<dyn GraphStore>, projection_prefix: impl Into<String>) -> Self {
        Self {
            store,
            projection_prefix: projection_prefix.into(),
        }
    }

    /// The seed, every neighbour regardless of edge direction and the connecting edges
    pub async fn one_hop(&self, seed: &str) -> Result<Subgraph> {
        let fragment = self.store.one_hop(seed).await?;
        Ok(assemble(fragment))
    }

    /// Nodes and edges on any path of 1..=`max_hops` edges from the seed
    pub async fn multi_hop(&self, seed: &str, max_hops: u32) -> Result<Subgraph> {
        if max_hops == 0 {
            return Ok(Subgraph::new());
        }
        let fragment = self.store.paths_within(seed, max_hops).await?;
        Ok(assemble(fragment))
    }

    /// Union of shortest paths from the seed to the `top_k` PageRank hubs
    ///
    /// Only a failed projection create is returned as an error. Ranking and
    /// path failures are logged and produce an empty subgraph.
    pub async fn importance_based(&self, seed: &str, top_k: usize) -> Result<Subgraph> {
        let projection = format!("{}{}", self.projection_prefix, uuid::Uuid::new_v4());
        let guard = ProjectionGuard::acquire(Arc::clone(&self.store), projection).await?;

        let result = self.paths_to_hubs(seed, guard.name(), top_k).await;
        guard.release().await;

        match result {
            Ok(subgraph) => Ok(subgraph),
            Err(e) => {
                warn!(seed = seed, error = %e, "Importance-based expansion failed");
                Ok(Subgraph::new())
            }
        }
    }

    async fn paths_to_hubs(&self, seed: &str, projection: &str, top_k: usize) -> Result<Subgraph> {
        let hubs = self.store.page_rank(projection, top_k).await?;
        debug!(seed = seed, hubs = ?hubs, "Ranked hub entities");

        let mut assembler = SubgraphAssembler::new();
        for hub in hubs.iter().filter(|hub| hub.as_str() != seed) {
            let fragment = self.store.shortest_paths(seed, hub).await?;
            assembler.add_fragment(fragment);
        }
        Ok(assembler.finish())
    }

    /// All three strategies for one seed, in fixed strategy order
    ///
    /// A failing strategy is logged and leaves no candidate.
    pub async fn build_all(&self, seed: &str, options: BuildOptions) -> Vec<Candidate> {
        let (one_hop, multi_hop, importance) = tokio::join!(
            self.one_hop(seed),
            self.multi_hop(seed, options.max_hops),
            self.importance_based(seed, options.importance_top_k),
        );

        [
            (Strategy::OneHop, one_hop),
            (Strategy::MultiHop, multi_hop),
            (Strategy::Importance, importance),
        ]
        .into_iter()
        .filter_map(|(strategy, result)| match result {
            Ok(subgraph) => {
                info!(
                    seed = seed,
                    strategy = %strategy,
                    entities = subgraph.entity_count(),
                    relations = subgraph.relation_count(),
                    "Built candidate subgraph"
                );
                let outcome = if subgraph.is_empty() { "empty" } else { "built" };
                metrics::record_candidate(strategy.as_str(), outcome);
                Some(Candidate::new(seed, strategy, subgraph))
            }
            Err(e) => {
                warn!(seed = seed, strategy = %strategy, error = %e, "Strategy failed, skipping");
                metrics::record_candidate(strategy.as_str(), "failed");
                None
            }
        })
        .collect()
    }

    /// Candidates for every seed, in seed order
    ///
    /// Up to `concurrency` seeds are in flight at once. Returns nothing when
    /// cancelled before every seed finished.
    pub async fn build_seeds(
        &self,
        seeds: &[String],
        options: BuildOptions,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<Candidate> {
        let build = stream::iter(0..seeds.len())
            .map(move |i| self.build_all(&seeds[i], options))
            .buffered(concurrency.max(1))
            .collect::<Vec<_>>();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(seeds = seeds.len(), "Subgraph construction cancelled");
                Vec::new()
            }
            built = build => built.into_iter().flatten().collect(),
        }
    }
}

/// Owns a transient graph projection until it is dropped from the store
///
/// The guard exists before the create call, so a projection whose create was
/// in flight when the future was cancelled is still dropped. `release` drops
/// it inline and disarms only once that call returns. A guard dropped while
/// still armed hands the drop to a background task.
struct ProjectionGuard {
    store: Arc<dyn GraphStore>,
    name: Option<String>,
}

impl ProjectionGuard {
    async fn acquire(store: Arc<dyn GraphStore>, name: String) -> Result<Self> {
        let mut guard = Self {
            store,
            name: Some(name),
        };
        if let Err(e) = guard.store.create_projection(guard.name()).await {
            guard.name = None;
            return Err(e);
        }
        debug!(projection = guard.name(), "Created graph projection");
        Ok(guard)
    }

    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    async fn release(mut self) {
        if let Some(name) = self.name.clone() {
            drop_projection(self.store.as_ref(), &name).await;
            self.name = None;
        }
    }
}

impl Drop for ProjectionGuard {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    drop_projection(store.as_ref(), &name).await;
                });
            }
            Err(_) => {
                warn!(projection = %name, "No runtime available, graph projection left behind");
                metrics::record_projection_cleanup(false);
            }
        }
    }
}

async fn drop_projection(store: &dyn GraphStore, name: &str) {
    match store.drop_projection(name).await {
        Ok(()) => {
            debug!(projection = name, "Dropped graph projection");
            metrics::record_projection_cleanup(true);
        }
        Err(e) => {
            warn!(projection = name, error = %e, "Failed to drop graph projection");
            metrics::record_projection_cleanup(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory_tests::chain_graph;
    use crate::graph::MemoryGraphStore;
    use async_trait::async_trait;
    use kgfusion_common::errors::AppError;
    use kgfusion_common::models::Relation;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default, Clone, Copy)]
    enum Fault {
        #[default]
        None,
        OneHop,
        Projection,
        PageRank,
        Paths,
        HangPaths,
        HangCreate,
        SlowDrop,
    }

    /// Memory store with injectable faults that counts projection calls
    struct FaultyStore {
        inner: MemoryGraphStore,
        fault: Fault,
        created: AtomicUsize,
        dropped: AtomicUsize,
    }

    impl FaultyStore {
        fn new(fault: Fault) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryGraphStore::new(chain_graph()),
                fault,
                created: AtomicUsize::new(0),
                dropped: AtomicUsize::new(0),
            })
        }

        fn fail(what: &str) -> AppError {
            AppError::GraphStore {
                message: format!("injected {} failure", what),
            }
        }
    }

    #[async_trait]
    impl GraphStore for FaultyStore {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn one_hop(&self, name: &str) -> Result<GraphFragment> {
            if matches!(self.fault, Fault::OneHop) {
                return Err(Self::fail("one-hop"));
            }
            self.inner.one_hop(name).await
        }

        async fn paths_within(&self, name: &str, max_hops: u32) -> Result<GraphFragment> {
            self.inner.paths_within(name, max_hops).await
        }

        async fn create_projection(&self, projection: &str) -> Result<()> {
            if matches!(self.fault, Fault::Projection) {
                return Err(Self::fail("projection"));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            self.inner.create_projection(projection).await?;
            if matches!(self.fault, Fault::HangCreate) {
                // Created on the store, but the reply never arrives
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn drop_projection(&self, projection: &str) -> Result<()> {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            if matches!(self.fault, Fault::SlowDrop) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.inner.drop_projection(projection).await
        }

        async fn page_rank(&self, projection: &str, top_k: usize) -> Result<Vec<String>> {
            if matches!(self.fault, Fault::PageRank) {
                return Err(Self::fail("page rank"));
            }
            self.inner.page_rank(projection, top_k).await
        }

        async fn shortest_paths(&self, from: &str, to: &str) -> Result<GraphFragment> {
            match self.fault {
                Fault::Paths => Err(Self::fail("path")),
                Fault::HangPaths => std::future::pending().await,
                _ => self.inner.shortest_paths(from, to).await,
            }
        }
    }

    fn builder(store: &Arc<FaultyStore>) -> SubgraphBuilder {
        SubgraphBuilder::new(store.clone(), "test-graph-")
    }

    #[tokio::test]
    async fn test_one_hop_of_isolated_entity() {
        let store = FaultyStore::new(Fault::None);
        let subgraph = builder(&store).one_hop("Lonely").await.unwrap();
        assert_eq!(subgraph.entity_count(), 1);
        assert_eq!(subgraph.relation_count(), 0);
    }

    #[tokio::test]
    async fn test_multi_hop_with_zero_hops_is_empty() {
        let store = FaultyStore::new(Fault::None);
        let subgraph = builder(&store).multi_hop("A", 0).await.unwrap();
        assert!(subgraph.is_empty());
    }

    #[tokio::test]
    async fn test_importance_follows_paths_to_hubs() {
        let store = FaultyStore::new(Fault::None);
        let subgraph = builder(&store).importance_based("A", 1).await.unwrap();

        let names: Vec<&str> = subgraph.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(
            subgraph.relations,
            vec![Relation::new("A", "B", "R1"), Relation::new("B", "C", "R2")]
        );
        assert_eq!(store.dropped.load(Ordering::SeqCst), 1);
        assert!(store.inner.projection_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_importance_skips_seed_as_hub() {
        let store = FaultyStore::new(Fault::None);
        // C is the top hub; from C itself there is nothing to walk to
        let subgraph = builder(&store).importance_based("C", 1).await.unwrap();
        assert!(subgraph.is_empty());
    }

    #[tokio::test]
    async fn test_path_failure_still_drops_projection_once() {
        let store = FaultyStore::new(Fault::Paths);
        let subgraph = builder(&store).importance_based("A", 3).await.unwrap();

        assert!(subgraph.is_empty());
        assert_eq!(store.created.load(Ordering::SeqCst), 1);
        assert_eq!(store.dropped.load(Ordering::SeqCst), 1);
        assert!(store.inner.projection_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_ranking_failure_still_drops_projection_once() {
        let store = FaultyStore::new(Fault::PageRank);
        let subgraph = builder(&store).importance_based("A", 3).await.unwrap();

        assert!(subgraph.is_empty());
        assert_eq!(store.dropped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_projection_failure_is_an_error_without_cleanup() {
        let store = FaultyStore::new(Fault::Projection);
        assert!(builder(&store).importance_based("A", 3).await.is_err());
        assert_eq!(store.dropped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_importance_drops_projection_once() {
        let store = FaultyStore::new(Fault::HangPaths);
        let builder = builder(&store);

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            builder.importance_based("A", 3),
        )
        .await;
        assert!(outcome.is_err(), "path search should still be pending");

        // The guard hands cleanup to a spawned task
        for _ in 0..10 {
            if store.dropped.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.dropped.load(Ordering::SeqCst), 1);
        assert!(store.inner.projection_names().await.is_empty());
    }

    async fn wait_for_no_projections(store: &FaultyStore) -> Vec<String> {
        for _ in 0..50 {
            if store.inner.projection_names().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store.inner.projection_names().await
    }

    #[tokio::test]
    async fn test_cancelled_during_release_still_drops_projection() {
        let store = FaultyStore::new(Fault::SlowDrop);
        let builder = builder(&store);

        let outcome =
            tokio::time::timeout(Duration::from_millis(30), builder.importance_based("A", 1)).await;
        assert!(outcome.is_err(), "projection drop should still be in flight");

        assert!(wait_for_no_projections(&store).await.is_empty());
        assert!(store.dropped.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_cancelled_during_create_still_drops_projection() {
        let store = FaultyStore::new(Fault::HangCreate);
        let builder = builder(&store);

        let outcome =
            tokio::time::timeout(Duration::from_millis(30), builder.importance_based("A", 1)).await;
        assert!(outcome.is_err(), "projection create should still be pending");
        assert_eq!(store.created.load(Ordering::SeqCst), 1);

        assert!(wait_for_no_projections(&store).await.is_empty());
        assert_eq!(store.dropped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_importance_calls_use_distinct_projections() {
        let store = FaultyStore::new(Fault::None);
        let builder = builder(&store);

        let (a, b) = tokio::join!(builder.importance_based("A", 1), builder.importance_based("D", 1));
        assert!(!a.unwrap().is_empty());
        assert!(!b.unwrap().is_empty());
        assert_eq!(store.created.load(Ordering::SeqCst), 2);
        assert_eq!(store.dropped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_build_all_skips_failed_strategy() {
        let store = FaultyStore::new(Fault::OneHop);
        let candidates = builder(&store).build_all("A", BuildOptions::default()).await;

        let strategies: Vec<Strategy> = candidates.iter().map(|c| c.strategy).collect();
        assert_eq!(strategies, vec![Strategy::MultiHop, Strategy::Importance]);
    }

    #[tokio::test]
    async fn test_build_seeds_keeps_seed_then_strategy_order() {
        let store = FaultyStore::new(Fault::None);
        let seeds = vec!["D".to_string(), "A".to_string()];
        let candidates = builder(&store)
            .build_seeds(&seeds, BuildOptions::default(), 2, &CancellationToken::new())
            .await;

        let order: Vec<(&str, Strategy)> = candidates
            .iter()
            .map(|c| (c.seed.as_str(), c.strategy))
            .collect();
        assert_eq!(
            order,
            vec![
                ("D", Strategy::OneHop),
                ("D", Strategy::MultiHop),
                ("D", Strategy::Importance),
                ("A", Strategy::OneHop),
                ("A", Strategy::MultiHop),
                ("A", Strategy::Importance),
            ]
        );
    }

    #[tokio::test]
    async fn test_build_seeds_returns_nothing_when_cancelled() {
        let store = FaultyStore::new(Fault::None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let candidates = builder(&store)
            .build_seeds(&["A".to_string()], BuildOptions::default(), 1, &cancel)
            .await;
        assert!(candidates.is_empty());
    }
}
