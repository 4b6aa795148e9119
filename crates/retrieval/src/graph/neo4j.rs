//! Neo4j graph store over the HTTP transactional endpoint
//!
//! Every data value is a bound parameter. The only text spliced into Cypher
//! is the validated name property key and the integer hop bound.

use super::fragment::{EdgeRecord, GraphFragment};
use super::identifier::validate_identifier;
use super::{graph_error, GraphStore};
use async_trait::async_trait;
use kgfusion_common::config::GraphConfig;
use kgfusion_common::errors::{AppError, Result};
use kgfusion_common::models::{Entity, PropertyMap, PropertyValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Serialize)]
struct TxRequest<'a> {
    statements: Vec<TxStatement<'a>>,
}

#[derive(Serialize)]
struct TxStatement<'a> {
    statement: &'a str,
    parameters: Value,
    #[serde(rename = "resultDataContents")]
    result_data_contents: [&'static str; 1],
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxData>,
}

#[derive(Deserialize)]
struct TxData {
    #[serde(default)]
    row: Vec<Value>,
    #[serde(default)]
    graph: Option<TxGraph>,
}

#[derive(Deserialize)]
struct TxGraph {
    #[serde(default)]
    nodes: Vec<TxNode>,
    #[serde(default)]
    relationships: Vec<TxRelationship>,
}

#[derive(Deserialize)]
struct TxNode {
    id: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
struct TxRelationship {
    id: String,
    #[serde(rename = "type")]
    rel_type: String,
    #[serde(rename = "startNode")]
    start_node: String,
    #[serde(rename = "endNode")]
    end_node: String,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

#[derive(Clone, Copy)]
enum ResultFormat {
    Graph,
    Row,
}

impl ResultFormat {
    fn as_str(self) -> &'static str {
        match self {
            ResultFormat::Graph => "graph",
            ResultFormat::Row => "row",
        }
    }
}

/// Neo4j client speaking the `/db/{database}/tx/commit` API
pub struct Neo4jGraphStore {
    client: reqwest::Client,
    endpoint: String,
    user: String,
    password: Option<String>,
    name_property: String,
}

impl Neo4jGraphStore {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let name_property = validate_identifier(&config.name_property)?.to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/db/{}/tx/commit",
                config.url.trim_end_matches('/'),
                config.database
            ),
            user: config.user.clone(),
            password: config.password.clone(),
            name_property,
        })
    }

    async fn run(&self, statement: &str, parameters: Value, format: ResultFormat) -> Result<Vec<TxData>> {
        let started = Instant::now();
        let request = TxRequest {
            statements: vec![TxStatement {
                statement,
                parameters,
                result_data_contents: [format.as_str()],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, self.password.as_deref())
            .json(&request)
            .send()
            .await
            .map_err(|e| graph_error(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(graph_error(format!("HTTP {}: {}", status, body)));
        }

        let body: TxResponse = response
            .json()
            .await
            .map_err(|e| graph_error(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = body.errors.first() {
            return Err(graph_error(format!("{}: {}", error.code, error.message)));
        }

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cypher statement completed"
        );

        Ok(body.results.into_iter().flat_map(|r| r.data).collect())
    }

    async fn run_graph(&self, statement: &str, parameters: Value) -> Result<GraphFragment> {
        let data = self.run(statement, parameters, ResultFormat::Graph).await?;
        Ok(self.fragment_from(data))
    }

    fn fragment_from(&self, data: Vec<TxData>) -> GraphFragment {
        let mut fragment = GraphFragment::default();

        for graph in data.into_iter().filter_map(|d| d.graph) {
            for node in graph.nodes {
                fragment.nodes.push(self.entity_from(node));
            }
            for rel in graph.relationships {
                fragment
                    .edges
                    .push(EdgeRecord::new(rel.id, rel.start_node, rel.end_node, rel.rel_type));
            }
        }

        fragment
    }

    fn entity_from(&self, node: TxNode) -> Entity {
        let properties: PropertyMap = node
            .properties
            .into_iter()
            .map(|(k, v)| (k, PropertyValue::from(v)))
            .collect();

        let name = properties
            .get(&self.name_property)
            .and_then(PropertyValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| node.id.clone());
        let label = node.labels.into_iter().next().unwrap_or_default();

        Entity::new(node.id, name, label).with_properties(properties)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ping(&self) -> Result<()> {
        self.run("RETURN 1", json!({}), ResultFormat::Row).await?;
        Ok(())
    }

    async fn one_hop(&self, name: &str) -> Result<GraphFragment> {
        let statement = format!(
            "MATCH (e {{`{prop}`: $name}}) OPTIONAL MATCH (e)-[r]-(n) RETURN e, r, n",
            prop = self.name_property
        );
        self.run_graph(&statement, json!({ "name": name })).await
    }

    async fn paths_within(&self, name: &str, max_hops: u32) -> Result<GraphFragment> {
        if max_hops == 0 {
            return Ok(GraphFragment::default());
        }
        let statement = format!(
            "MATCH p = (e {{`{prop}`: $name}})-[*1..{max_hops}]-(n) WHERE e <> n RETURN p",
            prop = self.name_property,
            max_hops = max_hops
        );
        self.run_graph(&statement, json!({ "name": name })).await
    }

    async fn create_projection(&self, projection: &str) -> Result<()> {
        self.run(
            "CALL gds.graph.project($graphName, '*', '*') YIELD graphName RETURN graphName",
            json!({ "graphName": projection }),
            ResultFormat::Row,
        )
        .await?;
        Ok(())
    }

    async fn drop_projection(&self, projection: &str) -> Result<()> {
        self.run(
            "CALL gds.graph.exists($graphName) YIELD exists WHERE exists \
             CALL gds.graph.drop($graphName, false) YIELD graphName RETURN graphName",
            json!({ "graphName": projection }),
            ResultFormat::Row,
        )
        .await?;
        Ok(())
    }

    async fn page_rank(&self, projection: &str, top_k: usize) -> Result<Vec<String>> {
        let statement = format!(
            "CALL gds.pageRank.stream($graphName) YIELD nodeId, score \
             WITH gds.util.asNode(nodeId) AS node, score \
             ORDER BY score DESC LIMIT $topK \
             RETURN node.`{prop}` AS name",
            prop = self.name_property
        );
        let rows = self
            .run(
                &statement,
                json!({ "graphName": projection, "topK": top_k }),
                ResultFormat::Row,
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|d| d.row.into_iter().next())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    async fn shortest_paths(&self, from: &str, to: &str) -> Result<GraphFragment> {
        let statement = format!(
            "MATCH (s {{`{prop}`: $from}}), (t {{`{prop}`: $to}}) WHERE s <> t \
             MATCH p = allShortestPaths((s)-[*]-(t)) RETURN p",
            prop = self.name_property
        );
        self.run_graph(&statement, json!({ "from": from, "to": to })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(url: String) -> Neo4jGraphStore {
        Neo4jGraphStore::new(&GraphConfig {
            url,
            password: Some("secret".to_string()),
            ..GraphConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_unsafe_name_property() {
        let config = GraphConfig {
            name_property: "name}) DETACH DELETE (x".to_string(),
            ..GraphConfig::default()
        };
        assert!(matches!(
            Neo4jGraphStore::new(&config),
            Err(AppError::InvalidIdentifier { .. })
        ));
    }

    #[tokio::test]
    async fn test_one_hop_parses_graph_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({
                "statements": [{"parameters": {"name": "Son"}, "resultDataContents": ["graph"]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "columns": ["e", "r", "n"],
                    "data": [{
                        "graph": {
                            "nodes": [
                                {"id": "1", "labels": ["Player"], "properties": {"name": "Son", "goals": 178}},
                                {"id": "2", "labels": ["Team"], "properties": {"name": "LAFC"}}
                            ],
                            "relationships": [
                                {"id": "10", "type": "PLAYS_FOR", "startNode": "1", "endNode": "2", "properties": {}}
                            ]
                        }
                    }]
                }],
                "errors": []
            })))
            .mount(&server)
            .await;

        let fragment = store(server.uri()).one_hop("Son").await.unwrap();
        assert_eq!(fragment.nodes.len(), 2);
        assert_eq!(fragment.nodes[0].label, "Player");
        assert_eq!(fragment.nodes[0].properties["goals"], PropertyValue::Int(178));
        assert_eq!(fragment.edges, vec![EdgeRecord::new("10", "1", "2", "PLAYS_FOR")]);
    }

    #[tokio::test]
    async fn test_page_rank_reads_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "statements": [{"parameters": {"graphName": "g1", "topK": 2}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"columns": ["name"], "data": [{"row": ["Hub"]}, {"row": ["Son"]}]}],
                "errors": []
            })))
            .mount(&server)
            .await;

        let top = store(server.uri()).page_rank("g1", 2).await.unwrap();
        assert_eq!(top, vec!["Hub", "Son"]);
    }

    #[tokio::test]
    async fn test_response_errors_become_graph_store_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [],
                "errors": [{"code": "Neo.ClientError.Procedure.ProcedureNotFound", "message": "gds missing"}]
            })))
            .mount(&server)
            .await;

        let err = store(server.uri()).create_projection("g1").await.unwrap_err();
        match err {
            AppError::GraphStore { message } => assert!(message.contains("ProcedureNotFound")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_hops_skips_the_store() {
        // Nothing mounted: any request would fail with 404
        let server = MockServer::start().await;
        let fragment = store(server.uri()).paths_within("Son", 0).await.unwrap();
        assert!(fragment.is_empty());
    }
}
