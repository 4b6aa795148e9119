//! pgvector-backed vector store
//!
//! Expects a table `(collection text, name text, embedding vector)`.

use super::{vector_error, ScoredName, VectorStore};
use crate::graph::validate_identifier;
use async_trait::async_trait;
use kgfusion_common::db::DbPool;
use kgfusion_common::errors::Result;
use sea_orm::{ConnectionTrait, DbBackend, Statement};

/// Vector store over a Postgres table with the pgvector extension
pub struct PgVectorStore {
    db: DbPool,
    sql: String,
}

impl PgVectorStore {
    pub fn new(db: DbPool, table: &str) -> Result<Self> {
        let table = validate_identifier(table)?;
        Ok(Self {
            db,
            sql: search_sql(table),
        })
    }
}

fn search_sql(table: &str) -> String {
    format!(
        r#"
        SELECT name, (1 - (embedding <=> $1::vector))::float8 AS score
        FROM {table}
        WHERE collection = $2 AND embedding IS NOT NULL
        ORDER BY embedding <=> $1::vector
        LIMIT $3
        "#,
        table = table
    )
}

/// pgvector text literal, e.g. `[0.1,0.2]`
fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    async fn search(&self, collection: &str, embedding: &[f32], limit: usize) -> Result<Vec<ScoredName>> {
        let values: Vec<sea_orm::Value> = vec![
            vector_literal(embedding).into(),
            collection.to_string().into(),
            (limit as i64).into(),
        ];
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &self.sql, values);

        let rows = self
            .db
            .conn()
            .query_all(stmt)
            .await
            .map_err(|e| vector_error(format!("Similarity query failed: {}", e)))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(ScoredName {
                    name: row.try_get_by_index::<String>(0).ok()?,
                    score: row.try_get_by_index::<f64>(1).ok()? as f32,
                })
            })
            .collect())
    }
}
