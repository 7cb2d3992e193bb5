/// Ephemeral in-process `VectorStore`.
///
/// Brute-force cosine similarity over every row of a collection. Used by tests and by callers
/// that want an evidence index without a LanceDB directory; nothing survives the process.
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CommonError;
use crate::vectordb::{Neighbor, VectorRow, VectorStore};

struct Collection {
    dimensions: usize,
    rows: Vec<VectorRow>,
}

impl Collection {
    fn append(&mut self, rows: Vec<VectorRow>) -> Result<(), CommonError> {
        // Validate everything first so a bad row leaves the collection untouched.
        if let Some(bad) = rows.iter().find(|r| r.embedding.len() != self.dimensions) {
            return Err(CommonError::VectorDb(format!(
                "row {} has {} dimensions, expected {}",
                bad.id,
                bad.embedding.len(),
                self.dimensions
            )));
        }
        self.rows.extend(rows);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), CommonError> {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(name.to_string()).or_insert(Collection {
            dimensions,
            rows: Vec::new(),
        });
        if collection.dimensions != dimensions {
            return Err(CommonError::VectorDb(format!(
                "collection {name} has {} dimensions, requested {dimensions}",
                collection.dimensions
            )));
        }
        Ok(())
    }

    async fn count(&self, name: &str) -> Result<usize, CommonError> {
        let collections = self.collections.read().await;
        collections
            .get(name)
            .map(|c| c.rows.len())
            .ok_or_else(|| CommonError::VectorDb(format!("collection {name} not found")))
    }

    async fn insert(&self, name: &str, rows: Vec<VectorRow>) -> Result<(), CommonError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| CommonError::VectorDb(format!("collection {name} not found")))?;
        collection.append(rows)
    }

    async fn insert_if_empty(
        &self,
        name: &str,
        rows: Vec<VectorRow>,
    ) -> Result<bool, CommonError> {
        // Count and append under one write guard.
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| CommonError::VectorDb(format!("collection {name} not found")))?;
        if !collection.rows.is_empty() {
            return Ok(false);
        }
        collection.append(rows)?;
        Ok(true)
    }

    async fn nearest(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>, CommonError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| CommonError::VectorDb(format!("collection {name} not found")))?;
        if query.len() != collection.dimensions {
            return Err(CommonError::VectorDb(format!(
                "query has {} dimensions, expected {}",
                query.len(),
                collection.dimensions
            )));
        }

        let mut scored: Vec<(f64, &VectorRow)> = collection
            .rows
            .iter()
            .filter_map(|row| cosine_similarity(query, &row.embedding).map(|s| (s, row)))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, row)| Neighbor {
                id: row.id.clone(),
                document: row.document.clone(),
                metadata: row.metadata.clone(),
                score: score as f32,
            })
            .collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;

    fn row(id: &str, embedding: Vec<f32>) -> VectorRow {
        VectorRow {
            id: id.to_string(),
            document: id.to_string(),
            metadata: Map::new(),
            embedding,
        }
    }

    #[tokio::test]
    async fn nearest_ranks_by_cosine() {
        let store = MemoryStore::new();
        store.ensure_collection("c", 2).await.expect("create");
        store
            .insert(
                "c",
                vec![
                    row("x", vec![1.0, 0.0]),
                    row("y", vec![0.0, 1.0]),
                    row("xy", vec![1.0, 1.0]),
                ],
            )
            .await
            .expect("insert");

        let hits = store.nearest("c", &[2.0, 0.1], 2).await.expect("search");
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "xy"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn bad_row_leaves_collection_untouched() {
        let store = MemoryStore::new();
        store.ensure_collection("c", 2).await.expect("create");
        let err = store
            .insert("c", vec![row("ok", vec![1.0, 0.0]), row("bad", vec![1.0])])
            .await
            .expect_err("dimension mismatch");
        assert!(matches!(err, CommonError::VectorDb(_)));
        assert_eq!(store.count("c").await.expect("count"), 0);
    }

    #[tokio::test]
    async fn insert_if_empty_writes_once() {
        let store = MemoryStore::new();
        store.ensure_collection("c", 2).await.expect("create");

        let (a, b) = tokio::join!(
            store.insert_if_empty("c", vec![row("a", vec![1.0, 0.0])]),
            store.insert_if_empty("c", vec![row("b", vec![0.0, 1.0])]),
        );
        assert_ne!(a.expect("first"), b.expect("second"));
        assert_eq!(store.count("c").await.expect("count"), 1);

        let wrote = store
            .insert_if_empty("c", vec![row("late", vec![1.0, 1.0])])
            .await
            .expect("late");
        assert!(!wrote);
        assert_eq!(store.count("c").await.expect("count"), 1);
    }

    #[tokio::test]
    async fn reattaching_with_other_dimension_fails() {
        let store = MemoryStore::new();
        store.ensure_collection("c", 2).await.expect("create");
        assert!(store.ensure_collection("c", 3).await.is_err());
    }

    #[tokio::test]
    async fn unknown_collection_is_store_error() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.count("missing").await,
            Err(CommonError::VectorDb(_))
        ));
    }

    #[test]
    fn zero_vector_has_no_similarity() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
    }
}
