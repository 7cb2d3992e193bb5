/// Portfolio evidence index.
///
/// Stores one vector per portfolio row (the canonical techstack text) and answers "which
/// portfolio links best back these skills" with a top-K cosine lookup per skill.
///
/// Lifecycle: `Uninitialized -> Populating -> Ready`, or `Uninitialized -> Ready` when the
/// collection already holds entries. `Ready` is terminal; queries need it.
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use coldmail_common::deadline::with_deadline;
use coldmail_common::embedding::TextEmbedder;
use coldmail_common::vectordb::{Neighbor, VectorRow, VectorStore};

use crate::error::EvidenceError;
use crate::model::{canonical_skill, PortfolioEntry};
use crate::portfolio::load_portfolio;

pub const DEFAULT_TOP_K: usize = 2;
pub const LINKS_FIELD: &str = "links";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    Populating,
    Ready,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexState::Uninitialized => "uninitialized",
            IndexState::Populating => "populating",
            IndexState::Ready => "ready",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub collection: String,
    pub top_k: usize,
    /// Default for `query`; `query_with` overrides it per call.
    pub dedup: bool,
    pub embed_timeout: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection: "portfolio".to_string(),
            top_k: DEFAULT_TOP_K,
            dedup: false,
            embed_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Keep only the first occurrence of each link across skills.
    pub dedup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The collection already had entries; nothing was embedded.
    Skipped { existing: usize },
    /// `skipped` counts rows with an empty techstack.
    Populated { inserted: usize, skipped: usize },
}

/// One link backing a skill, with the similarity it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceMatch {
    pub link: String,
    pub score: f32,
}

impl EvidenceMatch {
    fn from_neighbor(neighbor: Neighbor) -> Option<Self> {
        match neighbor.metadata.get(LINKS_FIELD) {
            Some(Value::String(link)) => Some(Self {
                link: link.clone(),
                score: neighbor.score,
            }),
            _ => {
                warn!(id = %neighbor.id, "store row has no string `links` metadata, skipping");
                None
            }
        }
    }
}

pub struct EvidenceIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn TextEmbedder>,
    config: IndexConfig,
    state: RwLock<IndexState>,
    build_lock: Mutex<()>,
}

impl EvidenceIndex {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn TextEmbedder>,
        config: IndexConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            state: RwLock::new(IndexState::Uninitialized),
            build_lock: Mutex::new(()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    pub fn dedup_by_default(&self) -> bool {
        self.config.dedup
    }

    pub async fn state(&self) -> IndexState {
        *self.state.read().await
    }

    pub async fn entry_count(&self) -> Result<usize, EvidenceError> {
        self.store
            .count(&self.config.collection)
            .await
            .map_err(|e| EvidenceError::from_common(e, "counting entries"))
    }

    /// Load the dataset, then build. Schema problems surface before the store is touched.
    pub async fn build_from_csv(&self, path: &Path) -> Result<BuildOutcome, EvidenceError> {
        let rows = load_portfolio(path)?;
        self.build(&rows).await
    }

    /// Populate the collection if it is empty; otherwise attach to what is there.
    ///
    /// Calls on the same handle are serialized. Handles sharing one store race only up to the
    /// write: the store's `insert_if_empty` lets exactly one of them land its rows and the
    /// others attach. A failed population leaves the collection empty and the index
    /// `Uninitialized`, so calling `build` again starts over.
    pub async fn build(&self, rows: &[PortfolioEntry]) -> Result<BuildOutcome, EvidenceError> {
        let _guard = self.build_lock.lock().await;
        let collection = self.config.collection.as_str();

        if *self.state.read().await == IndexState::Ready {
            let existing = self.entry_count().await?;
            return Ok(BuildOutcome::Skipped { existing });
        }

        self.store
            .ensure_collection(collection, self.embedder.dimensions())
            .await
            .map_err(|e| EvidenceError::from_common(e, format!("attaching collection `{collection}`")))?;

        let existing = self.entry_count().await?;
        if existing > 0 {
            info!(collection, existing, "portfolio collection already populated");
            *self.state.write().await = IndexState::Ready;
            return Ok(BuildOutcome::Skipped { existing });
        }

        *self.state.write().await = IndexState::Populating;
        match self.populate(rows).await {
            Ok(outcome) => {
                *self.state.write().await = IndexState::Ready;
                Ok(outcome)
            }
            Err(e) => {
                *self.state.write().await = IndexState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn populate(&self, rows: &[PortfolioEntry]) -> Result<BuildOutcome, EvidenceError> {
        let collection = self.config.collection.as_str();
        let eligible: Vec<(String, &PortfolioEntry)> = rows
            .iter()
            .map(|row| (canonical_skill(&row.techstack), row))
            .filter(|(text, _)| !text.is_empty())
            .collect();
        let skipped = rows.len() - eligible.len();
        if skipped > 0 {
            debug!(skipped, "skipping portfolio rows with empty techstack");
        }
        if eligible.is_empty() {
            warn!(collection, "portfolio has no rows with a techstack, index stays empty");
            return Ok(BuildOutcome::Populated { inserted: 0, skipped });
        }

        let texts: Vec<String> = eligible.iter().map(|(text, _)| text.clone()).collect();
        let vectors = with_deadline("embed", self.config.embed_timeout, self.embedder.embed(&texts))
            .await
            .map_err(|e| EvidenceError::from_common(e, "embedding portfolio techstacks"))?;
        if vectors.len() != texts.len() {
            return Err(EvidenceError::Embedding {
                context: "embedding portfolio techstacks".to_string(),
                message: format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            });
        }

        let batch: Vec<VectorRow> = eligible
            .into_iter()
            .zip(vectors)
            .map(|((document, row), embedding)| {
                let mut metadata = Map::new();
                metadata.insert(LINKS_FIELD.to_string(), Value::String(row.link.clone()));
                VectorRow {
                    id: Uuid::new_v4().to_string(),
                    document,
                    metadata,
                    embedding,
                }
            })
            .collect();
        let inserted = batch.len();

        let wrote = self
            .store
            .insert_if_empty(collection, batch)
            .await
            .map_err(|e| EvidenceError::from_common(e, format!("inserting {inserted} portfolio rows")))?;
        if !wrote {
            let existing = self.entry_count().await?;
            info!(collection, existing, "portfolio collection populated concurrently, attaching");
            return Ok(BuildOutcome::Skipped { existing });
        }

        info!(collection, inserted, skipped, "portfolio collection populated");
        Ok(BuildOutcome::Populated { inserted, skipped })
    }

    /// Links for `skills`, top-K per skill, flattened in (skill order, rank order).
    pub async fn query(&self, skills: &[String]) -> Result<Vec<String>, EvidenceError> {
        let options = QueryOptions {
            dedup: self.dedup_by_default(),
        };
        self.query_with(skills, options).await
    }

    pub async fn query_with(
        &self,
        skills: &[String],
        options: QueryOptions,
    ) -> Result<Vec<String>, EvidenceError> {
        let matches = self.matches(skills).await?;
        Ok(links_of(&matches, options))
    }

    /// Scored matches, never deduplicated.
    pub async fn matches(&self, skills: &[String]) -> Result<Vec<EvidenceMatch>, EvidenceError> {
        if skills.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state().await;
        if state != IndexState::Ready {
            return Err(EvidenceError::NotReady(state));
        }

        let collection = self.config.collection.as_str();
        let mut out = Vec::with_capacity(skills.len() * self.config.top_k);
        for raw in skills {
            let skill = canonical_skill(raw);
            if skill.is_empty() {
                continue;
            }
            let vector = with_deadline(
                "embed",
                self.config.embed_timeout,
                self.embedder.embed_one(&skill),
            )
            .await
            .map_err(|e| EvidenceError::from_common(e, format!("embedding skill `{skill}`")))?;

            let neighbors = self
                .store
                .nearest(collection, &vector, self.config.top_k)
                .await
                .map_err(|e| EvidenceError::from_common(e, format!("querying skill `{skill}`")))?;

            let before = out.len();
            out.extend(
                neighbors
                    .into_iter()
                    .take(self.config.top_k)
                    .filter_map(EvidenceMatch::from_neighbor),
            );
            debug!(skill = %skill, hits = out.len() - before, "evidence lookup");
        }
        Ok(out)
    }
}

/// The links of `matches` in order, keeping only the first of each when `options.dedup`.
pub fn links_of(matches: &[EvidenceMatch], options: QueryOptions) -> Vec<String> {
    let mut links: Vec<String> = Vec::with_capacity(matches.len());
    for m in matches {
        if options.dedup && links.contains(&m.link) {
            continue;
        }
        links.push(m.link.clone());
    }
    links
}
