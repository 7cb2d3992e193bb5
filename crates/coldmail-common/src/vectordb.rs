/// Vector store seam plus its LanceDB implementation.
///
/// A collection is one LanceDB table with the schema:
/// - id: Utf8 (not null)
/// - document: Utf8 (not null): the text that was embedded
/// - metadata: Utf8 (not null): JSON object, schema-less from the store's point of view
/// - embedding: FixedSizeList<Float32, dim> (not null)
///
/// Similarity is cosine; LanceDB reports it as `_distance = 1 - cos`.
///
/// `insert_if_empty` holds an exclusive advisory lock on `<db>/<collection>.populate.lock`
/// across its count and write, so separate connections (and processes) sharing one database
/// directory cannot both populate a collection.
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use fs2::FileExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::CommonError;

/// Row handed to `VectorStore::insert`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRow {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    pub embedding: Vec<f32>,
}

/// One ranked hit from `VectorStore::nearest`. `score` is cosine similarity (higher is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

/// Key-value store with nearest-neighbour search, addressed by collection name.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist yet; attach to it otherwise.
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), CommonError>;

    async fn count(&self, name: &str) -> Result<usize, CommonError>;

    /// Append rows in one write. Either every row becomes visible or none does.
    async fn insert(&self, name: &str, rows: Vec<VectorRow>) -> Result<(), CommonError>;

    /// Insert only if the collection holds no rows, as one atomic step with respect to every
    /// other `insert_if_empty` on the same collection. Returns `false` when rows were already
    /// there and nothing was written.
    async fn insert_if_empty(&self, name: &str, rows: Vec<VectorRow>)
        -> Result<bool, CommonError>;

    /// Up to `k` rows ordered by descending similarity to `query`.
    async fn nearest(&self, name: &str, query: &[f32], k: usize)
        -> Result<Vec<Neighbor>, CommonError>;
}

pub struct VectorDb {
    db: lancedb::Connection,
    root: PathBuf,
}

impl VectorDb {
    /// Connect to a LanceDB database at the given filesystem path.
    pub async fn connect(path: &str) -> Result<Self, CommonError> {
        let db = lancedb::connect(path)
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("connection failed: {e}")))?;
        Ok(Self {
            db,
            root: PathBuf::from(path),
        })
    }

    /// Blocks (off the runtime) until the collection's populate lock is ours. Dropping the
    /// returned file releases it.
    async fn populate_lock(&self, name: &str) -> Result<File, CommonError> {
        let path = self.root.join(format!("{name}.populate.lock"));
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(path.parent().unwrap_or(path.as_path()))?;
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            FileExt::lock_exclusive(&file)?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| CommonError::VectorDb(format!("populate lock task failed: {e}")))?
        .map_err(|e| CommonError::VectorDb(format!("locking {name} for population failed: {e}")))
    }

    async fn open(&self, name: &str) -> Result<lancedb::Table, CommonError> {
        self.db
            .open_table(name)
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("open table {name} failed: {e}")))
    }
}

#[async_trait]
impl VectorStore for VectorDb {
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), CommonError> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("listing tables failed: {e}")))?;
        if names.iter().any(|n| n == name) {
            return Ok(());
        }

        self.db
            .create_empty_table(name, collection_schema(dimensions)?)
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("create table {name} failed: {e}")))?;
        info!(table = name, dimensions, "vector table created");
        Ok(())
    }

    async fn count(&self, name: &str) -> Result<usize, CommonError> {
        self.open(name)
            .await?
            .count_rows(None)
            .await
            .map_err(|e| CommonError::VectorDb(format!("count rows in {name} failed: {e}")))
    }

    async fn insert(&self, name: &str, rows: Vec<VectorRow>) -> Result<(), CommonError> {
        if rows.is_empty() {
            return Ok(());
        }
        let table = self.open(name).await?;
        let batch = build_record_batch(&rows)?;
        let schema = batch.schema();
        let batch_iter = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(batch_iter))
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("insert into {name} failed: {e}")))?;
        info!(table = name, rows = rows.len(), "vector rows inserted");
        Ok(())
    }

    async fn insert_if_empty(
        &self,
        name: &str,
        rows: Vec<VectorRow>,
    ) -> Result<bool, CommonError> {
        let _lock = self.populate_lock(name).await?;
        let existing = self.count(name).await?;
        if existing > 0 {
            info!(table = name, existing, "table already populated, insert skipped");
            return Ok(false);
        }
        self.insert(name, rows).await?;
        Ok(true)
    }

    async fn nearest(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>, CommonError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let table = self.open(name).await?;
        let results = table
            .vector_search(query)
            .map_err(|e| CommonError::VectorDb(format!("vector search setup failed: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("vector search failed: {e}")))?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| CommonError::VectorDb(format!("collecting search results failed: {e}")))?;

        let mut neighbors = extract_neighbors(&batches);
        neighbors.sort_by(|a, b| b.score.total_cmp(&a.score));
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

fn collection_schema(dimensions: usize) -> Result<Arc<Schema>, CommonError> {
    let dim = i32::try_from(dimensions)
        .map_err(|_| CommonError::VectorDb(format!("unsupported dimension {dimensions}")))?;
    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("document", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            false,
        ),
    ])))
}

/// Build an Arrow RecordBatch from rows that all share one embedding dimension.
fn build_record_batch(rows: &[VectorRow]) -> Result<RecordBatch, CommonError> {
    let dimensions = rows.first().map(|r| r.embedding.len()).unwrap_or(0);
    if let Some(bad) = rows.iter().find(|r| r.embedding.len() != dimensions) {
        return Err(CommonError::VectorDb(format!(
            "row {} has {} dimensions, expected {dimensions}",
            bad.id,
            bad.embedding.len()
        )));
    }
    let schema = collection_schema(dimensions)?;

    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    let documents: Vec<&str> = rows.iter().map(|r| r.document.as_str()).collect();
    let metadata: Vec<String> = rows
        .iter()
        .map(|r| Value::Object(r.metadata.clone()).to_string())
        .collect();

    let id_array: ArrayRef = Arc::new(StringArray::from(ids));
    let document_array: ArrayRef = Arc::new(StringArray::from(documents));
    let metadata_array: ArrayRef = Arc::new(StringArray::from(metadata));

    let flat_values: Vec<f32> = rows.iter().flat_map(|r| r.embedding.iter().copied()).collect();
    let embedding_array: ArrayRef = Arc::new(
        FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dimensions as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| CommonError::VectorDb(format!("failed to build embedding array: {e}")))?,
    );

    RecordBatch::try_new(
        schema,
        vec![id_array, document_array, metadata_array, embedding_array],
    )
    .map_err(|e| CommonError::VectorDb(format!("failed to build record batch: {e}")))
}

fn extract_neighbors(batches: &[RecordBatch]) -> Vec<Neighbor> {
    let mut neighbors = Vec::new();

    for batch in batches {
        let schema = batch.schema();

        let id_col = get_string_column(batch, &schema, "id");
        let document_col = get_string_column(batch, &schema, "document");
        let metadata_col = get_string_column(batch, &schema, "metadata");
        let distance_col = get_float_column(batch, &schema, "_distance");

        let (Some(id_col), Some(document_col), Some(metadata_col)) =
            (id_col, document_col, metadata_col)
        else {
            warn!("search result batch missing expected columns");
            continue;
        };

        for row in 0..batch.num_rows() {
            // Unparseable metadata becomes an empty map; callers validate the fields they need.
            let metadata = match serde_json::from_str::<Value>(metadata_col.value(row)) {
                Ok(Value::Object(map)) => map,
                _ => {
                    warn!(id = id_col.value(row), "row metadata is not a JSON object");
                    Map::new()
                }
            };
            let distance = distance_col.map(|c| c.value(row)).unwrap_or(1.0);

            neighbors.push(Neighbor {
                id: id_col.value(row).to_string(),
                document: document_col.value(row).to_string(),
                metadata,
                score: 1.0_f32 - distance,
            });
        }
    }

    neighbors
}

fn get_string_column<'a>(
    batch: &'a RecordBatch,
    schema: &Schema,
    name: &str,
) -> Option<&'a StringArray> {
    let idx = schema.index_of(name).ok()?;
    batch.column(idx).as_any().downcast_ref::<StringArray>()
}

fn get_float_column<'a>(
    batch: &'a RecordBatch,
    schema: &Schema,
    name: &str,
) -> Option<&'a Float32Array> {
    let idx = schema.index_of(name).ok()?;
    batch.column(idx).as_any().downcast_ref::<Float32Array>()
}
