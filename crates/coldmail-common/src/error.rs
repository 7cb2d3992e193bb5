/// Error types shared across the cold-mail crates.
///
/// These errors represent failures in infrastructure components (vector store, embeddings,
/// text generation) that any server in the workspace can hit. Application-specific
/// errors are defined in the server crate and wrap `CommonError` via `#[from]`.
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("vector store unavailable: {0}")]
    VectorDb(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("{call} call timed out after {}ms", after.as_millis())]
    Timeout { call: &'static str, after: Duration },
}
