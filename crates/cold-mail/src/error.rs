use std::time::Duration;

use coldmail_common::error::CommonError;

use crate::evidence::IndexState;

/// The extractor could not turn collaborator output into job records.
///
/// Recoverable: the caller gets no jobs for this document and decides what to show.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extractor output is not a JSON list of jobs: {reason}")]
    Malformed { reason: String },

    #[error("extractor call timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    #[error("extractor call failed: {0}")]
    Collaborator(CommonError),
}

impl From<CommonError> for ExtractionError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Timeout { after, .. } => ExtractionError::Timeout { after },
            other => ExtractionError::Collaborator(other),
        }
    }
}

/// The portfolio dataset lacks a column the evidence index needs.
#[derive(Debug, thiserror::Error)]
#[error("portfolio dataset is missing required column `{column}`")]
pub struct SchemaError {
    pub column: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to read portfolio dataset {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("vector store unavailable while {context}: {message}")]
    StoreUnavailable { context: String, message: String },

    #[error("{call} call timed out after {}ms while {context}", after.as_millis())]
    CollaboratorTimeout {
        call: &'static str,
        after: Duration,
        context: String,
    },

    #[error("embedding failed while {context}: {message}")]
    Embedding { context: String, message: String },

    #[error("evidence index is {0}, queries need a ready index")]
    NotReady(IndexState),
}

impl EvidenceError {
    /// Attach what the index was doing to an infrastructure failure.
    pub fn from_common(err: CommonError, context: impl Into<String>) -> Self {
        let context = context.into();
        match err {
            CommonError::VectorDb(message) => EvidenceError::StoreUnavailable { context, message },
            CommonError::Timeout { call, after } => {
                EvidenceError::CollaboratorTimeout { call, after, context }
            }
            CommonError::Embedding(message) | CommonError::Generation(message) => {
                EvidenceError::Embedding { context, message }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("fetching {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("fetching {url} timed out after {}ms", after.as_millis())]
    Timeout { url: String, after: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("composer call timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    #[error("composer call failed: {0}")]
    Collaborator(CommonError),

    #[error("composer returned an empty message")]
    Empty,
}

impl From<CommonError> for ComposeError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Timeout { after, .. } => ComposeError::Timeout { after },
            other => ComposeError::Collaborator(other),
        }
    }
}

/// Failure of one job inside a batch. Other jobs of the same document are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {index} ({role}): evidence lookup failed: {source}")]
    Evidence {
        index: usize,
        role: String,
        #[source]
        source: EvidenceError,
    },

    #[error("job {index} ({role}): {source}")]
    Compose {
        index: usize,
        role: String,
        #[source]
        source: ComposeError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
}
