use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WriteColdEmailsParams {
    /// URL of a careers page to fetch. Give either `url` or `text`.
    pub url: Option<String>,
    /// Raw careers page text or HTML.
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExtractJobsParams {
    /// Raw job posting text or HTML.
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MatchPortfolioParams {
    /// Skills to match against the portfolio, e.g. ["react", "node.js"].
    pub skills: Vec<String>,
    /// Drop repeated links across skills (default: false).
    pub dedup: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSummary {
    pub role: String,
    pub experience: Option<String>,
    pub skills: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColdEmailResult {
    /// Position of the job in extraction order.
    pub job_index: usize,
    pub job: JobSummary,
    /// Portfolio links matched for this job, in (skill order, rank order).
    pub links: Vec<String>,
    /// Generated email, absent when this job failed.
    pub email: Option<String>,
    /// Failure for this job only; other jobs are unaffected.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WriteColdEmailsResponse {
    pub results: Vec<ColdEmailResult>,
    /// Set when job extraction failed and `results` is therefore empty.
    pub extraction_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractJobsResponse {
    pub jobs: Vec<JobSummary>,
    pub extraction_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatchPortfolioResponse {
    /// Matched links in (skill order, rank order), deduplicated when requested.
    pub links: Vec<String>,
    /// Every match with its cosine similarity, never deduplicated.
    pub matches: Vec<PortfolioMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PortfolioMatch {
    pub link: String,
    /// Cosine similarity between the skill and the portfolio techstack (higher is closer).
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PortfolioStatusResponse {
    pub collection: String,
    /// One of "uninitialized", "populating", "ready".
    pub state: String,
    pub entries: usize,
}
