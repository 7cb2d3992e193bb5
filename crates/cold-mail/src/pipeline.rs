/// One document in, one email per job out.
///
/// normalize → extract → (per job) evidence lookup → compose. Extraction failure ends the run
/// with no jobs. Evidence and composition failures are recorded against their job and the
/// remaining jobs still run.
use std::sync::Arc;

use tracing::{info, warn};

use crate::composer::EmailComposer;
use crate::error::{ExtractionError, JobError};
use crate::evidence::EvidenceIndex;
use crate::extractor::JobExtractor;
use crate::model::JobRecord;
use crate::normalizer::Normalizer;

#[derive(Debug)]
pub struct JobOutcome {
    pub index: usize,
    pub job: JobRecord,
    /// Empty when the evidence lookup failed.
    pub links: Vec<String>,
    pub result: Result<String, JobError>,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<JobOutcome>,
    pub extraction_error: Option<ExtractionError>,
}

impl PipelineReport {
    pub fn failed_jobs(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

pub struct Pipeline {
    normalizer: Normalizer,
    extractor: JobExtractor,
    index: Arc<EvidenceIndex>,
    composer: EmailComposer,
}

impl Pipeline {
    pub fn new(
        normalizer: Normalizer,
        extractor: JobExtractor,
        index: Arc<EvidenceIndex>,
        composer: EmailComposer,
    ) -> Self {
        Self {
            normalizer,
            extractor,
            index,
            composer,
        }
    }

    pub fn index(&self) -> &EvidenceIndex {
        &self.index
    }

    /// Normalize and extract without looking up evidence or composing.
    pub async fn extract(&self, raw: &str) -> Result<Vec<JobRecord>, ExtractionError> {
        let text = self.normalizer.normalize(raw);
        self.extractor.extract(&text).await
    }

    pub async fn run(&self, raw: &str) -> PipelineReport {
        let jobs = match self.extract(raw).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "extraction failed, no emails written");
                return PipelineReport {
                    outcomes: Vec::new(),
                    extraction_error: Some(e),
                };
            }
        };

        let mut outcomes = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.into_iter().enumerate() {
            outcomes.push(self.run_job(index, job).await);
        }

        let report = PipelineReport {
            outcomes,
            extraction_error: None,
        };
        info!(
            jobs = report.outcomes.len(),
            failed = report.failed_jobs(),
            "pipeline run finished"
        );
        report
    }

    async fn run_job(&self, index: usize, job: JobRecord) -> JobOutcome {
        let links = match self.index.query(&job.skills).await {
            Ok(links) => links,
            Err(source) => {
                let err = JobError::Evidence {
                    index,
                    role: job.role.clone(),
                    source,
                };
                warn!(error = %err, "skipping job");
                return JobOutcome {
                    index,
                    job,
                    links: Vec::new(),
                    result: Err(err),
                };
            }
        };

        let result = self
            .composer
            .compose(&job, &links)
            .await
            .map_err(|source| JobError::Compose {
                index,
                role: job.role.clone(),
                source,
            });
        if let Err(e) = &result {
            warn!(error = %e, "composition failed");
        }
        JobOutcome {
            index,
            job,
            links,
            result,
        }
    }
}
