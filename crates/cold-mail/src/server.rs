use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tracing::info;

use coldmail_common::mcp_api::{
    ColdEmailResult, ExtractJobsParams, ExtractJobsResponse, JobSummary, MatchPortfolioParams,
    MatchPortfolioResponse, PortfolioMatch, PortfolioStatusResponse, WriteColdEmailsParams,
    WriteColdEmailsResponse,
};

use crate::evidence::{links_of, QueryOptions};
use crate::fetch::DocumentFetcher;
use crate::pipeline::{JobOutcome, Pipeline};

#[derive(Clone)]
pub struct ColdMailServer {
    pipeline: Arc<Pipeline>,
    fetcher: Arc<DocumentFetcher>,
    tool_router: ToolRouter<ColdMailServer>,
}

impl ColdMailServer {
    pub fn new(pipeline: Arc<Pipeline>, fetcher: Arc<DocumentFetcher>) -> Self {
        Self {
            pipeline,
            fetcher,
            tool_router: Self::tool_router(),
        }
    }

    async fn document(&self, params: WriteColdEmailsParams) -> Result<String, String> {
        let url = params.url.filter(|u| !u.trim().is_empty());
        let text = params.text.filter(|t| !t.trim().is_empty());
        match (url, text) {
            (Some(url), None) => self.fetcher.fetch(&url).await.map_err(|e| e.to_string()),
            (None, Some(text)) => Ok(text),
            (Some(_), Some(_)) => Err("pass either url or text, not both".to_string()),
            (None, None) => Err("one of url or text is required".to_string()),
        }
    }
}

fn to_result(outcome: JobOutcome) -> ColdEmailResult {
    let (email, error) = match outcome.result {
        Ok(email) => (Some(email), None),
        Err(e) => (None, Some(e.to_string())),
    };
    ColdEmailResult {
        job_index: outcome.index,
        job: JobSummary::from(&outcome.job),
        links: outcome.links,
        email,
        error,
    }
}

#[tool_router]
impl ColdMailServer {
    #[tool(description = "Write one cold email per job posting found on a careers page. Pass either `url` (the page is fetched) or `text` (raw page content). Each result carries the extracted job, the matched portfolio links and either the email or the reason it could not be written.")]
    async fn write_cold_emails(
        &self,
        Parameters(params): Parameters<WriteColdEmailsParams>,
    ) -> Result<Json<WriteColdEmailsResponse>, String> {
        let document = self.document(params).await?;
        info!(bytes = document.len(), "write_cold_emails invoked");

        let report = self.pipeline.run(&document).await;
        Ok(Json(WriteColdEmailsResponse {
            extraction_error: report.extraction_error.map(|e| e.to_string()),
            results: report.outcomes.into_iter().map(to_result).collect(),
        }))
    }

    #[tool(description = "Extract job postings (role, experience, skills, description) from raw careers page text without writing emails. Skills are returned trimmed and lowercased.")]
    async fn extract_jobs(
        &self,
        Parameters(params): Parameters<ExtractJobsParams>,
    ) -> Result<Json<ExtractJobsResponse>, String> {
        let response = match self.pipeline.extract(&params.text).await {
            Ok(jobs) => ExtractJobsResponse {
                jobs: jobs.iter().map(JobSummary::from).collect(),
                extraction_error: None,
            },
            Err(e) => ExtractJobsResponse {
                jobs: Vec::new(),
                extraction_error: Some(e.to_string()),
            },
        };
        Ok(Json(response))
    }

    #[tool(description = "Find portfolio links backing a list of skills. Returns the top matches per skill in skill order with their similarity scores; repeated links are kept unless `dedup` is true.")]
    async fn match_portfolio(
        &self,
        Parameters(params): Parameters<MatchPortfolioParams>,
    ) -> Result<Json<MatchPortfolioResponse>, String> {
        let index = self.pipeline.index();
        let matches = index
            .matches(&params.skills)
            .await
            .map_err(|e| format!("match_portfolio failed: {e}"))?;
        let options = QueryOptions {
            dedup: params.dedup.unwrap_or(index.dedup_by_default()),
        };
        Ok(Json(MatchPortfolioResponse {
            links: links_of(&matches, options),
            matches: matches
                .into_iter()
                .map(|m| PortfolioMatch {
                    link: m.link,
                    score: m.score,
                })
                .collect(),
        }))
    }

    #[tool(description = "Report the portfolio index state (uninitialized, populating, ready) and how many entries it holds.")]
    async fn portfolio_status(&self) -> Result<Json<PortfolioStatusResponse>, String> {
        let index = self.pipeline.index();
        let entries = index
            .entry_count()
            .await
            .map_err(|e| format!("portfolio_status failed: {e}"))?;
        Ok(Json(PortfolioStatusResponse {
            collection: index.collection().to_string(),
            state: index.state().await.to_string(),
            entries,
        }))
    }
}

#[tool_handler]
impl ServerHandler for ColdMailServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "cold-mail".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Cold email writer for job postings. Use write_cold_emails with a careers page \
                 url or its text to get one email per job, backed by matching portfolio links. \
                 extract_jobs and match_portfolio expose the two intermediate steps, and \
                 portfolio_status reports whether the portfolio index is ready."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use coldmail_common::memory::MemoryStore;

    use super::*;
    use crate::composer::{EmailComposer, SenderProfile};
    use crate::error::JobError;
    use crate::evidence::{EvidenceIndex, IndexConfig};
    use crate::extractor::JobExtractor;
    use crate::model::{JobRecord, PortfolioEntry};
    use crate::normalizer::Normalizer;
    use crate::testing::{HashEmbedder, ScriptedGenerator};

    #[test]
    fn tools_publish_output_schemas() {
        let tools = ColdMailServer::tool_router().list_all();
        for name in [
            "write_cold_emails",
            "extract_jobs",
            "match_portfolio",
            "portfolio_status",
        ] {
            let tool = tools
                .iter()
                .find(|t| t.name == name)
                .unwrap_or_else(|| panic!("missing tool: {name}"));
            assert!(
                tool.output_schema.is_some(),
                "tool {name} should publish output_schema"
            );
        }
    }

    async fn server() -> ColdMailServer {
        let generator = Arc::new(ScriptedGenerator::replying(
            r#"[{"role": "Data Engineer", "skills": ["Python"], "description": "pipelines"}]"#,
        ));
        let index = EvidenceIndex::new(
            Arc::new(MemoryStore::new()),
            Arc::new(HashEmbedder::new()),
            IndexConfig::default(),
        );
        index
            .build(&[
                PortfolioEntry::new("Python, Django, MySQL", "example.com/a"),
                PortfolioEntry::new("Python, Pandas", "example.com/b"),
            ])
            .await
            .expect("index");
        let pipeline = Pipeline::new(
            Normalizer::new(),
            JobExtractor::new(generator.clone(), Duration::from_secs(5)),
            Arc::new(index),
            EmailComposer::new(generator, SenderProfile::default(), Duration::from_secs(5)),
        );
        let fetcher = DocumentFetcher::new(Duration::from_secs(5)).expect("client");
        ColdMailServer::new(Arc::new(pipeline), Arc::new(fetcher))
    }

    #[tokio::test]
    async fn document_needs_exactly_one_source() {
        let server = server().await;
        let both = WriteColdEmailsParams {
            url: Some("https://example.com".to_string()),
            text: Some("jobs".to_string()),
        };
        assert!(server.document(both).await.is_err());

        let neither = WriteColdEmailsParams {
            url: None,
            text: Some("  ".to_string()),
        };
        assert!(server.document(neither).await.is_err());

        let text = WriteColdEmailsParams {
            url: None,
            text: Some("Data Engineer".to_string()),
        };
        assert_eq!(server.document(text).await.expect("text"), "Data Engineer");
    }

    #[tokio::test]
    async fn match_portfolio_honours_dedup_flag() {
        let server = server().await;
        let skills = vec!["Python".to_string(), "python".to_string()];

        let Json(all) = server
            .match_portfolio(Parameters(MatchPortfolioParams {
                skills: skills.clone(),
                dedup: None,
            }))
            .await
            .expect("match");
        assert_eq!(all.links.len(), 4);
        assert_eq!(all.matches.len(), 4);
        // Both spellings canonicalize to one skill, so the blocks score identically.
        assert!(all.matches[0].score >= all.matches[1].score);
        assert_eq!(all.matches[0].score, all.matches[2].score);
        assert!(all.matches.iter().all(|m| m.score > 0.0 && m.score <= 1.0 + f32::EPSILON));

        let Json(unique) = server
            .match_portfolio(Parameters(MatchPortfolioParams {
                skills,
                dedup: Some(true),
            }))
            .await
            .expect("match");
        assert_eq!(unique.links.len(), 2);
        assert_eq!(unique.matches.len(), 4);
    }

    #[tokio::test]
    async fn portfolio_status_reports_ready_index() {
        let server = server().await;
        let Json(status) = server.portfolio_status().await.expect("status");
        assert_eq!(status.collection, "portfolio");
        assert_eq!(status.state, "ready");
        assert_eq!(status.entries, 2);
    }

    #[tokio::test]
    async fn extract_jobs_returns_canonical_skills() {
        let server = server().await;
        let Json(response) = server
            .extract_jobs(Parameters(ExtractJobsParams {
                text: "<h1>Data Engineer</h1>".to_string(),
            }))
            .await
            .expect("extract");
        assert!(response.extraction_error.is_none());
        assert_eq!(response.jobs[0].skills, vec!["python"]);
    }

    #[test]
    fn failed_jobs_carry_error_text() {
        let outcome = JobOutcome {
            index: 3,
            job: JobRecord {
                role: "QA".to_string(),
                experience: None,
                skills: Vec::new(),
                description: String::new(),
            },
            links: Vec::new(),
            result: Err(JobError::Compose {
                index: 3,
                role: "QA".to_string(),
                source: crate::error::ComposeError::Empty,
            }),
        };
        let result = to_result(outcome);
        assert_eq!(result.job_index, 3);
        assert!(result.email.is_none());
        assert_eq!(
            result.error.as_deref(),
            Some("job 3 (QA): composer returned an empty message")
        );
    }
}
