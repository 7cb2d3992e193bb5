use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use coldmail_common::deadline::with_deadline;
use coldmail_common::generation::TextGenerator;

use crate::error::ComposeError;
use crate::model::JobRecord;
use crate::prompts;

/// Who the email is written as.
#[derive(Debug, Clone)]
pub struct SenderProfile {
    pub name: String,
    pub company: String,
}

impl Default for SenderProfile {
    fn default() -> Self {
        Self {
            name: "Mohan".to_string(),
            company: "AtliQ".to_string(),
        }
    }
}

/// Writes one cold email per job through the generation collaborator.
pub struct EmailComposer {
    generator: Arc<dyn TextGenerator>,
    sender: SenderProfile,
    timeout: Duration,
}

impl EmailComposer {
    pub fn new(generator: Arc<dyn TextGenerator>, sender: SenderProfile, timeout: Duration) -> Self {
        Self {
            generator,
            sender,
            timeout,
        }
    }

    pub async fn compose(&self, job: &JobRecord, links: &[String]) -> Result<String, ComposeError> {
        let job_json = serde_json::to_string_pretty(job).unwrap_or_else(|_| job.description.clone());
        let prompt = prompts::compose_prompt(&job_json, links, &self.sender.name, &self.sender.company);

        let raw = with_deadline(
            "generate",
            self.timeout,
            self.generator.generate(prompts::COMPOSE_SYSTEM, &prompt),
        )
        .await?;

        let email = raw.trim();
        if email.is_empty() {
            return Err(ComposeError::Empty);
        }
        debug!(role = %job.role, links = links.len(), chars = email.len(), "email composed");
        Ok(email.to_string())
    }
}

#[cfg(test)]
mod tests {
    use coldmail_common::error::CommonError;

    use super::*;
    use crate::testing::ScriptedGenerator;

    fn job() -> JobRecord {
        JobRecord {
            role: "Frontend Engineer".to_string(),
            experience: Some("2 years".to_string()),
            skills: vec!["react".to_string()],
            description: "Ship the dashboard".to_string(),
        }
    }

    #[tokio::test]
    async fn prompt_carries_job_and_links() {
        let generator = Arc::new(ScriptedGenerator::replying("  Dear hiring team,\n...\n"));
        let composer = EmailComposer::new(
            generator.clone(),
            SenderProfile::default(),
            Duration::from_secs(5),
        );

        let links = vec!["https://example.com/react".to_string()];
        let email = composer.compose(&job(), &links).await.expect("compose");
        assert_eq!(email, "Dear hiring team,\n...");

        let prompts = generator.prompts.lock().expect("prompts lock");
        assert!(prompts[0].contains("\"role\": \"Frontend Engineer\""));
        assert!(prompts[0].contains("- https://example.com/react"));
        assert!(prompts[0].contains("AtliQ"));
    }

    #[tokio::test]
    async fn blank_reply_is_an_error() {
        let composer = EmailComposer::new(
            Arc::new(ScriptedGenerator::replying(" \n ")),
            SenderProfile::default(),
            Duration::from_secs(5),
        );
        let err = composer.compose(&job(), &[]).await.expect_err("empty");
        assert!(matches!(err, ComposeError::Empty));
    }

    #[tokio::test]
    async fn slow_generator_times_out() {
        let generator =
            ScriptedGenerator::replying("too late").with_delay(Duration::from_millis(500));
        let composer = EmailComposer::new(
            Arc::new(generator),
            SenderProfile::default(),
            Duration::from_millis(20),
        );
        let err = composer.compose(&job(), &[]).await.expect_err("timeout");
        assert!(matches!(err, ComposeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn collaborator_failure_is_reported() {
        let composer = EmailComposer::new(
            Arc::new(ScriptedGenerator::new(|_, _| {
                Err(CommonError::Generation("rate limited".to_string()))
            })),
            SenderProfile::default(),
            Duration::from_secs(5),
        );
        let err = composer.compose(&job(), &[]).await.expect_err("failure");
        assert!(err.to_string().contains("rate limited"));
    }
}
