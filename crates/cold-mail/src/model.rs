use serde::{Deserialize, Serialize};

use coldmail_common::mcp_api::JobSummary;

/// One job posting pulled out of a page by the extractor.
///
/// `skills` is always canonical (see [`canonical_skill`]) and free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub role: String,
    pub experience: Option<String>,
    pub skills: Vec<String>,
    pub description: String,
}

impl From<&JobRecord> for JobSummary {
    fn from(job: &JobRecord) -> Self {
        JobSummary {
            role: job.role.clone(),
            experience: job.experience.clone(),
            skills: job.skills.clone(),
            description: job.description.clone(),
        }
    }
}

/// A portfolio row: the tech stack a project used and where to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub techstack: String,
    pub link: String,
}

impl PortfolioEntry {
    pub fn new(techstack: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            techstack: techstack.into(),
            link: link.into(),
        }
    }
}

/// Canonical form shared by query skills and stored techstack text: trimmed, lowercased,
/// inner whitespace runs collapsed to one space.
///
/// Both sides of a similarity lookup must go through this, otherwise casing differences
/// quietly lower match scores instead of failing.
pub fn canonical_skill(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonicalize a skill list, dropping blanks and later duplicates.
pub fn canonical_skills<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for skill in raw {
        let skill = canonical_skill(skill.as_ref());
        if !skill.is_empty() && !out.contains(&skill) {
            out.push(skill);
        }
    }
    out
}
