/// Job extraction: normalized page text → ordered `JobRecord`s.
///
/// Language understanding is delegated to a `TextGenerator`. This module owns the framing
/// prompt, validates the shape of what comes back, and turns unusable output into an
/// `ExtractionError` instead of a crash.
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use coldmail_common::deadline::with_deadline;
use coldmail_common::generation::TextGenerator;

use crate::cache::ExtractionCache;
use crate::error::ExtractionError;
use crate::model::{canonical_skills, JobRecord};
use crate::normalizer::NormalizedText;
use crate::prompts;

pub struct JobExtractor {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    cache: Option<Arc<ExtractionCache>>,
}

impl JobExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self {
            generator,
            timeout,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ExtractionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Extract jobs in the order the collaborator emitted them.
    pub async fn extract(&self, text: &NormalizedText) -> Result<Vec<JobRecord>, ExtractionError> {
        if text.is_empty() {
            debug!("empty page text, nothing to extract");
            return Ok(Vec::new());
        }

        if let Some(cache) = &self.cache {
            if let Some(jobs) = cache.get_jobs(text.as_str()).await {
                info!(jobs = jobs.len(), "extraction cache hit");
                return Ok(jobs);
            }
        }

        let prompt = prompts::extract_prompt(text.as_str());
        let raw = with_deadline(
            "generate",
            self.timeout,
            self.generator.generate(prompts::EXTRACT_SYSTEM, &prompt),
        )
        .await?;

        let jobs = parse_jobs(&raw)?;
        info!(jobs = jobs.len(), truncated_input = text.truncated(), "jobs extracted");

        if let Some(cache) = &self.cache {
            cache.set_jobs(text.as_str(), &jobs).await;
        }
        Ok(jobs)
    }
}

/// Validate collaborator output and build job records from it.
///
/// Accepted shapes: a JSON list of objects, or a single job object (treated as a one-element
/// list). Markdown code fences and chatter around the JSON are tolerated. Objects without a
/// usable `skills` field are dropped, since evidence matching cannot work without it.
pub fn parse_jobs(raw: &str) -> Result<Vec<JobRecord>, ExtractionError> {
    let value = parse_json_payload(raw).ok_or_else(|| ExtractionError::Malformed {
        reason: format!("not parseable as JSON: {}", preview(raw)),
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) if looks_like_job(&map) => vec![Value::Object(map)],
        other => {
            return Err(ExtractionError::Malformed {
                reason: format!("expected a list of job objects, got {}", json_kind(&other)),
            })
        }
    };

    let total = items.len();
    let jobs: Vec<JobRecord> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| job_from_value(index, item))
        .collect();
    if jobs.len() < total {
        warn!(kept = jobs.len(), dropped = total - jobs.len(), "dropped malformed job records");
    }
    Ok(jobs)
}

fn job_from_value(index: usize, item: Value) -> Option<JobRecord> {
    let map = match item {
        Value::Object(map) => map,
        other => {
            warn!(index, kind = json_kind(&other), "job record is not an object, dropping");
            return None;
        }
    };

    let skills = match map.get("skills") {
        Some(Value::Array(values)) => {
            let strings: Vec<&str> = values.iter().filter_map(Value::as_str).collect();
            if strings.len() < values.len() {
                warn!(index, "ignoring non-string skill entries");
            }
            canonical_skills(strings)
        }
        Some(Value::String(joined)) => canonical_skills(joined.split(',')),
        Some(other) => {
            warn!(index, kind = json_kind(other), "job record `skills` is not a list, dropping");
            return None;
        }
        None => {
            warn!(index, "job record has no `skills` field, dropping");
            return None;
        }
    };

    Some(JobRecord {
        role: string_field(&map, "role").unwrap_or_default(),
        experience: string_field(&map, "experience"),
        skills,
        description: string_field(&map, "description").unwrap_or_default(),
    })
}

/// String value of `key`; numbers are rendered, blanks and other kinds count as absent.
fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match map.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn looks_like_job(map: &Map<String, Value>) -> bool {
    map.contains_key("skills") || map.contains_key("role")
}

fn parse_json_payload(raw: &str) -> Option<Value> {
    let body = strip_code_fence(raw.trim());
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }
    // Models sometimes wrap the JSON in prose, which may itself contain brackets. Take the
    // first list of objects that parses from some `[`, then the first object from some `{`.
    for (idx, _) in body.match_indices('[') {
        if let Some(Value::Array(items)) = first_value_at(&body[idx..]) {
            if items.iter().all(Value::is_object) {
                return Some(Value::Array(items));
            }
        }
    }
    body.match_indices('{')
        .find_map(|(idx, _)| first_value_at(&body[idx..]).filter(Value::is_object))
}

/// The JSON value at the start of `s`, ignoring whatever follows it.
fn first_value_at(s: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(s)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Skip the info string (e.g. "json") on the opening fence line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn preview(raw: &str) -> String {
    const MAX: usize = 80;
    let trimmed = raw.trim();
    if trimmed.chars().count() > MAX {
        format!("{}...", trimmed.chars().take(MAX).collect::<String>())
    } else {
        trimmed.to_string()
    }
}
