/// Scraped page text → clean prose for the job extractor.
///
/// Steps, in order:
/// 1. decode HTML entities (so `&lt;div&gt;` is seen as markup and removed below),
/// 2. drop `<script>`/`<style>` bodies and HTML comments,
/// 3. replace remaining tags with a space,
/// 4. drop URLs,
/// 5. drop whole lines that are site chrome ("Apply now", "Sign in", ...),
/// 6. replace control characters and symbol noise with a space,
/// 7. collapse whitespace runs and trim.
///
/// Truncation only happens when a limit is configured, and it is reported on the result.
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static RE_SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").expect("valid regex")
});
static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)</?[A-Za-z!][^>]*>").expect("valid regex"));
static RE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("valid regex"));

/// Lines consisting only of one of these phrases are navigation chrome, not posting content.
const BOILERPLATE_LINES: &[&str] = &[
    "apply",
    "apply now",
    "apply for this job",
    "save job",
    "share",
    "share this job",
    "sign in",
    "sign up",
    "log in",
    "login",
    "skip to content",
    "skip to main content",
    "accept cookies",
    "accept all cookies",
    "back to jobs",
    "view all jobs",
];

/// Punctuation that carries meaning in postings (`C++`, `C#`, `Node.js`, `CI/CD`, `$120k`).
const KEPT_PUNCTUATION: &str = ".,:;+#/()&'\"!?%$@-";

/// Output of [`Normalizer::normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    truncated: bool,
}

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// True when the configured character limit cut the text short.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    max_chars: Option<usize>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the output at `max_chars` characters. Cut output is flagged and logged.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }

    pub fn normalize(&self, raw: &str) -> NormalizedText {
        let decoded = html_escape::decode_html_entities(raw);
        let text = RE_SCRIPT_STYLE.replace_all(&decoded, " ");
        let text = RE_COMMENT.replace_all(&text, " ");
        let text = RE_TAG.replace_all(&text, " ");
        let text = RE_URL.replace_all(&text, " ");

        let kept_lines: Vec<&str> = text.lines().filter(|line| !is_boilerplate(line)).collect();
        let scrubbed: String = kept_lines
            .join("\n")
            .chars()
            .map(|c| if is_kept(c) { c } else { ' ' })
            .collect();
        let mut text = scrubbed.split_whitespace().collect::<Vec<_>>().join(" ");

        let mut truncated = false;
        if let Some(limit) = self.max_chars {
            let total = text.chars().count();
            if total > limit {
                text = text.chars().take(limit).collect::<String>().trim_end().to_string();
                truncated = true;
                warn!(chars = total, limit, "normalized text truncated");
            }
        }

        NormalizedText { text, truncated }
    }
}

fn is_boilerplate(line: &str) -> bool {
    let line = line.trim().trim_end_matches(['.', '!', ':']).to_lowercase();
    BOILERPLATE_LINES.contains(&line.as_str())
}

fn is_kept(c: char) -> bool {
    // `<` and `>` never survive, so leftovers of broken markup cannot look like tags.
    if c.is_control() {
        return c.is_whitespace();
    }
    c.is_alphanumeric() || c.is_whitespace() || KEPT_PUNCTUATION.contains(c)
}
