use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::composer::SenderProfile;
use crate::error::AppError;
use crate::evidence::{IndexConfig, DEFAULT_TOP_K};

#[derive(Debug, Clone)]
pub struct Config {
    pub lancedb_path: String,
    pub portfolio_csv: PathBuf,
    pub collection: String,
    pub redis_url: Option<String>,
    pub top_k: usize,
    pub dedup: bool,
    pub normalizer_max_chars: Option<usize>,
    pub collaborator_timeout: Duration,
    pub fetch_timeout: Duration,
    pub chat_model: String,
    pub sender: SenderProfile,
    pub tcp_listen_addr: Option<String>,
}

impl Config {
    /// Required:
    /// - `LANCEDB_PATH`
    ///
    /// Optional:
    /// - `PORTFOLIO_CSV` (default: "resource/my_portfolio.csv", must exist)
    /// - `PORTFOLIO_COLLECTION` (default: "portfolio")
    /// - `REDIS_URL`
    /// - `EVIDENCE_TOP_K` (default: 2), `EVIDENCE_DEDUP` (default: false)
    /// - `NORMALIZER_MAX_CHARS`
    /// - `COLLABORATOR_TIMEOUT_SECS` (default: 60), `FETCH_TIMEOUT_SECS` (default: 30)
    /// - `CHAT_MODEL` (default: "llama-3.3-70b-versatile")
    /// - `SENDER_NAME`, `SENDER_COMPANY`
    /// - `MCP_TCP_LISTEN_ADDR`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let lancedb_path = var("LANCEDB_PATH").ok_or_else(|| {
            AppError::Config("LANCEDB_PATH environment variable is required".to_string())
        })?;

        let portfolio_csv = PathBuf::from(
            var("PORTFOLIO_CSV").unwrap_or_else(|| "resource/my_portfolio.csv".to_string()),
        );
        if !portfolio_csv.exists() {
            return Err(AppError::Config(format!(
                "required file not found: {}",
                portfolio_csv.display()
            )));
        }

        let top_k = parse_var(&var, "EVIDENCE_TOP_K")?.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(AppError::Config("EVIDENCE_TOP_K must be at least 1".to_string()));
        }

        let defaults = SenderProfile::default();
        Ok(Self {
            lancedb_path,
            portfolio_csv,
            collection: var("PORTFOLIO_COLLECTION").unwrap_or_else(|| "portfolio".to_string()),
            redis_url: var("REDIS_URL"),
            top_k,
            dedup: parse_var(&var, "EVIDENCE_DEDUP")?.unwrap_or(false),
            normalizer_max_chars: parse_var(&var, "NORMALIZER_MAX_CHARS")?,
            collaborator_timeout: Duration::from_secs(
                parse_var(&var, "COLLABORATOR_TIMEOUT_SECS")?.unwrap_or(60),
            ),
            fetch_timeout: Duration::from_secs(parse_var(&var, "FETCH_TIMEOUT_SECS")?.unwrap_or(30)),
            chat_model: var("CHAT_MODEL").unwrap_or_else(|| "llama-3.3-70b-versatile".to_string()),
            sender: SenderProfile {
                name: var("SENDER_NAME").unwrap_or(defaults.name),
                company: var("SENDER_COMPANY").unwrap_or(defaults.company),
            },
            tcp_listen_addr: var("MCP_TCP_LISTEN_ADDR"),
        })
    }

    pub fn portfolio_path(&self) -> &Path {
        &self.portfolio_csv
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            collection: self.collection.clone(),
            top_k: self.top_k,
            dedup: self.dedup,
            embed_timeout: self.collaborator_timeout,
        }
    }
}

fn parse_var<T, V>(var: &V, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| AppError::Config(format!("invalid {key}={raw:?}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_with(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let csv = tempfile::NamedTempFile::new().expect("tempfile");
        let path = csv.path().to_string_lossy().to_string();
        let config = config_with(&[("LANCEDB_PATH", "/tmp/lance"), ("PORTFOLIO_CSV", path.as_str())])
            .expect("config");

        assert_eq!(config.collection, "portfolio");
        assert_eq!(config.top_k, 2);
        assert!(!config.dedup);
        assert_eq!(config.normalizer_max_chars, None);
        assert_eq!(config.collaborator_timeout, Duration::from_secs(60));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.chat_model, "llama-3.3-70b-versatile");
        assert!(config.redis_url.is_none());
        assert!(config.tcp_listen_addr.is_none());
        assert_eq!(config.index_config().embed_timeout, Duration::from_secs(60));
    }

    #[test]
    fn overrides_are_parsed() {
        let csv = tempfile::NamedTempFile::new().expect("tempfile");
        let path = csv.path().to_string_lossy().to_string();
        let config = config_with(&[
            ("LANCEDB_PATH", "/tmp/lance"),
            ("PORTFOLIO_CSV", path.as_str()),
            ("EVIDENCE_TOP_K", "3"),
            ("EVIDENCE_DEDUP", "true"),
            ("NORMALIZER_MAX_CHARS", "12000"),
            ("COLLABORATOR_TIMEOUT_SECS", "5"),
            ("SENDER_NAME", "Ada"),
            ("REDIS_URL", " "),
        ])
        .expect("config");

        assert_eq!(config.top_k, 3);
        assert!(config.dedup);
        assert_eq!(config.normalizer_max_chars, Some(12000));
        assert_eq!(config.collaborator_timeout, Duration::from_secs(5));
        assert_eq!(config.sender.name, "Ada");
        assert_eq!(config.sender.company, "AtliQ");
        // Blank values count as unset.
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn lancedb_path_is_required() {
        let err = config_with(&[]).expect_err("missing");
        assert!(err.to_string().contains("LANCEDB_PATH"));
    }

    #[test]
    fn missing_portfolio_file_is_rejected() {
        let err = config_with(&[
            ("LANCEDB_PATH", "/tmp/lance"),
            ("PORTFOLIO_CSV", "/nonexistent/portfolio.csv"),
        ])
        .expect_err("missing file");
        assert!(err.to_string().contains("required file not found"));
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let csv = tempfile::NamedTempFile::new().expect("tempfile");
        let path = csv.path().to_string_lossy().to_string();
        for (key, value) in [
            ("EVIDENCE_TOP_K", "two"),
            ("EVIDENCE_TOP_K", "0"),
            ("COLLABORATOR_TIMEOUT_SECS", "-1"),
            ("EVIDENCE_DEDUP", "maybe"),
        ] {
            let err = config_with(&[("LANCEDB_PATH", "/tmp/lance"), ("PORTFOLIO_CSV", path.as_str()), (key, value)])
                .expect_err("invalid value");
            assert!(matches!(err, AppError::Config(_)), "{key}={value}");
            assert!(err.to_string().contains(key));
        }
    }
}
