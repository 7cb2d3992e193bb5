/// Redis caching layer for job extraction results.
///
/// All operations degrade gracefully: a miss or an unavailable Redis means the extractor asks
/// the generation collaborator again.
///
/// Key schema:
/// - `cm:v1:jobs:{sha256(normalized text)}`: JSON Vec<JobRecord> (TTL 86400s)
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::model::JobRecord;
use coldmail_common::redis::RedisCache;

const KEY_PREFIX: &str = "cm:v1:";
const JOBS_TTL_SECS: u64 = 86_400;

pub struct ExtractionCache {
    redis: RedisCache,
}

impl ExtractionCache {
    pub fn new(redis: RedisCache) -> Self {
        Self { redis }
    }

    pub async fn get_jobs(&self, text: &str) -> Option<Vec<JobRecord>> {
        let key = jobs_key(text);
        let json = self.redis.get(&key).await?;
        serde_json::from_str(&json)
            .inspect_err(|e| warn!(error = %e, key, "cache deserialization failed"))
            .ok()
    }

    pub async fn set_jobs(&self, text: &str, jobs: &[JobRecord]) {
        let key = jobs_key(text);
        if let Ok(json) = serde_json::to_string(jobs) {
            self.redis.set_with_ttl(&key, &json, JOBS_TTL_SECS).await;
        }
    }
}

fn jobs_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = hasher.finalize();
    format!("{KEY_PREFIX}jobs:{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_and_content_addressed() {
        assert_eq!(jobs_key("rust engineer"), jobs_key("rust engineer"));
        assert_ne!(jobs_key("rust engineer"), jobs_key("go engineer"));
        assert!(jobs_key("x").starts_with("cm:v1:jobs:"));
        assert_eq!(jobs_key("x").len(), "cm:v1:jobs:".len() + 64);
    }

    #[tokio::test]
    async fn disabled_redis_always_misses() {
        let cache = ExtractionCache::new(RedisCache::disabled());
        cache.set_jobs("text", &[]).await;
        assert!(cache.get_jobs("text").await.is_none());
    }
}
