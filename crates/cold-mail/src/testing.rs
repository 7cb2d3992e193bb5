/// Deterministic collaborators for unit tests.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use coldmail_common::embedding::TextEmbedder;
use coldmail_common::error::CommonError;
use coldmail_common::generation::TextGenerator;
use coldmail_common::memory::MemoryStore;
use coldmail_common::vectordb::{Neighbor, VectorRow, VectorStore};

pub const HASH_DIMENSIONS: usize = 256;

/// Bag-of-tokens embedder: each token bumps one FNV-1a bucket. The last dimension carries a
/// small bias so no text maps to the zero vector.
pub struct HashEmbedder {
    pub calls: AtomicUsize,
    delay: Option<Duration>,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep this long inside every `embed`, yielding to other tasks.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; HASH_DIMENSIONS];
        for token in text
            .to_lowercase()
            .split(|c: char| !(c.is_alphanumeric() || matches!(c, '.' | '+' | '#')))
            .map(|t| t.trim_matches('.'))
            .filter(|t| !t.is_empty())
        {
            v[fnv1a(token) % (HASH_DIMENSIONS - 1)] += 1.0;
        }
        v[HASH_DIMENSIONS - 1] = 0.05;
        v
    }
}

fn fnv1a(s: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in s.bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash as usize
}

#[async_trait]
impl TextEmbedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        HASH_DIMENSIONS
    }
}

/// Embedder that never answers in time.
pub struct StalledEmbedder;

#[async_trait]
impl TextEmbedder for StalledEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }

    fn dimensions(&self) -> usize {
        HASH_DIMENSIONS
    }
}

type Script = Box<dyn Fn(&str, &str) -> Result<String, CommonError> + Send + Sync>;

/// Generator whose reply is computed by a closure over (system, prompt).
pub struct ScriptedGenerator {
    script: Script,
    delay: Option<Duration>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, CommonError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_, _| Ok(reply.clone()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, CommonError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.script)(system, prompt)
    }
}

/// `MemoryStore` wrapper counting every call, optionally failing them all. `inserts` counts
/// writes that actually landed rows.
pub struct CountingStore {
    inner: MemoryStore,
    pub calls: AtomicUsize,
    pub inserts: AtomicUsize,
    broken: bool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            broken: false,
        }
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn touch(&self) -> Result<(), CommonError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(CommonError::VectorDb("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for CountingStore {
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), CommonError> {
        self.touch()?;
        self.inner.ensure_collection(name, dimensions).await
    }

    async fn count(&self, name: &str) -> Result<usize, CommonError> {
        self.touch()?;
        self.inner.count(name).await
    }

    async fn insert(&self, name: &str, rows: Vec<VectorRow>) -> Result<(), CommonError> {
        self.touch()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(name, rows).await
    }

    async fn insert_if_empty(
        &self,
        name: &str,
        rows: Vec<VectorRow>,
    ) -> Result<bool, CommonError> {
        self.touch()?;
        let wrote = self.inner.insert_if_empty(name, rows).await?;
        if wrote {
            self.inserts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(wrote)
    }

    async fn nearest(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>, CommonError> {
        self.touch()?;
        self.inner.nearest(name, query, k).await
    }
}
