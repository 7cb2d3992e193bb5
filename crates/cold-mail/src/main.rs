mod cache;
mod composer;
mod config;
mod error;
mod evidence;
mod extractor;
mod fetch;
mod model;
mod normalizer;
mod pipeline;
mod portfolio;
mod prompts;
mod server;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coldmail_common::embedding::Embedder;
use coldmail_common::openai::{ChatGenerator, OpenAiClient, OpenAiClientConfig};
use coldmail_common::redis::RedisCache;
use coldmail_common::vectordb::VectorDb;

use cache::ExtractionCache;
use composer::EmailComposer;
use config::Config;
use evidence::{BuildOutcome, EvidenceIndex};
use extractor::JobExtractor;
use fetch::DocumentFetcher;
use normalizer::Normalizer;
use pipeline::Pipeline;
use server::ColdMailServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting cold-mail MCP server");

    let config = Config::from_env()?;
    info!(
        portfolio = %config.portfolio_csv.display(),
        lancedb_path = %config.lancedb_path,
        collection = %config.collection,
        redis = config.redis_url.is_some(),
        model = %config.chat_model,
        "configuration loaded"
    );

    let redis_cache = RedisCache::new(config.redis_url.as_deref());
    if redis_cache.is_available().await {
        info!("redis connected");
    } else {
        info!("redis unavailable, running without extraction cache");
    }
    let cache = Arc::new(ExtractionCache::new(redis_cache));

    info!("initializing embedding model (may download on first run)");
    let embedder = Arc::new(Embedder::new().await?);
    info!("embedding model ready");

    let vectordb = Arc::new(VectorDb::connect(&config.lancedb_path).await?);
    info!("lancedb connected");

    let index = EvidenceIndex::new(vectordb, embedder, config.index_config());
    match index.build_from_csv(config.portfolio_path()).await? {
        BuildOutcome::Skipped { existing } => {
            info!(entries = existing, "portfolio already indexed, skipping population")
        }
        BuildOutcome::Populated { inserted, skipped } => {
            info!(inserted, skipped, "portfolio indexed")
        }
    }

    let openai = OpenAiClient::new(OpenAiClientConfig::from_env())?;
    let generator = Arc::new(ChatGenerator::new(openai, config.chat_model.clone()));

    let mut normalizer = Normalizer::new();
    if let Some(max_chars) = config.normalizer_max_chars {
        normalizer = normalizer.with_max_chars(max_chars);
    }
    let extractor = JobExtractor::new(generator.clone(), config.collaborator_timeout).with_cache(cache);
    let composer = EmailComposer::new(generator, config.sender.clone(), config.collaborator_timeout);
    let pipeline = Arc::new(Pipeline::new(normalizer, extractor, Arc::new(index), composer));
    let fetcher = Arc::new(DocumentFetcher::new(config.fetch_timeout)?);

    let server = ColdMailServer::new(pipeline, fetcher);

    if let Some(addr) = config.tcp_listen_addr.as_deref() {
        let listener = TcpListener::bind(addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                tracing::info!(peer = %peer, "MCP client connected");
                let service = server.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                tracing::info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}
