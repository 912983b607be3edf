use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use ember_adapters::memory::MemoryStore;
use ember_adapters::persistence::sqlite::SqliteDb;
use ember_adapters::publisher::TracingPublisher;
use ember_app::clock::{Clock, SystemClock};
use ember_app::context::EngineContext;
use ember_core::rule::RuleDraft;

use crate::config::ServerConfig;

pub async fn build_context(config: &ServerConfig) -> anyhow::Result<EngineContext> {
    build_context_with_clock(config, Arc::new(SystemClock)).await
}

/// Picks the store named by `database_url`, wires the engines over it and
/// seeds the configured rules.
pub async fn build_context_with_clock(
    config: &ServerConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<EngineContext> {
    let engine = config.engine_config()?;

    let ctx = if config.uses_memory_store() {
        tracing::info!("using in-memory store");
        let store = MemoryStore::new();
        EngineContext::assemble(
            store.clone(),
            store.clone(),
            store.clone(),
            TracingPublisher::new(store),
            engine,
            clock,
        )
    } else {
        let db = SqliteDb::new(&config.database_url)
            .await
            .with_context(|| format!("opening {}", config.database_url))?;
        tracing::info!(url = %config.database_url, "using sqlite store");
        EngineContext::assemble(
            db.clone(),
            db.clone(),
            db.clone(),
            TracingPublisher::new(db),
            engine,
            clock,
        )
    };

    if let Some(path) = &config.rules_file {
        let drafts = load_rules(path)?;
        let total = drafts.len();
        let created = ctx.seed_rules(drafts).await?;
        tracing::info!(path = %path.display(), created, total, "rules seeded");
    }

    Ok(ctx)
}

pub fn load_rules(path: &Path) -> anyhow::Result<Vec<RuleDraft>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading rules {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing rules {}", path.display()))
}
