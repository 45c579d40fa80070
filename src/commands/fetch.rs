use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use icalarchive_core::{ArchiveConfig, MergeReport};
use owo_colors::OwoColorize;
use tokio::task::JoinSet;

use super::create_spinner;
use crate::config::expand_path;
use crate::render::Render;
use crate::state::DataDir;

/// Read every selected source's feed and merge it, one task per source.
///
/// The data directory stays locked from loading the store until it is saved;
/// a concurrent fetch fails fast instead of dropping this one's merges.
pub async fn run(config: &ArchiveConfig, data: &DataDir, source: Option<&str>) -> Result<()> {
    let sources: Vec<(String, String)> = match source {
        Some(id) => {
            let Some(cfg) = config.sources.get(id) else {
                let available: Vec<_> = config.sources.keys().cloned().collect();
                anyhow::bail!(
                    "Source '{}' not found. Available: {}",
                    id,
                    available.join(", ")
                );
            };
            vec![(id.to_string(), cfg.path.clone())]
        }
        None => config
            .enabled_sources()
            .map(|(id, cfg)| (id.to_string(), cfg.path.clone()))
            .collect(),
    };

    if sources.is_empty() {
        anyhow::bail!("No enabled sources configured");
    }

    let _lock = data.lock()?;
    let archive = Arc::new(data.load_archive()?);
    let fetched_at = Utc::now();

    let spinner = create_spinner(format!("Fetching {} sources", sources.len()));
    let mut tasks = JoinSet::new();
    for (source_id, path) in sources {
        let archive = archive.clone();
        tasks.spawn(async move {
            let result = fetch_one(&archive, &source_id, &path, fetched_at).await;
            (source_id, result)
        });
    }

    let mut results: Vec<(String, Result<MergeReport>)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    spinner.finish_and_clear();
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut failed = 0;
    for (source_id, result) in &results {
        println!("📅 {}", source_id);
        match result {
            Ok(report) => println!("{}", report.render()),
            Err(e) => {
                failed += 1;
                println!("   {}", format!("{:#}", e).red());
            }
        }
    }

    // Any successful fetch moves that source's last_fetch
    if failed < results.len() {
        data.save_store(&archive.snapshot())?;
        tracing::info!(path = %data.path().display(), "saved store");
    }

    if failed > 0 {
        anyhow::bail!("{} of {} sources failed", failed, results.len());
    }
    Ok(())
}

async fn fetch_one(
    archive: &icalarchive_core::Archive,
    source_id: &str,
    path: &str,
    fetched_at: DateTime<Utc>,
) -> Result<MergeReport> {
    let path = expand_path(path);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    Ok(archive.ingest(source_id, &content, fetched_at)?)
}
