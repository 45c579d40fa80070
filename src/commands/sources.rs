use anyhow::Result;
use icalarchive_core::ArchiveConfig;
use owo_colors::OwoColorize;

use crate::render::Render;
use crate::state::DataDir;

pub fn run(config: &ArchiveConfig, data: &DataDir) -> Result<()> {
    let stats = data.load_archive()?.stats();

    for stat in &stats {
        let note = match config.sources.get(&stat.source_id) {
            Some(s) if !s.enabled => " (disabled)",
            Some(_) => "",
            None => " (no longer configured)",
        };
        println!("{}{}", stat.render(), note.dimmed());
    }

    for source_id in config.sources.keys() {
        if !stats.iter().any(|s| s.source_id == *source_id) {
            println!("📅 {} {}", source_id, "never fetched".dimmed());
        }
    }
    Ok(())
}
