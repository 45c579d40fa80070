use anyhow::{Context, Result};
use icalarchive_core::Identity;
use owo_colors::OwoColorize;

use crate::state::DataDir;

/// Set or clear the manual hide mark of `identity` (`source::uid`).
pub fn run(data: &DataDir, identity: &str, hidden: bool) -> Result<()> {
    let identity: Identity = identity
        .parse()
        .with_context(|| format!("Invalid identity '{}', expected source::uid", identity))?;

    let _lock = data.lock()?;
    if !data.load_archive()?.snapshot().contains(&identity) {
        tracing::warn!(%identity, "identity is not in the store yet; marking anyway");
    }

    let mut marks = data.load_hidden()?;
    let changed = marks.set(identity.clone(), hidden);
    if changed {
        data.save_hidden(&marks)?;
    }

    let state = if hidden { "hidden" } else { "shown" };
    if changed {
        println!("{} {}", identity, state.green());
    } else {
        println!("{} already {}", identity, state.dimmed());
    }
    Ok(())
}
