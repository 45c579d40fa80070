use anyhow::Result;
use icalarchive_core::{ArchiveConfig, TimeWindow};

use crate::render::Render;
use crate::state::DataDir;

/// Print the output feed to stdout, or each instance's decision with `explain`.
pub fn run(
    config: &ArchiveConfig,
    data: &DataDir,
    output: &str,
    window: TimeWindow,
    explain: bool,
) -> Result<()> {
    let archive = data.load_archive()?;
    let marks = data.load_hidden()?;

    if explain {
        for explained in archive.explain(config, output, &marks, &window)? {
            let instance = &explained.instance;
            println!(
                "{} {} {} ({})",
                instance.instance_start,
                instance.summary,
                explained.decision.render(),
                instance.output_uid()
            );
        }
        return Ok(());
    }

    let composition = archive.compose(config, output, &marks, &window)?;
    for diagnostic in &composition.diagnostics {
        tracing::warn!(output, "{}", diagnostic);
    }
    tracing::info!(output, published = composition.published, "composed");

    print!("{}", composition.ics);
    Ok(())
}
