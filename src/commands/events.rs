use anyhow::Result;
use icalarchive_core::EventQuery;

use crate::render::Render;
use crate::state::DataDir;

pub fn run(data: &DataDir, query: EventQuery) -> Result<()> {
    let archive = data.load_archive()?;
    let marks = data.load_hidden()?;

    println!("{}", archive.list_events(&marks, &query).render());
    Ok(())
}
