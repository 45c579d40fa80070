use anyhow::{Context, Result};
use icalarchive_core::ArchiveConfig;
use std::path::{Path, PathBuf};

/// Get the config directory path (~/.config/icalarchive)
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("icalarchive");
    Ok(config_dir)
}

/// Get the default config file path (~/.config/icalarchive/config.toml)
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Default location of store.json and hidden.json
pub fn default_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .context("Could not determine data directory")?
        .join("icalarchive");
    Ok(data_dir)
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Load and validate the archive config.
///
/// Values in the file can be overridden with `ICALARCHIVE_*` environment
/// variables, e.g. `ICALARCHIVE_WINDOW__PAST=30days`.
pub fn load_config(path: Option<&Path>) -> Result<ArchiveConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}\n\n\
            Create it with at least one source and output:\n\n\
            [sources.work]\n\
            path = \"~/feeds/work.ics\"\n\n\
            [[outputs]]\n\
            name = \"all\"",
            path.display()
        );
    }

    let config: ArchiveConfig = config::Config::builder()
        .add_source(config::File::from(path.clone()))
        .add_source(config::Environment::with_prefix("ICALARCHIVE").separator("__"))
        .build()
        .with_context(|| format!("Failed to read config file {}", path.display()))?
        .try_deserialize()
        .with_context(|| format!("Invalid config in {}", path.display()))?;

    config.validate()?;
    Ok(config)
}
