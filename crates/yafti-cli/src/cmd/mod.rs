pub mod check;
pub mod list;
pub mod run;
pub mod serve;

use anyhow::Result;
use std::path::{Path, PathBuf};
use yafti_core::{config::Config, paths};

/// Locate and load the config file. Both failures are fatal for every command.
pub fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, Config)> {
    let path = paths::resolve_config_path(explicit)?;
    let config = Config::load(&path)?;
    Ok((path, config))
}
