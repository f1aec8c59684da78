use crate::error::{Result, YaftiError};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "YAFTI_CONFIG";

/// Locations searched, in order, when no config path is given. Relative
/// entries are resolved against the working directory.
pub const DEFAULT_CONFIG_LOCATIONS: &[&str] = &[
    "yafti.yml",
    "yafti.yaml",
    "/etc/yafti.yml",
    "/usr/share/yafti/yafti.yml",
];

/// Resolve the config file location.
///
/// Priority:
/// 1. `--config` flag / `YAFTI_CONFIG` env var (passed in as `explicit`)
/// 2. First existing entry of [`DEFAULT_CONFIG_LOCATIONS`]
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_in(&cwd)
}

fn find_in(cwd: &Path) -> Result<PathBuf> {
    let searched = candidates(cwd);
    match searched.iter().find(|p| p.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(YaftiError::ConfigNotFound { searched }),
    }
}

pub fn candidates(cwd: &Path) -> Vec<PathBuf> {
    DEFAULT_CONFIG_LOCATIONS
        .iter()
        .map(|loc| cwd.join(loc))
        .collect()
}
