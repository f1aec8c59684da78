use anyhow::{bail, Result};
use std::path::Path;
use yafti_core::{
    config::{Config, WarnLevel},
    error::YaftiError,
    paths,
};

pub fn run(config_path: Option<&Path>) -> Result<i32> {
    let path = paths::resolve_config_path(config_path)?;
    let data = std::fs::read_to_string(&path).map_err(|e| YaftiError::ConfigUnavailable {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    // Parse without validation so every problem gets reported, not just the first.
    let config: Config =
        serde_yaml::from_str(&data).map_err(|e| YaftiError::ConfigUnavailable {
            path: path.clone(),
            reason: e.to_string(),
        })?;

    let warnings = config.validate();
    let mut errors = 0;
    for w in &warnings {
        match w.level {
            WarnLevel::Error => {
                errors += 1;
                println!("error: {}", w.message);
            }
            WarnLevel::Warning => println!("warning: {}", w.message),
        }
    }

    if errors > 0 {
        bail!("{errors} error(s) in {}", path.display());
    }

    println!(
        "ok: {} ({} screen(s), {} action(s), {} warning(s))",
        path.display(),
        config.screens.len(),
        config.actions().count(),
        warnings.len()
    );
    Ok(0)
}
