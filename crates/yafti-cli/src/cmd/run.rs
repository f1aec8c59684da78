use anyhow::{bail, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tokio_stream::StreamExt;
use tracing::{info, warn};
use yafti_core::{catalog::ActionCatalog, error::YaftiError, selection::normalize_ids};
use yafti_server::{
    runner::{ExecEvent, ScriptRunner},
    settings::DEFAULT_SHELL,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Action IDs to run
    pub ids: Vec<String>,

    /// Also run every action marked `default: true`
    #[arg(long)]
    pub defaults: bool,

    /// Interpreter for action scripts
    #[arg(long, env = "YAFTI_SHELL", default_value = DEFAULT_SHELL)]
    pub shell: PathBuf,
}

/// Run the selected scripts here, without the web UI.
///
/// Returns the process exit code mirroring the run status.
pub fn run(config_path: Option<&Path>, args: RunArgs) -> Result<i32> {
    let (_, config) = super::load_config(config_path)?;

    let mut ids = args.ids;
    if args.defaults {
        ids.extend(config.default_action_ids());
    }
    let ids = normalize_ids(ids);
    if ids.is_empty() {
        bail!("no actions selected (pass action IDs or --defaults)");
    }

    let catalog = ActionCatalog::from_config(&config);
    let (actions, found) = catalog.lookup_many(&ids);
    if !found {
        return Err(YaftiError::ActionNotFound(ids.join(", ")).into());
    }
    for id in ids.iter().filter(|id| !actions.iter().any(|a| &a.id == *id)) {
        warn!(id = %id, "unknown action, skipping");
    }

    let scripts: Vec<String> = actions
        .iter()
        .filter(|a| a.has_script())
        .map(|a| a.script.clone())
        .collect();
    if scripts.is_empty() {
        bail!("selected actions contain no scripts to execute");
    }
    info!(count = scripts.len(), "running scripts");

    let runner = ScriptRunner::new(args.shell);
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async move {
        let mut stream = runner.run(scripts);
        let mut outcome = None;
        while let Some(event) = stream.next().await {
            match event {
                ExecEvent::Stdout { line } => println!("{line}"),
                ExecEvent::Stderr { line } => eprintln!("{line}"),
                ExecEvent::Finished {
                    status,
                    duration_seconds,
                } => outcome = Some((status, duration_seconds)),
            }
        }
        outcome
    });

    let Some((status, secs)) = outcome else {
        bail!("script runner stopped without reporting a status");
    };
    if status.is_success() {
        eprintln!("done in {secs:.1}s");
    } else {
        eprintln!("yafti: {status}");
    }
    Ok(status.exit_code())
}
