use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::process::Command;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error, info, warn};

/// Environment variable carrying the server URL into the wrapper process.
pub const URL_ENV: &str = "YAFTI_URL";

/// Placeholder replaced with the server URL in wrapper arguments.
pub const URL_PLACEHOLDER: &str = "{url}";

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Process-wide shutdown handle.
///
/// Wraps one [`CancellationToken`]. The first [`Shutdown::request`] records
/// its reason and fires the token; every later request is a no-op.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin shutdown. Returns `false` if it had already begun.
    pub fn request(&self, reason: &str) -> bool {
        {
            let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(first) = slot.as_deref() {
                debug!(reason, first, "shutdown already in progress");
                return false;
            }
            *slot = Some(reason.to_string());
        }
        info!(reason, "shutdown requested");
        self.token.cancel();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

// ---------------------------------------------------------------------------
// Wrapper process
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WrapperError {
    #[error("wrapper command is empty")]
    Empty,

    #[error("wrapper program '{0}' not found")]
    NotFound(String),

    #[error("process error: {0}")]
    Process(#[from] std::io::Error),
}

/// An external process (typically a webview window host) whose lifetime is
/// tied 1:1 to the server's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WrapperCommand {
    /// Split a whitespace-separated command line.
    pub fn parse(cmdline: &str) -> Result<Self, WrapperError> {
        let mut parts = cmdline.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(WrapperError::Empty)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn resolve_program(&self) -> Result<PathBuf, WrapperError> {
        which::which(&self.program).map_err(|_| WrapperError::NotFound(self.program.clone()))
    }

    pub fn args_for(&self, url: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(URL_PLACEHOLDER, url))
            .collect()
    }

    /// Run the wrapper until it exits or shutdown begins.
    ///
    /// Failing to start, or exiting for any reason, requests shutdown. When
    /// shutdown begins first, the wrapper child is terminated and reaped.
    /// Returns the wrapper's exit status when it exited on its own.
    pub async fn supervise(
        self,
        url: String,
        shutdown: Shutdown,
    ) -> Result<Option<ExitStatus>, WrapperError> {
        let program = match self.resolve_program() {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "cannot start wrapper");
                shutdown.request("wrapper unavailable");
                return Err(e);
            }
        };

        let spawned = Command::new(&program)
            .args(self.args_for(&url))
            .env(URL_ENV, &url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(c) => c,
            Err(e) => {
                error!(program = %program.display(), error = %e, "wrapper failed to start");
                shutdown.request("wrapper failed to start");
                return Err(e.into());
            }
        };
        info!(program = %program.display(), pid = child.id(), "wrapper started");

        tokio::select! {
            status = child.wait() => {
                match &status {
                    Ok(s) => info!(status = %s, "wrapper exited"),
                    Err(e) => warn!(error = %e, "waiting on wrapper failed"),
                }
                shutdown.request("wrapper exited");
                Ok(Some(status?))
            }
            _ = shutdown.cancelled() => {
                info!("stopping wrapper");
                let _ = child.kill().await;
                let _ = child.wait().await;
                Ok(None)
            }
        }
    }
}
