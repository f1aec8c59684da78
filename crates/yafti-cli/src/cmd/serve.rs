use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use yafti_server::{
    lifecycle::{Shutdown, WrapperCommand},
    serve_on,
    settings::{ServerSettings, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SHELL},
    state::AppState,
    ServeOptions,
};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (0 = OS-assigned)
    #[arg(long, env = "YAFTI_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Don't open a browser when no wrapper is configured
    #[arg(long)]
    pub no_open: bool,

    /// Window host to launch; `{url}` in its arguments becomes the server URL
    #[arg(long, env = "YAFTI_WRAPPER")]
    pub wrapper: Option<String>,

    /// Shut down after this many seconds without a heartbeat
    #[arg(long, env = "YAFTI_HEARTBEAT_SECS", default_value_t = 30)]
    pub heartbeat_secs: u64,

    /// Start with heartbeat-driven shutdown suspended
    #[arg(long, env = "YAFTI_NO_AUTO_SHUTDOWN")]
    pub no_auto_shutdown: bool,

    /// Interpreter for action scripts
    #[arg(long, env = "YAFTI_SHELL", default_value = DEFAULT_SHELL)]
    pub shell: PathBuf,
}

pub fn run(config_path: Option<&Path>, args: ServeArgs) -> Result<i32> {
    let (path, config) = super::load_config(config_path)?;
    for w in config.validate() {
        warn!("{}", w.message);
    }

    let wrapper = args
        .wrapper
        .as_deref()
        .filter(|w| !w.trim().is_empty())
        .map(WrapperCommand::parse)
        .transpose()?;

    let settings = ServerSettings {
        heartbeat_timeout: Duration::from_secs(args.heartbeat_secs),
        shell: args.shell,
        inhibit_shutdown: args.no_auto_shutdown,
        ..Default::default()
    };
    let opts = ServeOptions {
        open_browser: !args.no_open,
        wrapper,
        shutdown_grace: settings.shutdown_grace,
    };
    let state = AppState::new(config, &settings);
    let title = state.config.title.clone();
    let host = args.host;
    let port = args.port;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
            .await
            .with_context(|| format!("cannot listen on {host}:{port}"))?;
        let actual_port = listener.local_addr()?.port();

        println!(
            "{title} → http://localhost:{actual_port}  (config {})",
            path.display()
        );

        tokio::spawn(forward_signals(state.shutdown.clone()));
        serve_on(state, listener, opts).await
    })?;
    Ok(0)
}

/// Turn Ctrl-C and SIGTERM into a shutdown request.
async fn forward_signals(shutdown: Shutdown) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            shutdown.request("interrupted");
        }
        _ = terminate => {
            shutdown.request("terminated");
        }
        _ = shutdown.cancelled() => {}
    }
}
