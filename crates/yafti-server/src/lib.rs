pub mod embed;
pub mod error;
pub mod heartbeat;
pub mod lifecycle;
pub mod routes;
pub mod runner;
pub mod settings;
pub mod state;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::lifecycle::WrapperCommand;
use crate::settings::DEFAULT_SHUTDOWN_GRACE;
use crate::state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        // Liveness
        .route(
            "/_/heartbeat",
            get(routes::heartbeat::heartbeat).post(routes::heartbeat::heartbeat),
        )
        .route(
            "/_/inhibit",
            get(routes::heartbeat::get_inhibit).put(routes::heartbeat::put_inhibit),
        )
        // Catalog
        .route("/api/config", get(routes::screens::get_config))
        .route("/api/screens", get(routes::screens::list_screens))
        .route("/api/screens/{idx}", get(routes::screens::get_screen))
        .route("/api/actions/{id}", get(routes::screens::get_action))
        // Selection
        .route(
            "/confirm_changes",
            get(routes::selection::confirm_from_cookie)
                .post(routes::selection::confirm_from_form),
        )
        // Execution (SSE)
        .route("/_/apply_changes", post(routes::exec::apply_changes))
        .route("/_/command", post(routes::exec::run_command))
        .fallback(embed::static_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// How the server process is surfaced to the user.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Open the default browser when no wrapper is configured.
    pub open_browser: bool,
    /// Process whose lifetime is tied to the server's.
    pub wrapper: Option<WrapperCommand>,
    /// How long in-flight requests get to drain once shutdown starts.
    pub shutdown_grace: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            open_browser: true,
            wrapper: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Bind `host:port` and serve until shutdown.
pub async fn serve(
    app_state: AppState,
    host: &str,
    port: u16,
    opts: ServeOptions,
) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    serve_on(app_state, listener, opts).await
}

/// Serve on a pre-bound listener until shutdown is requested.
///
/// Shutdown comes from the heartbeat monitor, the wrapper exiting, a signal
/// handler in the caller, or the server itself stopping. All of them go
/// through `app_state.shutdown`. Once it fires, in-flight requests get
/// `shutdown_grace` to finish before the server task is aborted, and the
/// wrapper (if any) is terminated and reaped before this returns.
pub async fn serve_on(
    app_state: AppState,
    listener: TcpListener,
    opts: ServeOptions,
) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    let url = format!("http://localhost:{port}");
    let shutdown = app_state.shutdown.clone();

    let monitor = tokio::spawn(app_state.heartbeat.clone().monitor(shutdown.clone()));

    let app = build_router(app_state);
    let token = shutdown.token();
    let mut server: JoinHandle<std::io::Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
    });

    info!("yafti server listening on {url}");

    // The listener is already bound, so the wrapper can connect right away.
    let wrapper = match opts.wrapper {
        Some(cmd) => Some(tokio::spawn(cmd.supervise(url.clone(), shutdown.clone()))),
        None => {
            if opts.open_browser {
                if let Err(e) = open::that_detached(&url) {
                    warn!(error = %e, "could not open a browser, visit {url} manually");
                }
            }
            None
        }
    };

    let finished = tokio::select! {
        res = &mut server => {
            shutdown.request("server stopped");
            Some(res)
        }
        _ = shutdown.cancelled() => None,
    };

    let served = match finished {
        Some(res) => res,
        None => match tokio::time::timeout(opts.shutdown_grace, &mut server).await {
            Ok(res) => res,
            Err(_) => {
                warn!(
                    grace_secs = opts.shutdown_grace.as_secs(),
                    "requests still in flight after grace period, aborting"
                );
                server.abort();
                Ok(Ok(()))
            }
        },
    };

    if tokio::time::timeout(Duration::from_secs(1), monitor)
        .await
        .is_err()
    {
        debug!("heartbeat monitor did not stop in time");
    }
    if let Some(task) = wrapper {
        match tokio::time::timeout(opts.shutdown_grace, task).await {
            Ok(Ok(Ok(Some(status)))) => debug!(%status, "wrapper finished"),
            Ok(Ok(Ok(None))) => debug!("wrapper stopped"),
            Ok(Ok(Err(e))) => warn!(error = %e, "wrapper failed"),
            Ok(Err(e)) => warn!(error = %e, "wrapper task panicked"),
            Err(_) => warn!("wrapper did not stop within the grace period"),
        }
    }

    info!(
        reason = shutdown.reason().as_deref().unwrap_or("unknown"),
        "yafti server stopped"
    );
    served??;
    Ok(())
}
