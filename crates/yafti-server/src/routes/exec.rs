use axum::{
    extract::{Form, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::StreamExt as _;
use tracing::info;
use yafti_core::{error::YaftiError, selection::normalize_ids};

use crate::{
    error::AppError,
    runner::{ExecEvent, ExecStream},
    state::AppState,
};

/// Convert a runner event into one SSE frame.
///
/// Output lines go out as `stdout` / `stderr` events; the terminal status is
/// a `status` event carrying JSON.
pub fn to_sse(event: ExecEvent) -> Event {
    match event {
        ExecEvent::Stdout { line } => Event::default().event("stdout").data(sse_safe(line)),
        ExecEvent::Stderr { line } => Event::default().event("stderr").data(sse_safe(line)),
        ExecEvent::Finished {
            status,
            duration_seconds,
        } => {
            let mut body = serde_json::to_value(&status).unwrap_or_default();
            if let serde_json::Value::Object(map) = &mut body {
                map.insert("message".into(), status.to_string().into());
                map.insert("duration_seconds".into(), duration_seconds.into());
            }
            Event::default().event("status").data(body.to_string())
        }
    }
}

// SSE cannot carry a bare carriage return; progress bars use them a lot.
fn sse_safe(line: String) -> String {
    if line.contains('\r') {
        line.replace('\r', "\n")
    } else {
        line
    }
}

fn stream_response(stream: ExecStream) -> Response {
    let events = stream.map(|event| Ok::<Event, Infallible>(to_sse(event)));
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct CommandForm {
    #[serde(default)]
    pub cmd: String,
}

/// POST /_/command: run one raw command and stream its output.
pub async fn run_command(
    State(app): State<AppState>,
    Form(form): Form<CommandForm>,
) -> Result<Response, AppError> {
    if form.cmd.trim().is_empty() {
        return Err(AppError::bad_request("No command provided"));
    }
    info!(shell = %app.runner.shell().display(), "running raw command");
    Ok(stream_response(app.runner.run(vec![form.cmd])))
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    #[serde(default)]
    pub script_ids: Vec<String>,
}

/// POST /_/apply_changes: run the scripts of the selected actions, in
/// catalog order, stopping at the first failure.
pub async fn apply_changes(
    State(app): State<AppState>,
    Json(req): Json<ApplyRequest>,
) -> Result<Response, AppError> {
    if req.script_ids.is_empty() {
        return Err(AppError::bad_request("No script IDs provided"));
    }

    let ids = normalize_ids(req.script_ids);
    let (actions, found) = app.catalog.lookup_many(&ids);
    if !found {
        return Err(YaftiError::ActionNotFound(ids.join(", ")).into());
    }

    let scripts: Vec<String> = actions
        .iter()
        .filter(|a| a.has_script())
        .map(|a| a.script.clone())
        .collect();
    if scripts.is_empty() {
        return Err(AppError::bad_request(
            "Selected actions contain no scripts to execute",
        ));
    }

    let applied: Vec<&str> = actions
        .iter()
        .filter(|a| a.has_script())
        .map(|a| a.id.as_str())
        .collect();
    info!(actions = ?applied, "applying changes");
    Ok(stream_response(app.runner.run(scripts)))
}
