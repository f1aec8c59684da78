use axum::{extract::State, Json};
use serde::Deserialize;

use crate::state::AppState;

pub const ACK: &str = "Heartbeat received";

/// GET|POST /_/heartbeat: reset the liveness timer.
pub async fn heartbeat(State(app): State<AppState>) -> &'static str {
    app.heartbeat.beat();
    ACK
}

#[derive(Debug, Deserialize)]
pub struct InhibitBody {
    pub inhibit: bool,
}

fn inhibit_status(app: &AppState) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "inhibit": app.heartbeat.is_inhibited(),
        "timeout_secs": app.heartbeat.timeout().as_secs(),
        "idle_secs": app.heartbeat.elapsed().as_secs(),
    }))
}

/// GET /_/inhibit: current state of the auto-shutdown override.
pub async fn get_inhibit(State(app): State<AppState>) -> Json<serde_json::Value> {
    inhibit_status(&app)
}

/// PUT /_/inhibit: suspend or resume heartbeat-driven shutdown.
pub async fn put_inhibit(
    State(app): State<AppState>,
    Json(body): Json<InhibitBody>,
) -> Json<serde_json::Value> {
    app.heartbeat.set_inhibit(body.inhibit);
    inhibit_status(&app)
}
