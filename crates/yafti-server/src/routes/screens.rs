use axum::{
    extract::{Path, State},
    Json,
};
use yafti_core::config::{Action, Screen};

use crate::{error::AppError, state::AppState};

/// GET /api/config: catalog title and shape.
pub async fn get_config(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "title": app.config.title,
        "screens": app.config.screens.len(),
        "actions": app.catalog.len(),
        "defaults": app.config.default_action_ids(),
    }))
}

/// GET /api/screens
pub async fn list_screens(State(app): State<AppState>) -> Json<Vec<Screen>> {
    Json(app.config.screens.clone())
}

/// GET /api/screens/{idx}
pub async fn get_screen(
    Path(idx): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<Screen>, AppError> {
    let idx: usize = idx
        .parse()
        .map_err(|_| AppError::bad_request(format!("Invalid screen index '{idx}'")))?;
    Ok(Json(app.config.screen(idx)?.clone()))
}

/// GET /api/actions/{id}
pub async fn get_action(
    Path(id): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<Action>, AppError> {
    Ok(Json(app.catalog.lookup(&id)?))
}
