use axum::{
    extract::{rejection::FormRejection, Form, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use tracing::{debug, info};
use yafti_core::{error::YaftiError, selection::Selection};

use crate::{error::AppError, state::AppState};

pub const SELECTION_COOKIE: &str = "script_ids";

/// Read a cookie value from every `Cookie` header on the request.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .find_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
        .filter(|v| !v.is_empty())
}

/// Resolve a selection to `{ ids, actions }`, actions in catalog order.
fn resolve(app: &AppState, selection: &Selection) -> Json<serde_json::Value> {
    let ids = selection.resolve();
    let (actions, found) = app.catalog.lookup_many(&ids);
    if !found && !ids.is_empty() {
        debug!(?ids, "none of the selected ids are in the catalog");
    }
    Json(serde_json::json!({
        "ids": ids,
        "actions": actions,
    }))
}

/// GET /confirm_changes: resolve the selection carried in the `script_ids` cookie.
pub async fn confirm_from_cookie(
    State(app): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let raw = cookie_value(&headers, SELECTION_COOKIE)
        .ok_or_else(|| AppError::bad_request(format!("Missing cookie '{SELECTION_COOKIE}'")))?;
    let selection = Selection::parse(&raw)?;
    Ok(resolve(&app, &selection))
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmForm {
    #[serde(rename = "scriptIds", default)]
    pub script_ids: Option<String>,
}

/// POST /confirm_changes: resolve the selection from the `scriptIds` form
/// field, falling back to the `script_ids` cookie. A missing or non-form
/// body counts as an absent field.
pub async fn confirm_from_form(
    State(app): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<ConfirmForm>, FormRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!(%rejection, "no usable form body, trying cookie");
            ConfirmForm::default()
        }
    };
    let mut first_error: Option<YaftiError> = None;

    if let Some(raw) = form.script_ids.filter(|v| !v.trim().is_empty()) {
        match Selection::parse(&raw) {
            Ok(selection) => {
                info!("using script ids from form data");
                return Ok(resolve(&app, &selection));
            }
            Err(e) => {
                debug!(error = %e, "form selection unusable, trying cookie");
                first_error = Some(e);
            }
        }
    }

    if let Some(raw) = cookie_value(&headers, SELECTION_COOKIE) {
        match Selection::parse(&raw) {
            Ok(selection) => {
                info!("using script ids from cookie");
                return Ok(resolve(&app, &selection));
            }
            Err(e) => {
                debug!(error = %e, "cookie selection unusable");
                first_error.get_or_insert(e);
            }
        }
    }

    Err(match first_error {
        Some(e) => e.into(),
        None => AppError::bad_request("No script IDs found in form data or cookies"),
    })
}
