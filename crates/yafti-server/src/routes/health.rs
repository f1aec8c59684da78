/// GET /health: readiness probe, polled by wrappers before they load the UI.
pub async fn health() -> &'static str {
    "ok"
}
