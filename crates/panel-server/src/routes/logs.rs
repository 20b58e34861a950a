use axum::extract::{Query, State};
use axum::Json;
use panel_core::actions::{Actions, DEFAULT_LOG_LINES};
use panel_core::PanelError;
use serde::Deserialize;

use super::blocking;
use crate::error::AppError;
use crate::state::AppState;

const MAX_LOG_LINES: usize = 5000;

#[derive(Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    lines: Option<usize>,
}

/// GET /api/logs: tail of the automation log on one host (the first
/// inventory server unless `host` is given).
pub async fn get_logs(
    State(app): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let lines = query.lines.unwrap_or(DEFAULT_LOG_LINES);
    if lines == 0 || lines > MAX_LOG_LINES {
        return Err(AppError::bad_request(format!(
            "lines must be between 1 and {MAX_LOG_LINES}"
        )));
    }
    let host = match query.host {
        Some(host) => app.require_host(&host)?.host,
        None => app
            .servers()
            .into_iter()
            .next()
            .map(|s| s.host)
            .ok_or(PanelError::EmptyInventory)?,
    };

    let state = app.clone();
    let target = host.clone();
    let logs = blocking(move || {
        Actions::new(state.executor.as_ref(), &state.settings).fetch_logs(&target, lines)
    })
    .await?;

    Ok(Json(serde_json::json!({ "host": host, "logs": logs })))
}
