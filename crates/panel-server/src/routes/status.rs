use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use panel_core::inventory::{ServerRecord, ServerStatus};
use panel_core::runners::{self, RunnerUnit};
use panel_core::secrets;
use panel_core::status::{StatusReport, StatusSnapshot};
use serde::Serialize;

use super::blocking;
use crate::error::AppError;
use crate::state::AppState;

/// A server record with its latest snapshot folded in.
#[derive(Debug, Serialize)]
pub struct ServerStatusView {
    pub name: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub status: ServerStatus,
    pub automation_active: bool,
    pub runner_count: usize,
    pub last_activity: String,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerStatusView {
    pub fn new(server: ServerRecord, report: &StatusReport) -> Self {
        let snapshot: &StatusSnapshot = report.snapshot();
        Self {
            name: server.name,
            host: server.host,
            user: server.user,
            status: snapshot.status.into(),
            automation_active: snapshot.automation_active,
            runner_count: snapshot.runner_count,
            last_activity: snapshot.last_activity.clone(),
            checked_at: snapshot.checked_at,
            error: report.error().map(str::to_string),
        }
    }
}

/// GET /api/server-status: probe every server (memoized) and merge the
/// results into the stored records.
pub async fn server_status(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let state = app.clone();
    let views = blocking(move || {
        let views: Vec<ServerStatusView> = state
            .servers()
            .into_iter()
            .map(|server| {
                let report = state.aggregator.get_report(&server.host);
                ServerStatusView::new(server, &report)
            })
            .collect();
        Ok(views)
    })
    .await?;

    app.update_servers(|record| {
        if let Some(view) = views.iter().find(|v| v.host == record.host) {
            record.merge(view.status);
        }
    });

    let config = secrets::load_secrets(&app.settings.vault).masked();
    Ok(Json(serde_json::json!({
        "success": true,
        "servers": views,
        "config": config,
    })))
}

/// GET /api/server-detail/{host}: one server's status and runner units.
pub async fn server_detail(
    State(app): State<AppState>,
    Path(host): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let server = app.require_host(&host)?;
    let state = app.clone();
    let (report, runners) = blocking(move || {
        let report = state.aggregator.get_report(&host);
        let runners: Vec<RunnerUnit> =
            match runners::list_runners(state.executor.as_ref(), &state.settings, &host) {
                Ok(units) => units,
                Err(e) => {
                    tracing::warn!(host = %host, "error listing runners: {e}");
                    Vec::new()
                }
            };
        Ok((report, runners))
    })
    .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "server": server,
        "status": report.snapshot(),
        "error": report.error(),
        "runners": runners,
    })))
}

/// POST /api/status/reset: drop every memoized status.
pub async fn reset_status(State(app): State<AppState>) -> Json<serde_json::Value> {
    app.aggregator.reset();
    tracing::info!("status cache cleared");
    Json(serde_json::json!({ "status": "reset" }))
}
