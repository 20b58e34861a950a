use axum::extract::State;
use axum::Json;
use panel_core::actions::{ActionOutcome, Actions};
use serde::Deserialize;

use super::blocking;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RunnerBody {
    #[serde(default)]
    host: String,
    #[serde(default)]
    service_name: String,
}

#[derive(Deserialize)]
pub struct HostBody {
    #[serde(default)]
    host: String,
}

#[derive(Clone, Copy)]
enum Action {
    Start,
    Stop,
    RestartAutomation,
    TriggerScan,
}

/// Resolve `host` against the inventory and run `action` on the blocking pool.
/// The host's memoized status is dropped afterwards.
async fn dispatch(
    app: AppState,
    host: String,
    service: String,
    action: Action,
) -> Result<Json<ActionOutcome>, AppError> {
    if host.trim().is_empty() {
        return Err(AppError::bad_request("host is required"));
    }
    app.require_host(&host)?;

    let state = app.clone();
    let target = host.clone();
    let outcome = blocking(move || {
        let actions = Actions::new(state.executor.as_ref(), &state.settings);
        match action {
            Action::Start => actions.start_runner(&target, &service),
            Action::Stop => actions.stop_runner(&target, &service),
            Action::RestartAutomation => actions.restart_automation(&target),
            Action::TriggerScan => actions.trigger_scan(&target),
        }
    })
    .await?;

    app.aggregator.invalidate(&host);
    Ok(Json(outcome))
}

/// POST /api/start_runner
pub async fn start_runner(
    State(app): State<AppState>,
    Json(body): Json<RunnerBody>,
) -> Result<Json<ActionOutcome>, AppError> {
    dispatch(app, body.host, body.service_name, Action::Start).await
}

/// POST /api/stop_runner
pub async fn stop_runner(
    State(app): State<AppState>,
    Json(body): Json<RunnerBody>,
) -> Result<Json<ActionOutcome>, AppError> {
    dispatch(app, body.host, body.service_name, Action::Stop).await
}

/// POST /api/restart_automation
pub async fn restart_automation(
    State(app): State<AppState>,
    Json(body): Json<HostBody>,
) -> Result<Json<ActionOutcome>, AppError> {
    dispatch(app, body.host, String::new(), Action::RestartAutomation).await
}

/// POST /api/trigger_scan
pub async fn trigger_scan(
    State(app): State<AppState>,
    Json(body): Json<HostBody>,
) -> Result<Json<ActionOutcome>, AppError> {
    dispatch(app, body.host, String::new(), Action::TriggerScan).await
}
