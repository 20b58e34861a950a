use axum::extract::{Path, Query, State};
use axum::Json;
use panel_core::actions::Actions;
use panel_core::inventory::{self, DEFAULT_USER};
use panel_core::secrets;
use panel_core::PanelError;
use serde::Deserialize;

use super::blocking;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/servers: stored records without probing.
pub async fn list_servers(State(app): State<AppState>) -> Json<serde_json::Value> {
    let config = secrets::load_secrets(&app.settings.vault).masked();
    Json(serde_json::json!({
        "servers": app.servers(),
        "config": config,
    }))
}

#[derive(Deserialize)]
pub struct AddServerBody {
    name: String,
    host: String,
    #[serde(default)]
    user: Option<String>,
}

/// POST /api/servers: add a host under `[runner-hosts]`.
pub async fn add_server(
    State(app): State<AppState>,
    Json(body): Json<AddServerBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let path = app.settings.inventory.clone();
    let name = body.name.trim().to_string();
    let host = body.host.trim().to_string();
    let user = body
        .user
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(DEFAULT_USER)
        .to_string();

    let message = format!("Server {name} added.");
    blocking(move || inventory::add_server(&path, &name, &host, &user)).await?;

    Ok(Json(serde_json::json!({
        "message": message,
        "servers": app.reload_servers(),
    })))
}

#[derive(Deserialize)]
pub struct RemoveServerQuery {
    #[serde(default)]
    keep_runners: bool,
}

/// DELETE /api/servers/{name}: decommission every runner on the host, then
/// drop it from the inventory.
///
/// An unreachable host is still removed: the failure is logged and reported
/// under `decommission_error` with an empty `removed_runners`. With
/// `?keep_runners=true` no remote command runs.
pub async fn remove_server(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<RemoveServerQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let server = inventory::find_by_name(&app.servers(), &name)
        .cloned()
        .ok_or_else(|| PanelError::ServerNotFound(name.clone()))?;

    let host = server.host.clone();
    let state = app.clone();
    let (removed_runners, decommission_error) = blocking(move || {
        let decommissioned = if query.keep_runners {
            Ok(Vec::new())
        } else {
            Actions::new(state.executor.as_ref(), &state.settings).decommission_server(&server.host)
        };
        inventory::remove_server(&state.settings.inventory, &server.name)?;
        Ok(match decommissioned {
            Ok(removed) => (removed, None),
            Err(e) => {
                tracing::warn!(host = %server.host, "removing server without decommissioning runners: {e}");
                (Vec::new(), Some(e.to_string()))
            }
        })
    })
    .await?;
    app.aggregator.invalidate(&host);

    let message = match (&decommission_error, query.keep_runners) {
        (Some(_), _) => format!("Server {name} removed; its runners could not be decommissioned."),
        (None, true) => format!("Server {name} removed; runners left in place."),
        (None, false) => format!("Server {name} and its runners removed."),
    };
    Ok(Json(serde_json::json!({
        "message": message,
        "removed_runners": removed_runners,
        "decommission_error": decommission_error,
        "servers": app.reload_servers(),
    })))
}
