use axum::extract::State;
use axum::Json;
use panel_core::secrets;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::blocking;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/config: vault variables (token masked) and the server list.
pub async fn get_config(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let vault = app.settings.vault.clone();
    let vars = blocking(move || secrets::load_vault_vars(&vault)).await?;

    Ok(Json(serde_json::json!({
        "vault_vars": secrets::masked_vars(&vars),
        "servers": app.servers(),
    })))
}

#[derive(Deserialize)]
pub struct UpdateConfigBody {
    #[serde(default)]
    vars: BTreeMap<String, String>,
}

/// PUT /api/config: merge `vars` into the vault.
pub async fn update_config(
    State(app): State<AppState>,
    Json(body): Json<UpdateConfigBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.vars.is_empty() {
        return Err(AppError::bad_request("no variables given"));
    }
    let vault = app.settings.vault.clone();
    let vars = blocking(move || secrets::update_vault_vars(&vault, &body.vars)).await?;

    Ok(Json(serde_json::json!({
        "message": "Configuration updated successfully.",
        "vault_vars": secrets::masked_vars(&vars),
    })))
}
