pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Servers
        .route(
            "/api/servers",
            get(routes::servers::list_servers).post(routes::servers::add_server),
        )
        .route("/api/servers/{name}", delete(routes::servers::remove_server))
        // Status
        .route("/api/server-status", get(routes::status::server_status))
        .route(
            "/api/server-detail/{host}",
            get(routes::status::server_detail),
        )
        .route("/api/status/reset", post(routes::status::reset_status))
        // Actions
        .route("/api/start_runner", post(routes::actions::start_runner))
        .route("/api/stop_runner", post(routes::actions::stop_runner))
        .route(
            "/api/restart_automation",
            post(routes::actions::restart_automation),
        )
        .route("/api/trigger_scan", post(routes::actions::trigger_scan))
        // Config
        .route(
            "/api/config",
            get(routes::config::get_config).put(routes::config::update_config),
        )
        // Logs
        .route("/api/logs", get(routes::logs::get_logs))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the panel API server on `0.0.0.0:<port>`.
pub async fn serve(app_state: AppState, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener, open_browser).await
}

/// Start the panel API server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("runner panel listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}/api/server-status");
        let _ = open::that(&url);
    }

    axum::serve(listener, app).await?;
    Ok(())
}
