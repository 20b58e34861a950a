use axum::http::StatusCode;
use http_body_util::BodyExt;
use panel_core::remote::{CommandOutput, ScriptedExecutor};
use panel_core::settings::Settings;
use panel_server::AppState;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const INVENTORY: &str = "\
[runner-hosts]
# build boxes
builder-1 ansible_host=10.0.0.11 ansible_user=root
builder-2 ansible_host=10.0.0.12

[runner-hosts:vars]
ansible_python_interpreter=/usr/bin/python3
";

const VAULT: &str = "\
github_token: \"ghp_0123456789abcdefWXYZ\"
github_username: \"octocat\"
scan_interval_minutes: 15
";

struct Fixture {
    dir: TempDir,
    executor: Arc<ScriptedExecutor>,
    state: AppState,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hosts"), INVENTORY).unwrap();
        std::fs::write(dir.path().join("vault.yml"), VAULT).unwrap();
        let settings = Settings {
            inventory: dir.path().join("hosts"),
            vault: dir.path().join("vault.yml"),
            ..Settings::default()
        };
        let executor = Arc::new(ScriptedExecutor::new());
        let state = AppState::with_executor(settings, executor.clone());
        Self { dir, executor, state }
    }

    fn app(&self) -> axum::Router {
        panel_server::build_router(self.state.clone())
    }

    fn inventory_text(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("hosts")).unwrap()
    }
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None).await
}

async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

// ---------------------------------------------------------------------------
// Servers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_servers_does_not_probe() {
    let fx = Fixture::new();
    let (status, json) = get(fx.app(), "/api/servers").await;

    assert_eq!(status, StatusCode::OK);
    let servers = json["servers"].as_array().unwrap();
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0]["name"], "builder-1");
    assert_eq!(servers[0]["status"], "unknown");
    assert_eq!(json["config"]["github_username"], "octocat");
    assert_eq!(json["config"]["github_token"], "ghp_\u{2026}WXYZ");
    assert_eq!(fx.executor.call_count(), 0);
}

#[tokio::test]
async fn server_status_probes_each_host_once_within_window() {
    let fx = Fixture::new();
    fx.executor
        .on_stdout("is-active", "builder | CHANGED | rc=0 >>\nactive\n")
        .on_stdout(
            "list-units",
            "builder | CHANGED | rc=0 >>\n\
             github-runner@octo-app.service loaded active running GitHub Actions Runner for octo/app\n",
        )
        .on_stdout("tail -1", "builder | CHANGED | rc=0 >>\nRegistered runner for octo/app\n");

    let (status, json) = get(fx.app(), "/api/server-status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let first = &json["servers"][0];
    assert_eq!(first["status"], "online");
    assert_eq!(first["automation_active"], true);
    assert_eq!(first["runner_count"], 1);
    assert_eq!(first["last_activity"], "Registered runner for octo/app");
    assert!(first.get("error").is_none());

    let (_, again) = get(fx.app(), "/api/server-status").await;
    assert_eq!(again["servers"][0]["checked_at"], first["checked_at"]);
    assert_eq!(fx.executor.count_matching("is-active"), 2);

    let (_, listed) = get(fx.app(), "/api/servers").await;
    assert_eq!(listed["servers"][0]["status"], "online");
}

#[tokio::test]
async fn unreachable_host_is_reported_offline_with_error() {
    let fx = Fixture::new();
    fx.executor.on_error("is-active", "ssh: connect to host 10.0.0.11 port 22: No route to host");

    let (status, json) = get(fx.app(), "/api/server-status").await;
    assert_eq!(status, StatusCode::OK);
    let first = &json["servers"][0];
    assert_eq!(first["status"], "offline");
    assert_eq!(first["runner_count"], 0);
    assert!(first["last_activity"].as_str().unwrap().starts_with("Error: "));
    assert!(first["error"].as_str().unwrap().contains("No route to host"));
}

#[tokio::test]
async fn server_detail_lists_runners() {
    let fx = Fixture::new();
    fx.executor
        .on_stdout(
            "list-units --type=service | grep github-runner@",
            "github-runner@octo-app.service loaded active running GitHub Actions Runner for octo/app\n",
        )
        .on_stdout(
            "show github-runner@octo-app.service",
            "Description=GitHub Actions Runner for octo/app\nActiveState=active\n",
        );

    let (status, json) = get(fx.app(), "/api/server-detail/10.0.0.11").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["server"]["name"], "builder-1");
    assert_eq!(json["runners"][0]["service"], "github-runner@octo-app.service");
    assert_eq!(json["runners"][0]["repo"], "octo/app");
    assert_eq!(json["runners"][0]["escaped_repo"], "octo-app");
    assert_eq!(json["runners"][0]["status"], "active");
}

#[tokio::test]
async fn server_detail_unknown_host_is_404() {
    let fx = Fixture::new();
    let (status, json) = get(fx.app(), "/api/server-detail/10.9.9.9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("10.9.9.9"));
}

#[tokio::test]
async fn add_server_inserts_under_section() {
    let fx = Fixture::new();
    let (status, json) = post_json(
        fx.app(),
        "/api/servers",
        serde_json::json!({ "name": "builder-3", "host": "10.0.0.13" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["servers"].as_array().unwrap().len(), 3);
    let text = fx.inventory_text();
    assert!(text.contains("# build boxes\nbuilder-3 ansible_host=10.0.0.13 ansible_user=root\nbuilder-1"));
}

#[tokio::test]
async fn add_server_rejects_bad_input() {
    let fx = Fixture::new();
    let (status, _) = post_json(
        fx.app(),
        "/api/servers",
        serde_json::json!({ "name": "bad name", "host": "10.0.0.13" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn add_server_without_section_is_422() {
    let fx = Fixture::new();
    std::fs::write(fx.dir.path().join("hosts"), "[other]\nx ansible_host=1.2.3.4\n").unwrap();
    let (status, _) = post_json(
        fx.app(),
        "/api/servers",
        serde_json::json!({ "name": "builder-3", "host": "10.0.0.13" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn remove_server_decommissions_runners() {
    let fx = Fixture::new();
    fx.executor.on_stdout(
        "list-units --type=service | grep github-runner@",
        "github-runner@octo-app.service loaded active running GitHub Actions Runner for octo/app\n",
    );

    let (status, json) = send(fx.app(), "DELETE", "/api/servers/builder-2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed_runners"][0], "github-runner@octo-app.service");
    assert_eq!(json["servers"].as_array().unwrap().len(), 1);
    assert!(!fx.inventory_text().contains("builder-2"));
    assert_eq!(fx.executor.count_matching("systemctl daemon-reload"), 1);
    assert!(fx.executor.calls().iter().all(|c| c.target == "10.0.0.12"));
}

#[tokio::test]
async fn remove_unreachable_server_still_edits_inventory() {
    let fx = Fixture::new();
    fx.executor.on_error(
        "list-units",
        "ssh: connect to host 10.0.0.12 port 22: No route to host",
    );

    let (status, json) = send(fx.app(), "DELETE", "/api/servers/builder-2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed_runners"], serde_json::json!([]));
    assert!(json["decommission_error"]
        .as_str()
        .unwrap()
        .contains("No route to host"));
    assert_eq!(json["servers"].as_array().unwrap().len(), 1);
    assert!(!fx.inventory_text().contains("builder-2"));
    assert!(fx.inventory_text().contains("builder-1"));
}

#[tokio::test]
async fn remove_server_keep_runners_skips_remote_calls() {
    let fx = Fixture::new();
    let (status, json) = send(
        fx.app(),
        "DELETE",
        "/api/servers/builder-2?keep_runners=true",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed_runners"], serde_json::json!([]));
    assert!(json["decommission_error"].is_null());
    assert!(!fx.inventory_text().contains("builder-2"));
    assert_eq!(fx.executor.call_count(), 0);
}

#[tokio::test]
async fn remove_unknown_server_is_404() {
    let fx = Fixture::new();
    let (status, _) = send(fx.app(), "DELETE", "/api/servers/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(fx.executor.call_count(), 0);
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_runner_returns_outcome() {
    let fx = Fixture::new();
    let (status, json) = post_json(
        fx.app(),
        "/api/start_runner",
        serde_json::json!({ "host": "10.0.0.11", "service_name": "github-runner@octo-app.service" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let calls = fx.executor.calls();
    assert_eq!(calls[0].target, "10.0.0.11");
    assert_eq!(calls[0].command.shell, "systemctl start github-runner@octo-app.service");
}

#[tokio::test]
async fn stop_runner_reports_remote_failure() {
    let fx = Fixture::new();
    fx.executor.on_output(
        "systemctl stop",
        CommandOutput::failed(5, "", "Failed to stop unit: Unit not loaded."),
    );
    let (status, json) = post_json(
        fx.app(),
        "/api/stop_runner",
        serde_json::json!({ "host": "10.0.0.11", "service_name": "github-runner@gone.service" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert!(json["stderr"].as_str().unwrap().contains("Unit not loaded"));
}

#[tokio::test]
async fn action_validation_errors() {
    let fx = Fixture::new();
    let (status, _) = post_json(
        fx.app(),
        "/api/start_runner",
        serde_json::json!({ "host": "10.0.0.11", "service_name": "x; reboot" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(fx.app(), "/api/trigger_scan", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(
        fx.app(),
        "/api/restart_automation",
        serde_json::json!({ "host": "10.9.9.9" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(fx.executor.call_count(), 0);
}

#[tokio::test]
async fn unreachable_host_action_is_502() {
    let fx = Fixture::new();
    fx.executor.on_error("register-github-runners", "ssh: Connection refused");
    let (status, _) = post_json(
        fx.app(),
        "/api/trigger_scan",
        serde_json::json!({ "host": "10.0.0.12" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

// ---------------------------------------------------------------------------
// Config, logs, status reset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn config_round_trip_keeps_token() {
    let fx = Fixture::new();
    let (status, json) = get(fx.app(), "/api/config").await;
    assert_eq!(status, StatusCode::OK);
    let masked = json["vault_vars"]["github_token"].as_str().unwrap().to_string();
    assert_eq!(masked, "ghp_\u{2026}WXYZ");
    assert_eq!(json["servers"].as_array().unwrap().len(), 2);

    let (status, json) = send(
        fx.app(),
        "PUT",
        "/api/config",
        Some(serde_json::json!({ "vars": { "github_token": masked, "github_username": "hubot" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["vault_vars"]["github_username"], "hubot");

    let vault = std::fs::read_to_string(fx.dir.path().join("vault.yml")).unwrap();
    assert!(vault.contains("ghp_0123456789abcdefWXYZ"));
    assert!(vault.contains("hubot"));
}

#[tokio::test]
async fn logs_default_to_first_server() {
    let fx = Fixture::new();
    fx.executor.on_stdout("tail -20", "line one\nline two\n");
    let (status, json) = get(fx.app(), "/api/logs?lines=20").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["host"], "10.0.0.11");
    assert_eq!(json["logs"], "line one\nline two\n");

    let (status, _) = get(fx.app(), "/api/logs?lines=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logs_without_servers_is_404() {
    let fx = Fixture::new();
    std::fs::write(fx.dir.path().join("hosts"), "[runner-hosts]\n").unwrap();
    fx.state.reload_servers();

    let (status, json) = get(fx.app(), "/api/logs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "inventory has no servers");
    assert_eq!(fx.executor.call_count(), 0);
}

#[tokio::test]
async fn logs_fall_back_when_tail_fails() {
    let fx = Fixture::new();
    fx.executor.on_output("tail -50", CommandOutput::failed(1, "", "No such file or directory"));
    let (status, json) = get(fx.app(), "/api/logs?host=10.0.0.12").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["logs"], "No logs available");
}

#[tokio::test]
async fn status_reset_clears_memo() {
    let fx = Fixture::new();
    get(fx.app(), "/api/server-status").await;
    assert_eq!(fx.executor.count_matching("is-active"), 2);

    let (status, json) = post_json(fx.app(), "/api/status/reset", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "reset");

    get(fx.app(), "/api/server-status").await;
    assert_eq!(fx.executor.count_matching("is-active"), 4);
}
