//! Host health aggregation with a short-lived memo.
//!
//! One status query issues three probes against a host:
//!   1. is the automation timer active,
//!   2. how many runner units are active and running,
//!   3. what was the last line of the automation log.
//!
//! Results (including failed probes) are memoized per host for the
//! freshness window so a dashboard polling every host does not fan out a
//! fresh round of ansible calls on every refresh.

use crate::error::{PanelError, Result};
use crate::inventory::ServerStatus;
use crate::output::{self, NO_LOG_AVAILABLE};
use crate::remote::{RemoteCommand, RemoteExecutor};
use crate::runners::RUNNER_UNIT_PREFIX;
use crate::settings::Settings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const ACTIVE: &str = "active";
const ACTIVE_RUNNING: &str = "active running";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Offline,
}

impl From<HostStatus> for ServerStatus {
    fn from(status: HostStatus) -> Self {
        match status {
            HostStatus::Online => ServerStatus::Online,
            HostStatus::Offline => ServerStatus::Offline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: HostStatus,
    pub automation_active: bool,
    pub runner_count: usize,
    pub last_activity: String,
    pub checked_at: DateTime<Utc>,
}

impl StatusSnapshot {
    fn degraded(error: &PanelError) -> Self {
        Self {
            status: HostStatus::Offline,
            automation_active: false,
            runner_count: 0,
            last_activity: format!("Error: {error}"),
            checked_at: Utc::now(),
        }
    }
}

/// The outcome of one probe round.
///
/// `Degraded` carries the snapshot reported for a host whose probes failed,
/// so callers can tell "reachable but automation stopped" from "could not
/// ask".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    Healthy(StatusSnapshot),
    Degraded { snapshot: StatusSnapshot, error: String },
}

impl StatusReport {
    pub fn snapshot(&self) -> &StatusSnapshot {
        match self {
            StatusReport::Healthy(s) => s,
            StatusReport::Degraded { snapshot, .. } => snapshot,
        }
    }

    pub fn into_snapshot(self) -> StatusSnapshot {
        match self {
            StatusReport::Healthy(s) => s,
            StatusReport::Degraded { snapshot, .. } => snapshot,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            StatusReport::Healthy(_) => None,
            StatusReport::Degraded { error, .. } => Some(error),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StatusReport::Degraded { .. })
    }
}

struct MemoEntry {
    report: StatusReport,
    captured_at: Instant,
}

/// The commands of one probe round.
#[derive(Debug, Clone)]
struct Probes {
    timer: RemoteCommand,
    runners: RemoteCommand,
    last_log: RemoteCommand,
}

impl Probes {
    fn from_settings(settings: &Settings) -> Self {
        let timeout = settings.status.probe_timeout();
        let remote = &settings.remote;
        Self {
            timer: RemoteCommand::new(format!("systemctl is-active {}", remote.timer_unit), timeout),
            runners: RemoteCommand::new(
                format!(
                    "systemctl list-units --type=service | grep github-runner | grep \"{ACTIVE_RUNNING}\""
                ),
                timeout,
            )
            .become_user(&remote.runner_user),
            last_log: RemoteCommand::new(
                format!(
                    "tail -1 {} 2>/dev/null || echo \"{NO_LOG_AVAILABLE}\"",
                    remote.log_path
                ),
                timeout,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Number of payload lines naming a runner unit reported as active and running.
pub fn count_active_runners(raw: &str) -> usize {
    output::payload_lines(raw)
        .filter(|l| l.contains(RUNNER_UNIT_PREFIX) && l.contains(ACTIVE_RUNNING))
        .count()
}

// ---------------------------------------------------------------------------
// StatusAggregator
// ---------------------------------------------------------------------------

pub struct StatusAggregator {
    executor: Arc<dyn RemoteExecutor>,
    probes: Probes,
    ttl: Duration,
    memo: Mutex<HashMap<String, MemoEntry>>,
}

impl StatusAggregator {
    pub fn new(executor: Arc<dyn RemoteExecutor>, settings: &Settings) -> Self {
        Self {
            executor,
            probes: Probes::from_settings(settings),
            ttl: settings.status.ttl(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current status of `host`, collapsing failed probes into an offline
    /// snapshot.
    pub fn get_status(&self, host: &str) -> StatusSnapshot {
        self.get_report(host).into_snapshot()
    }

    pub fn get_report(&self, host: &str) -> StatusReport {
        self.report_at(host, Instant::now())
    }

    /// The memoized report for `host`, if it is still fresh.
    pub fn cached(&self, host: &str) -> Option<StatusReport> {
        self.fresh_entry(host, Instant::now())
    }

    /// Drop every memoized report.
    pub fn reset(&self) {
        self.lock_memo().clear();
    }

    pub fn invalidate(&self, host: &str) {
        self.lock_memo().remove(host);
    }

    fn lock_memo(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoEntry>> {
        self.memo.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fresh_entry(&self, host: &str, now: Instant) -> Option<StatusReport> {
        let memo = self.lock_memo();
        let entry = memo.get(host)?;
        (now.saturating_duration_since(entry.captured_at) < self.ttl).then(|| entry.report.clone())
    }

    fn report_at(&self, host: &str, now: Instant) -> StatusReport {
        if let Some(report) = self.fresh_entry(host, now) {
            return report;
        }

        // The memo lock is not held while probing; concurrent misses for the
        // same host both probe and the later insert wins.
        let report = self.probe(host);
        self.lock_memo().insert(
            host.to_string(),
            MemoEntry {
                report: report.clone(),
                captured_at: now,
            },
        );
        report
    }

    fn probe(&self, host: &str) -> StatusReport {
        match self.try_probe(host) {
            Ok(snapshot) => StatusReport::Healthy(snapshot),
            Err(e) => {
                tracing::error!(host, "error getting status: {e}");
                StatusReport::Degraded {
                    snapshot: StatusSnapshot::degraded(&e),
                    error: e.to_string(),
                }
            }
        }
    }

    fn try_probe(&self, host: &str) -> Result<StatusSnapshot> {
        let timer = self.executor.execute(host, &self.probes.timer)?;
        let timer_state = if timer.success() {
            output::clean(&timer.stdout)
        } else {
            "inactive".to_string()
        };

        let runners = self.executor.execute(host, &self.probes.runners)?;
        tracing::debug!(host, stdout = %runners.stdout, "raw runner service output");
        let runner_count = count_active_runners(&runners.stdout);

        let log = self.executor.execute(host, &self.probes.last_log)?;
        let last_activity = log
            .success()
            .then(|| output::last_line(&log.stdout))
            .flatten()
            .unwrap_or(NO_LOG_AVAILABLE)
            .to_string();

        let automation_active = timer_state == ACTIVE;
        Ok(StatusSnapshot {
            status: if automation_active {
                HostStatus::Online
            } else {
                HostStatus::Offline
            },
            automation_active,
            runner_count,
            last_activity,
            checked_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{CommandOutput, ScriptedExecutor};

    const HOST: &str = "10.0.0.11";

    const RUNNER_UNITS: &str = "\
builder-1 | CHANGED | rc=0 >>
  github-runner@octo-app.service   loaded active running GitHub Actions Runner for octo/app
  github-runner@octo-api.service   loaded active running GitHub Actions Runner for octo/api
";

    fn healthy_executor() -> Arc<ScriptedExecutor> {
        let executor = Arc::new(ScriptedExecutor::new());
        executor
            .on_stdout("is-active", "builder-1 | CHANGED | rc=0 >>\nactive\n")
            .on_stdout("list-units", RUNNER_UNITS)
            .on_stdout(
                "tail -1",
                "builder-1 | CHANGED | rc=0 >>\n2026-10-14 09:00:01 registered runner octo/api\n",
            );
        executor
    }

    fn aggregator(executor: &Arc<ScriptedExecutor>) -> StatusAggregator {
        StatusAggregator::new(executor.clone(), &Settings::default())
    }

    #[test]
    fn first_query_probes_once_and_populates_memo() {
        let executor = healthy_executor();
        let agg = aggregator(&executor);

        let snapshot = agg.get_status(HOST);
        assert_eq!(snapshot.status, HostStatus::Online);
        assert!(snapshot.automation_active);
        assert_eq!(snapshot.runner_count, 2);
        assert_eq!(snapshot.last_activity, "2026-10-14 09:00:01 registered runner octo/api");

        assert_eq!(executor.count_matching("is-active"), 1);
        assert_eq!(executor.count_matching("list-units"), 1);
        assert_eq!(executor.count_matching("tail -1"), 1);
        assert!(agg.cached(HOST).is_some());
    }

    #[test]
    fn repeat_within_window_is_served_from_memo() {
        let executor = healthy_executor();
        let agg = aggregator(&executor);
        let t0 = Instant::now();

        let first = agg.report_at(HOST, t0);
        let second = agg.report_at(HOST, t0 + Duration::from_millis(4_900));
        assert_eq!(first, second);
        assert_eq!(executor.call_count(), 3);
    }

    #[test]
    fn repeat_after_window_probes_again() {
        let executor = healthy_executor();
        let agg = aggregator(&executor);
        let t0 = Instant::now();

        agg.report_at(HOST, t0);
        agg.report_at(HOST, t0 + agg.ttl());
        assert_eq!(executor.count_matching("is-active"), 2);
        assert_eq!(executor.call_count(), 6);
    }

    #[test]
    fn reset_forces_a_fresh_probe() {
        let executor = healthy_executor();
        let agg = aggregator(&executor);
        agg.get_status(HOST);
        agg.reset();
        assert!(agg.cached(HOST).is_none());
        agg.get_status(HOST);
        assert_eq!(executor.count_matching("is-active"), 2);
    }

    #[test]
    fn invalidate_only_drops_one_host() {
        let executor = healthy_executor();
        let agg = aggregator(&executor);
        agg.get_status("a");
        agg.get_status("b");
        agg.invalidate("a");
        assert!(agg.cached("a").is_none());
        assert!(agg.cached("b").is_some());
    }

    #[test]
    fn hosts_are_memoized_independently() {
        let executor = healthy_executor();
        let agg = aggregator(&executor);
        agg.get_status("a");
        agg.get_status("b");
        agg.get_status("a");
        assert_eq!(executor.count_matching("is-active"), 2);
        let targets: Vec<String> = executor.calls().into_iter().map(|c| c.target).collect();
        assert!(targets.iter().any(|t| t == "b"));
    }

    #[test]
    fn runner_probe_runs_as_runner_user() {
        let executor = healthy_executor();
        aggregator(&executor).get_status(HOST);
        let call = executor
            .calls()
            .into_iter()
            .find(|c| c.command.shell.contains("list-units"))
            .unwrap();
        assert_eq!(call.command.become_user.as_deref(), Some("github-runner"));
        assert_eq!(call.command.timeout, Duration::from_secs(5));
    }

    #[test]
    fn counts_only_qualifying_runner_lines() {
        let raw = "3 active running\n  [WARNING]: foo\nunit1.service loaded active running";
        assert_eq!(count_active_runners(raw), 0);

        let raw = "3 active running\n  [WARNING]: foo\ngithub-runner@unit1.service loaded active running";
        assert_eq!(count_active_runners(raw), 1);

        let raw = "github-runner@a.service loaded activating start\n[github-runner@b active running]";
        assert_eq!(count_active_runners(raw), 0);
    }

    #[test]
    fn timer_transport_error_yields_memoized_degraded_snapshot() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_error("is-active", "ssh: connect to host 10.0.0.11 port 22: Connection refused");
        let agg = aggregator(&executor);

        let report = agg.get_report(HOST);
        assert!(report.is_degraded());
        let snapshot = report.snapshot().clone();
        assert_eq!(snapshot.status, HostStatus::Offline);
        assert!(!snapshot.automation_active);
        assert_eq!(snapshot.runner_count, 0);
        assert_eq!(
            snapshot.last_activity,
            "Error: remote execution failed: ssh: connect to host 10.0.0.11 port 22: Connection refused"
        );

        let again = agg.get_status(HOST);
        assert_eq!(again, snapshot);
        assert_eq!(executor.call_count(), 1);
    }

    #[test]
    fn inactive_timer_is_offline_but_not_degraded() {
        let executor = healthy_executor();
        executor.on_output(
            "is-active",
            CommandOutput::failed(2, "builder-1 | FAILED | rc=3 >>\ninactive\nnon-zero return code", ""),
        );
        let report = aggregator(&executor).get_report(HOST);
        assert!(!report.is_degraded());
        assert_eq!(report.snapshot().status, HostStatus::Offline);
        assert!(!report.snapshot().automation_active);
        assert_eq!(report.snapshot().runner_count, 2);
    }

    #[test]
    fn garbled_timer_output_is_not_active() {
        let executor = healthy_executor();
        executor.on_stdout("is-active", "active\nactivating");
        let snapshot = aggregator(&executor).get_status(HOST);
        assert_eq!(snapshot.status, HostStatus::Offline);
    }

    #[test]
    fn active_timer_without_runners_is_still_online() {
        let executor = healthy_executor();
        executor.on_output("list-units", CommandOutput::failed(1, "", ""));
        let snapshot = aggregator(&executor).get_status(HOST);
        assert_eq!(snapshot.status, HostStatus::Online);
        assert_eq!(snapshot.runner_count, 0);
    }

    #[test]
    fn missing_log_uses_placeholder() {
        let executor = healthy_executor();
        executor.on_stdout("tail -1", "builder-1 | CHANGED | rc=0 >>\n");
        assert_eq!(aggregator(&executor).get_status(HOST).last_activity, NO_LOG_AVAILABLE);

        let executor = healthy_executor();
        executor.on_output("tail -1", CommandOutput::failed(1, "whatever", "boom"));
        assert_eq!(aggregator(&executor).get_status(HOST).last_activity, NO_LOG_AVAILABLE);
    }

    #[test]
    fn log_probe_error_degrades_the_whole_report() {
        let executor = healthy_executor();
        executor.on_error("tail -1", "timed out");
        let report = aggregator(&executor).get_report(HOST);
        assert_eq!(report.error(), Some("remote execution failed: timed out"));
        assert_eq!(report.snapshot().runner_count, 0);
    }

    #[test]
    fn zero_ttl_never_serves_from_memo() {
        let executor = healthy_executor();
        let mut settings = Settings::default();
        settings.status.ttl_secs = 0;
        let agg = StatusAggregator::new(executor.clone(), &settings);
        agg.get_status(HOST);
        agg.get_status(HOST);
        assert_eq!(executor.count_matching("is-active"), 2);
    }
}
