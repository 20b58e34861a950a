//! State-changing commands: start/stop runners, restart the automation
//! timer, trigger a registration scan, read logs, decommission a host.

use crate::error::Result;
use crate::remote::{CommandOutput, RemoteCommand, RemoteExecutor};
use crate::runners::{self, validate_service};
use crate::settings::Settings;
use serde::Serialize;

pub const NO_LOGS_AVAILABLE: &str = "No logs available";
pub const DEFAULT_LOG_LINES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl From<CommandOutput> for ActionOutcome {
    fn from(out: CommandOutput) -> Self {
        Self {
            success: out.success(),
            stdout: out.stdout,
            stderr: out.stderr,
        }
    }
}

/// Runs actions against hosts through a [`RemoteExecutor`].
pub struct Actions<'a> {
    executor: &'a dyn RemoteExecutor,
    settings: &'a Settings,
}

impl<'a> Actions<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, settings: &'a Settings) -> Self {
        Self { executor, settings }
    }

    fn command(&self, shell: String) -> RemoteCommand {
        RemoteCommand::new(shell, self.settings.remote.action_timeout())
    }

    fn run(&self, host: &str, command: RemoteCommand) -> Result<ActionOutcome> {
        tracing::info!(host, command = %command.shell, "running action");
        let outcome = ActionOutcome::from(self.executor.execute(host, &command)?);
        if !outcome.success {
            tracing::warn!(host, command = %command.shell, stderr = %outcome.stderr, "action failed");
        }
        Ok(outcome)
    }

    pub fn start_runner(&self, host: &str, service: &str) -> Result<ActionOutcome> {
        validate_service(service)?;
        self.run(host, self.command(format!("systemctl start {service}")))
    }

    pub fn stop_runner(&self, host: &str, service: &str) -> Result<ActionOutcome> {
        validate_service(service)?;
        self.run(host, self.command(format!("systemctl stop {service}")))
    }

    pub fn restart_automation(&self, host: &str) -> Result<ActionOutcome> {
        let unit = &self.settings.remote.timer_unit;
        validate_service(unit)?;
        self.run(host, self.command(format!("systemctl restart {unit}")))
    }

    pub fn trigger_scan(&self, host: &str) -> Result<ActionOutcome> {
        self.run(host, self.command(self.settings.remote.scan_command.clone()))
    }

    /// The last `lines` lines of the automation log on `host`.
    pub fn fetch_logs(&self, host: &str, lines: usize) -> Result<String> {
        let command = self.command(format!("tail -{lines} {}", self.settings.remote.log_path));
        let out = self.executor.execute(host, &command)?;
        if out.success() {
            Ok(out.stdout)
        } else {
            Ok(NO_LOGS_AVAILABLE.to_string())
        }
    }

    /// Stop, disable, and delete every runner unit on `host`, then reload
    /// systemd. Returns the units that were processed. Failures on a single
    /// unit are logged and the sweep continues.
    pub fn decommission_server(&self, host: &str) -> Result<Vec<String>> {
        let runner_user = &self.settings.remote.runner_user;
        let units = runners::list_runners(self.executor, self.settings, host)?;
        let mut removed = Vec::with_capacity(units.len());

        for unit in units {
            let service = unit.service;
            let steps = [
                self.command(format!("systemctl stop {service}")),
                self.command(format!("systemctl disable {service}"))
                    .become_user(runner_user),
                self.command(format!("rm /etc/systemd/system/{service}"))
                    .become_user("root"),
            ];
            for step in steps {
                match self.run(host, step) {
                    Ok(_) => {}
                    Err(e) => tracing::warn!(host, service = %service, "decommission step failed: {e}"),
                }
            }
            removed.push(service);
        }

        if let Err(e) = self.run(
            host,
            self.command("systemctl daemon-reload".to_string())
                .become_user("root"),
        ) {
            tracing::warn!(host, "daemon-reload failed: {e}");
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
