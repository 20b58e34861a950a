//! Remote execution of shell commands on inventory hosts.
//!
//! `RemoteExecutor` is the seam every probe and action goes through.
//! `AnsibleExecutor` is the production implementation: one `ansible -m shell`
//! ad-hoc call per command, killed when its timeout elapses.
//! `ScriptedExecutor` is the test double that records calls and serves
//! preset output.

use crate::error::{PanelError, Result};
use crate::inventory;
use crate::settings::Settings;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;

use process_control::{ChildExt, Control};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A shell command to run on a remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub shell: String,
    pub timeout: Duration,
    /// Run elevated as this user (`-b --become-user`).
    pub become_user: Option<String>,
}

impl RemoteCommand {
    pub fn new(shell: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            timeout,
            become_user: None,
        }
    }

    pub fn become_user(mut self, user: impl Into<String>) -> Self {
        self.become_user = Some(user.into());
        self
    }
}

/// Captured result of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell commands on a named host.
///
/// `Err` means the command could not be run to completion (spawn failure,
/// timeout). A command that ran and exited non-zero is `Ok` with its code.
pub trait RemoteExecutor: Send + Sync {
    fn execute(&self, target: &str, command: &RemoteCommand) -> Result<CommandOutput>;
}

// ---------------------------------------------------------------------------
// AnsibleExecutor
// ---------------------------------------------------------------------------

pub struct AnsibleExecutor {
    inventory: PathBuf,
    group: String,
    program: Option<PathBuf>,
    leading_args: Vec<String>,
}

impl AnsibleExecutor {
    pub fn new(inventory: impl Into<PathBuf>, group: impl Into<String>) -> Self {
        Self {
            inventory: inventory.into(),
            group: group.into(),
            program: None,
            leading_args: Vec::new(),
        }
    }

    /// Executor for the inventory, group and program named in `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let executor = Self::new(&settings.inventory, settings.host_group.clone());
        match &settings.remote.ansible_program {
            Some(program) => executor.with_program(program, &[]),
            None => executor,
        }
    }

    /// Use `program` (followed by `leading_args`) instead of the `ansible`
    /// found on PATH.
    pub fn with_program(mut self, program: impl Into<PathBuf>, leading_args: &[&str]) -> Self {
        self.program = Some(program.into());
        self.leading_args = leading_args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn inventory(&self) -> &Path {
        &self.inventory
    }

    fn program(&self) -> Result<PathBuf> {
        match &self.program {
            Some(p) => Ok(p.clone()),
            None => which::which("ansible").map_err(|_| PanelError::AnsibleNotFound),
        }
    }

    /// Ansible patterns match inventory names, not addresses: translate an
    /// `ansible_host` address back to the name it is registered under.
    fn limit_for(&self, target: &str) -> String {
        let servers = inventory::load_servers(&self.inventory);
        inventory::find_by_host(&servers, target)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| target.to_string())
    }

    /// The argv passed after the program name.
    pub fn build_args(&self, limit: &str, command: &RemoteCommand) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend([
            "-i".to_string(),
            self.inventory.display().to_string(),
            self.group.clone(),
            "--limit".to_string(),
            limit.to_string(),
            "-m".to_string(),
            "shell".to_string(),
            "-a".to_string(),
            command.shell.clone(),
        ]);
        if let Some(user) = &command.become_user {
            args.extend(["-b".to_string(), "--become-user".to_string(), user.clone()]);
        }
        args
    }
}

impl RemoteExecutor for AnsibleExecutor {
    fn execute(&self, target: &str, command: &RemoteCommand) -> Result<CommandOutput> {
        let program = self.program()?;
        let args = self.build_args(&self.limit_for(target), command);
        tracing::debug!(program = %program.display(), ?args, "running remote command");

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PanelError::Transport(format!("failed to spawn {}: {e}", program.display())))?;

        let output = child
            .controlled_with_output()
            .time_limit(command.timeout)
            .terminate_for_timeout()
            .wait()
            .map_err(|e| PanelError::Transport(e.to_string()))?
            .ok_or_else(|| PanelError::Timeout {
                command: command.shell.clone(),
                timeout: command.timeout,
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output
                .status
                .code()
                .and_then(|c| i32::try_from(c).ok())
                .unwrap_or(-1),
        };
        tracing::debug!(
            host = target,
            exit_code = result.exit_code,
            stdout = %result.stdout,
            stderr = %result.stderr,
            "remote command finished"
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

/// A call observed by [`ScriptedExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub target: String,
    pub command: RemoteCommand,
}

struct Rule {
    needle: String,
    response: std::result::Result<CommandOutput, String>,
}

/// Test double: answers each command with the response of the first rule
/// whose needle is a substring of the shell text. Unmatched commands succeed
/// with empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_rule(&self, needle: &str, response: std::result::Result<CommandOutput, String>) {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        match rules.iter_mut().find(|r| r.needle == needle) {
            Some(rule) => rule.response = response,
            None => rules.push(Rule {
                needle: needle.to_string(),
                response,
            }),
        }
    }

    /// Answer commands containing `needle` with `stdout` and exit code 0.
    pub fn on_stdout(&self, needle: &str, stdout: &str) -> &Self {
        self.set_rule(needle, Ok(CommandOutput::ok(stdout)));
        self
    }

    pub fn on_output(&self, needle: &str, output: CommandOutput) -> &Self {
        self.set_rule(needle, Ok(output));
        self
    }

    /// Fail commands containing `needle` with a transport error.
    pub fn on_error(&self, needle: &str, message: &str) -> &Self {
        self.set_rule(needle, Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of calls whose shell text contains `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.command.shell.contains(needle))
            .count()
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn execute(&self, target: &str, command: &RemoteCommand) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                target: target.to_string(),
                command: command.clone(),
            });

        let rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        match rules.iter().find(|r| command.shell.contains(&r.needle)) {
            Some(rule) => rule.response.clone().map_err(PanelError::Transport),
            None => Ok(CommandOutput::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inventory(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("hosts");
        std::fs::write(&path, "[runner-hosts]\nbuilder-1 ansible_host=10.0.0.11\n").unwrap();
        path
    }

    #[test]
    fn build_args_addresses_group_and_limit() {
        let executor = AnsibleExecutor::new("/etc/ansible/hosts", "runner-hosts");
        let cmd = RemoteCommand::new("systemctl is-active x.timer", Duration::from_secs(5));
        assert_eq!(
            executor.build_args("builder-1", &cmd),
            vec![
                "-i",
                "/etc/ansible/hosts",
                "runner-hosts",
                "--limit",
                "builder-1",
                "-m",
                "shell",
                "-a",
                "systemctl is-active x.timer",
            ]
        );
    }

    #[test]
    fn build_args_appends_become_flags() {
        let executor = AnsibleExecutor::new("hosts", "runner-hosts");
        let cmd = RemoteCommand::new("id", Duration::from_secs(5)).become_user("github-runner");
        let args = executor.build_args("b", &cmd);
        assert_eq!(&args[args.len() - 3..], ["-b", "--become-user", "github-runner"]);
    }

    #[test]
    fn limit_resolves_address_to_inventory_name() {
        let dir = TempDir::new().unwrap();
        let executor = AnsibleExecutor::new(inventory(&dir), "runner-hosts");
        assert_eq!(executor.limit_for("10.0.0.11"), "builder-1");
        assert_eq!(executor.limit_for("10.0.0.99"), "10.0.0.99");
    }

    #[cfg(unix)]
    #[test]
    fn executes_program_and_captures_stdout() {
        let dir = TempDir::new().unwrap();
        let executor = AnsibleExecutor::new(inventory(&dir), "runner-hosts").with_program("echo", &[]);
        let out = executor
            .execute("10.0.0.11", &RemoteCommand::new("uptime", Duration::from_secs(5)))
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("--limit builder-1 -m shell -a uptime"));
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let executor = AnsibleExecutor::new(inventory(&dir), "runner-hosts")
            .with_program("sh", &["-c", "echo down; exit 3", "ansible"]);
        let out = executor
            .execute("builder-1", &RemoteCommand::new("true", Duration::from_secs(5)))
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "down");
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let dir = TempDir::new().unwrap();
        let executor = AnsibleExecutor::new(inventory(&dir), "runner-hosts")
            .with_program("sh", &["-c", "exec sleep 5", "ansible"]);
        let err = executor
            .execute("builder-1", &RemoteCommand::new("true", Duration::from_millis(200)))
            .unwrap_err();
        assert!(matches!(err, PanelError::Timeout { timeout, .. } if timeout == Duration::from_millis(200)));
        assert_eq!(err.to_string(), "'true' timed out after 200ms");
    }

    #[test]
    fn missing_program_is_a_transport_error() {
        let dir = TempDir::new().unwrap();
        let executor = AnsibleExecutor::new(inventory(&dir), "runner-hosts")
            .with_program(dir.path().join("no-such-ansible"), &[]);
        let err = executor
            .execute("builder-1", &RemoteCommand::new("true", Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, PanelError::Transport(_)));
    }

    #[test]
    fn scripted_executor_matches_first_rule_and_records_calls() {
        let executor = ScriptedExecutor::new();
        executor
            .on_stdout("is-active", "active")
            .on_error("tail", "connection refused");

        let cmd = RemoteCommand::new("systemctl is-active t.timer", Duration::from_secs(1));
        assert_eq!(executor.execute("h", &cmd).unwrap().stdout, "active");

        let cmd = RemoteCommand::new("tail -1 /var/log/x.log", Duration::from_secs(1));
        let err = executor.execute("h", &cmd).unwrap_err();
        assert_eq!(err.to_string(), "remote execution failed: connection refused");

        let cmd = RemoteCommand::new("uptime", Duration::from_secs(1));
        assert_eq!(executor.execute("h", &cmd).unwrap(), CommandOutput::default());

        assert_eq!(executor.call_count(), 3);
        assert_eq!(executor.count_matching("is-active"), 1);
        assert_eq!(executor.calls()[0].target, "h");
    }

    #[test]
    fn scripted_executor_rule_can_be_replaced() {
        let executor = ScriptedExecutor::new();
        executor.on_error("is-active", "down");
        executor.on_stdout("is-active", "active");
        let cmd = RemoteCommand::new("systemctl is-active t", Duration::from_secs(1));
        assert_eq!(executor.execute("h", &cmd).unwrap().stdout, "active");
    }
}
