use crate::context::Context;
use crate::output::print_json;
use anyhow::bail;
use panel_core::actions::{ActionOutcome, Actions};

pub enum Action {
    Start(String),
    Stop(String),
    RestartAutomation,
    Scan,
}

pub fn run(ctx: &Context, host: &str, action: Action, json: bool) -> anyhow::Result<()> {
    let server = ctx.server(host)?;
    let executor = ctx.executor();
    let actions = Actions::new(&executor, &ctx.settings);

    let outcome: ActionOutcome = match &action {
        Action::Start(service) => actions.start_runner(&server.host, service)?,
        Action::Stop(service) => actions.stop_runner(&server.host, service)?,
        Action::RestartAutomation => actions.restart_automation(&server.host)?,
        Action::Scan => actions.trigger_scan(&server.host)?,
    };

    if json {
        print_json(&outcome)?;
    } else {
        let stdout = outcome.stdout.trim_end();
        if !stdout.is_empty() {
            println!("{stdout}");
        }
        let stderr = outcome.stderr.trim_end();
        if !stderr.is_empty() {
            eprintln!("{stderr}");
        }
    }

    if !outcome.success {
        bail!("command failed on {}", server.name);
    }
    if !json {
        let done = match action {
            Action::Start(service) => format!("Started {service}"),
            Action::Stop(service) => format!("Stopped {service}"),
            Action::RestartAutomation => "Restarted automation timer".to_string(),
            Action::Scan => "Registration scan finished".to_string(),
        };
        println!("{done} on {}.", server.name);
    }
    Ok(())
}

pub fn logs(ctx: &Context, host: Option<&str>, lines: usize, json: bool) -> anyhow::Result<()> {
    if lines == 0 {
        bail!("--lines must be at least 1");
    }
    let server = match host {
        Some(h) => ctx.server(h)?,
        None => match ctx.servers().into_iter().next() {
            Some(s) => s,
            None => bail!("no servers in {}", ctx.settings.inventory.display()),
        },
    };

    let executor = ctx.executor();
    let logs = Actions::new(&executor, &ctx.settings).fetch_logs(&server.host, lines)?;

    if json {
        print_json(&serde_json::json!({ "host": server.host, "logs": logs }))
    } else {
        println!("{}", logs.trim_end());
        Ok(())
    }
}
