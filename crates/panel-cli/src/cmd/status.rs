use crate::context::Context;
use crate::output::{print_json, print_table};
use panel_core::runners;
use panel_core::status::StatusAggregator;
use panel_server::routes::status::ServerStatusView;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

pub fn run(ctx: &Context, host: Option<&str>, json: bool) -> anyhow::Result<()> {
    let servers = match host {
        Some(h) => vec![ctx.server(h)?],
        None => ctx.servers(),
    };
    let aggregator = StatusAggregator::new(Arc::new(ctx.executor()), &ctx.settings);

    let views: Vec<ServerStatusView> = servers
        .into_iter()
        .map(|server| {
            let report = aggregator.get_report(&server.host);
            ServerStatusView::new(server, &report)
        })
        .collect();

    if json {
        return print_json(&views);
    }
    if views.is_empty() {
        println!("No servers in {}.", ctx.settings.inventory.display());
        return Ok(());
    }

    let rows = views
        .iter()
        .map(|v| {
            vec![
                v.name.clone(),
                v.host.clone(),
                v.status.to_string(),
                if v.automation_active { "active" } else { "inactive" }.to_string(),
                v.runner_count.to_string(),
                v.last_activity.clone(),
            ]
        })
        .collect();
    print_table(
        &["NAME", "HOST", "STATUS", "AUTOMATION", "RUNNERS", "LAST ACTIVITY"],
        rows,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// runners
// ---------------------------------------------------------------------------

pub fn runners(ctx: &Context, host: &str, json: bool) -> anyhow::Result<()> {
    let server = ctx.server(host)?;
    let units = runners::list_runners(&ctx.executor(), &ctx.settings, &server.host)?;

    if json {
        return print_json(&units);
    }
    if units.is_empty() {
        println!("No runners on {}.", server.name);
        return Ok(());
    }

    let rows = units
        .iter()
        .map(|u| vec![u.service.clone(), u.status.to_string(), u.repo.clone()])
        .collect();
    print_table(&["SERVICE", "STATE", "REPO"], rows);
    Ok(())
}
