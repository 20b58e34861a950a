use crate::context::Context;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use panel_core::actions::Actions;
use panel_core::inventory::{self, DEFAULT_USER};

#[derive(Subcommand)]
pub enum ServerSubcommand {
    /// List servers in the inventory
    List,

    /// Add a server under [runner-hosts]
    Add {
        name: String,
        /// Address written as ansible_host
        host: String,
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,
    },

    /// Decommission every runner on a server and drop it from the inventory
    Remove {
        name: String,
        /// Only edit the inventory; leave runner units on the host untouched
        #[arg(long)]
        keep_runners: bool,
    },
}

pub fn run(ctx: &Context, subcmd: ServerSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ServerSubcommand::List => list(ctx, json),
        ServerSubcommand::Add { name, host, user } => add(ctx, &name, &host, &user, json),
        ServerSubcommand::Remove { name, keep_runners } => remove(ctx, &name, keep_runners, json),
    }
}

fn list(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let servers = ctx.servers();
    if json {
        return print_json(&servers);
    }
    if servers.is_empty() {
        println!("No servers in {}.", ctx.settings.inventory.display());
        return Ok(());
    }
    let rows = servers
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                s.host.clone(),
                s.user.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["NAME", "HOST", "USER"], rows);
    Ok(())
}

fn add(ctx: &Context, name: &str, host: &str, user: &str, json: bool) -> anyhow::Result<()> {
    inventory::add_server(&ctx.settings.inventory, name, host, user)?;
    if json {
        print_json(&serde_json::json!({ "added": name, "servers": ctx.servers() }))
    } else {
        println!("Server {name} added.");
        Ok(())
    }
}

fn remove(ctx: &Context, name: &str, keep_runners: bool, json: bool) -> anyhow::Result<()> {
    let server = ctx.server(name)?;
    let removed_runners = if keep_runners {
        Vec::new()
    } else {
        let executor = ctx.executor();
        Actions::new(&executor, &ctx.settings).decommission_server(&server.host)?
    };
    inventory::remove_server(&ctx.settings.inventory, &server.name)?;

    if json {
        print_json(&serde_json::json!({
            "removed": server.name,
            "removed_runners": removed_runners,
        }))
    } else {
        for service in &removed_runners {
            println!("  removed {service}");
        }
        println!("Server {} and its runners removed.", server.name);
        Ok(())
    }
}
