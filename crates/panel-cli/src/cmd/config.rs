use crate::context::Context;
use crate::output::print_json;
use anyhow::{bail, Context as _};
use clap::Subcommand;
use panel_core::secrets;
use panel_core::settings::WarnLevel;
use std::collections::BTreeMap;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show resolved settings and vault variables (token masked)
    Show,

    /// Set vault variables
    Set {
        /// KEY=VALUE pairs, e.g. github_username=octocat
        #[arg(required = true, value_name = "KEY=VALUE")]
        pairs: Vec<String>,
    },

    /// Validate settings for common mistakes
    Validate,

    /// Write the resolved settings to the settings file
    Init,
}

pub fn run(ctx: &Context, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(ctx, json),
        ConfigSubcommand::Set { pairs } => set(ctx, &pairs, json),
        ConfigSubcommand::Validate => validate(ctx, json),
        ConfigSubcommand::Init => init(ctx),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let vars = secrets::load_vault_vars(&ctx.settings.vault)
        .with_context(|| format!("failed to read vault {}", ctx.settings.vault.display()))?;
    let vars = secrets::masked_vars(&vars);

    if json {
        return print_json(&serde_json::json!({
            "settings": ctx.settings,
            "vault_vars": vars,
        }));
    }

    print!("{}", serde_yaml::to_string(&ctx.settings)?);
    println!();
    if vars.is_empty() {
        println!("vault: (empty)");
    } else {
        println!("vault:");
        for (key, value) in &vars {
            let shown = match value {
                serde_yaml::Value::String(s) => s.clone(),
                other => serde_yaml::to_string(other)?.trim_end().to_string(),
            };
            println!("  {key:<24} {shown}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// set
// ---------------------------------------------------------------------------

fn set(ctx: &Context, pairs: &[String], json: bool) -> anyhow::Result<()> {
    let mut updates = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("expected KEY=VALUE, got '{pair}'");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("empty key in '{pair}'");
        }
        updates.insert(key.to_string(), value.to_string());
    }

    let vars = secrets::update_vault_vars(&ctx.settings.vault, &updates)?;
    if json {
        print_json(&serde_json::json!({ "vault_vars": secrets::masked_vars(&vars) }))
    } else {
        println!("Configuration updated successfully.");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let warnings = ctx.settings.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        bail!("config validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(ctx: &Context) -> anyhow::Result<()> {
    if ctx.settings_path.exists() {
        bail!("{} already exists", ctx.settings_path.display());
    }
    ctx.settings.save(&ctx.settings_path)?;
    println!("Wrote {}.", ctx.settings_path.display());
    Ok(())
}
