//! Modules command - list configured modules.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::Context;

/// Arguments for the modules command.
#[derive(Args, Debug)]
pub struct ModulesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the modules command.
pub fn run(args: ModulesArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.loaded.config;

    if args.json {
        let modules: Vec<_> = config
            .modules
            .iter()
            .map(|(name, module)| {
                json!({
                    "name": name,
                    "kind": module.kind.to_string(),
                    "resource_type": module.resource_type(),
                    "list_op": module.list_op,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    if config.modules.is_empty() {
        println!("No modules configured");
        return Ok(());
    }

    for (name, module) in &config.modules {
        println!(
            "  {:<24} {:<6} {}",
            name,
            module.kind.to_string(),
            module.resource_type()
        );
    }
    Ok(())
}
