//! Validate command - check configuration without contacting the API.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Only validate this module
    pub module: Option<String>,
}

/// Run the validate command.
pub fn run(args: ValidateArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.loaded.config;

    let sources = ctx.loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
    }

    match args.module {
        Some(name) => {
            config.module(&name)?.validate(&name)?;
            println!("Module '{}' is valid", name);
        }
        None => {
            config.validate()?;
            println!("{} module(s) valid", config.modules.len());
        }
    }
    Ok(())
}
