//! Run command - reconcile one resource.

use std::io::Read;
use std::path::Path;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use serde_json::{Map, Value};

use converge_engine::{Engine, Outcome, ResourceIntent};

use super::Context;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Module name, as defined under [modules] in the config
    pub module: String,

    /// JSON file with the module parameters ("-" reads stdin)
    #[arg(short, long, value_name = "FILE")]
    pub params: Option<String>,

    /// Set a single parameter (value parsed as JSON, else taken as a string)
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Report planned changes without making them
    #[arg(long)]
    pub check: bool,
}

/// Run the run command.
pub fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let module = ctx.loaded.config.module(&args.module)?;
    module.validate(&args.module)?;

    let mut params = match args.params.as_deref() {
        Some(source) => read_params(source)?,
        None => Map::new(),
    };
    for assignment in &args.set {
        let (key, value) = parse_assignment(assignment)?;
        params.insert(key, value);
    }
    if ctx.verbose {
        tracing::debug!(module = %args.module, params = %serde_json::Value::Object(params.clone()), "parameters");
    }

    let outcome = match ResourceIntent::from_params(module, Value::Object(params)) {
        Ok(intent) => {
            let intent = intent.with_check_mode(args.check);
            let client = ctx.client()?;
            Engine::new(&client).reconcile(module, &intent)
        }
        Err(e) => Outcome {
            error: Some(e.descriptor()),
            ..Default::default()
        },
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome.error {
        Some(error) => bail!("{}", error.message),
        None => Ok(()),
    }
}

fn read_params(source: &str) -> Result<Map<String, Value>> {
    let contents = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read parameters from stdin")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(source))
            .with_context(|| format!("failed to read {source}"))?
    };

    match serde_json::from_str(&contents).context("parameters are not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("parameters must be a JSON object"),
    }
}

fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = assignment.split_once('=') else {
        bail!("expected KEY=VALUE, got '{assignment}'");
    };
    if key.is_empty() {
        bail!("empty parameter name in '{assignment}'");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
