#![forbid(unsafe_code)]

mod cli;
mod runner;
mod scenario;

use clap::Parser;
use miette::miette;
use runsig_core::{Configuration, PolicyFile};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Cmd};
use crate::runner::Runner;
use crate::scenario::Scenario;

#[derive(Debug, Serialize)]
struct Capabilities {
    version: &'static str,
    native_prop_serde: bool,
    scalar_types: Vec<String>,
}

fn init_tracing() {
    // Silent unless RUNSIG_LOG is set, e.g. RUNSIG_LOG=runsig_core=debug
    if let Ok(filter) = EnvFilter::try_from_env("RUNSIG_LOG") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
        tracing::debug!("tracing initialized");
    }
}

fn to_json(value: &impl Serialize) -> miette::Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| miette!("failed to encode report: {e}"))
}

fn main() -> miette::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Configuration::global();

    match cli.cmd {
        Cmd::Check {
            scenario,
            policy,
            observe,
        } => {
            if let Some(path) = policy {
                let policy = PolicyFile::from_file(&path)?;
                config.apply_policy(&policy)?;
            }
            let parsed = Scenario::from_file(&scenario)?;
            let mut runner = Runner::new(config, observe);
            let report = runner.run(&scenario.display().to_string(), &parsed)?;

            if cli.json {
                println!("{}", to_json(&report)?);
            } else {
                print!("{}", report.render_text());
            }
            if !report.ok {
                return Err(miette!("{} step(s) failed", report.failed()));
            }
        }
        Cmd::Capabilities => {
            let caps = Capabilities {
                version: env!("CARGO_PKG_VERSION"),
                native_prop_serde: config.can_enable_vm_prop_serde(),
                scalar_types: config.scalar_types().iter().cloned().collect(),
            };
            if cli.json {
                println!("{}", to_json(&caps)?);
            } else {
                println!("runsig {}", caps.version);
                println!("native prop serde: {}", caps.native_prop_serde);
                println!("scalar types: {}", caps.scalar_types.join(" "));
            }
        }
    }
    Ok(())
}
