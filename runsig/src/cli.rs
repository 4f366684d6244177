use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "runsig",
    version,
    about = "Replay typed method calls against a runtime type policy"
)]
pub struct Cli {
    /// Print reports as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Run the classes, signatures and calls of a JSON scenario.
    Check {
        scenario: PathBuf,

        /// TOML policy applied before the scenario runs.
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Log failures through custom handlers instead of raising.
        #[arg(long, default_value_t = false)]
        observe: bool,
    },

    /// Report optional runtime capabilities.
    Capabilities,
}
