use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "geofeeder")]
#[command(about = "Polls a geographic record feed and keeps local entities in sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the feed every five minutes and track entities until Ctrl-C
    Run,

    /// Run a single reconciliation cycle and print the records
    Poll {
        /// Print the cycle report and records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the configured credentials are accepted
    Check,
}
