pub mod node;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "depository")]
#[command(about = "Bank account ledger over HTTP", long_about = None)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "depository.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        #[arg(long)]
        listen: Option<String>,
        #[arg(long)]
        db_path: Option<String>,
    },
    /// Delete the account database
    Wipe {
        #[arg(long)]
        db_path: Option<String>,
    },
}
