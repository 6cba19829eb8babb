use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(author, version, about = "Messaging relay with human operator handover", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to config/$CONFIG_ENV)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the webhook server and the idle sweeper
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Rank knowledge rows against a query, as the relay would for a user message
    Search {
        query: String,

        /// Number of rows to return (defaults to knowledge.top_k)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Fetch the knowledge table and show its first rows
    Knowledge {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}
