use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "anishelf",
    version,
    about = "Download episodes through ani-cli and browse them in a local web UI"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the web UI.
    Serve(ServeArgs),
    /// Run one catalog search and print the results.
    Search {
        query: String,
        #[arg(long, default_value = "sub", value_parser = ["sub", "dub"])]
        mode: String,
    },
}

#[derive(Debug, Default, clap::Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<String>,
    #[arg(long)]
    pub download_dir: Option<PathBuf>,
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}
