use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "conduit",
    about = "Conduit: authenticated ingest, durable persist, queue notify",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file (defaults to ./conduit.toml when present)
    #[arg(short, long, global = true, env = "CONDUIT_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the ingestion server and both triggers
    Serve(ServeArgs),
    /// Provision the storage container and queue journal
    Init(InitArgs),
    /// Print a stored object and its properties
    Read(ReadArgs),
    /// Publish the pointer for an already stored object again
    Republish(RepublishArgs),
    /// Print the resolved settings with secrets redacted
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Override `server.bind_addr`
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Serve HTTP only; do not start the queue and blob triggers
    #[arg(long)]
    pub no_triggers: bool,
}

#[derive(Args)]
pub struct InitArgs {
    /// Also write the resolved settings to this file
    #[arg(long)]
    pub write_config: Option<PathBuf>,
}

#[derive(Args)]
pub struct ReadArgs {
    pub locator: String,
    /// Print only the content
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args)]
pub struct RepublishArgs {
    pub locator: String,
    /// Base URL of a running server to republish through, e.g. http://127.0.0.1:7071
    #[arg(long, env = "CONDUIT_SERVER_URL")]
    pub server: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {}
