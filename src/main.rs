use clap::Parser;

mod chat;
mod config;
mod evaluation;
mod models;
mod queue;
mod server;
mod telemetry;

use crate::config::Config;
use crate::server::Server;

/// Product chat service - grounded chat completions with a file-queued
/// offline evaluation pass
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the HTTP server to
    #[arg(short, long, default_value = "0.0.0.0:5001")]
    bind: String,

    /// Verbose output - debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    telemetry::init(args.verbose);

    let config = Config::from_env()?;

    Server::new(&config).run(&args.bind).await
}
