mod analytics;
mod care;
mod cli;
mod db;
mod download;
mod export;
mod geo;
mod geocode;
mod import;
mod matching;
mod model;
mod partners;
mod prices;
mod recommend;
mod search;
mod server;
mod storage;
mod text;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Import(cmd) => import::run(cmd).await.context("import failed"),
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
    }
}
