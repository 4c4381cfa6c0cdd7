mod cli;
mod config;
mod model;
mod providers;
mod snapshot;
mod sync;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    cli::dispatch(&args).await
}
