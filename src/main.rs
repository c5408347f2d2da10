// Hashchain node and sample client - CLI

use clap::Parser;
use hashchain::cli::{self, Cli};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = cli::handle(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
