//! Exit node standalone binary.

use clap::Parser;
use wsbridge_exit::cli::{self, ExitArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = ExitArgs::parse();
    cli::run(args).await
}
