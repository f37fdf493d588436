//! Entry node standalone binary.

use clap::Parser;
use wsbridge_entry::cli::{self, EntryArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = EntryArgs::parse();
    cli::run(args).await
}
