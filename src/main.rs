use anyhow::Result;
use ideabot::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
