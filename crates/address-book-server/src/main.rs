use address_book::{ServiceConfig, init_logging_with_file};
use anyhow::Result;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServiceConfig::from_env()?;
    init_logging_with_file(Level::INFO, config.log_file.as_deref())?;

    address_book_server::serve(config).await
}
