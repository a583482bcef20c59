//! Runnable farming process: one account per line in `accounts.txt`.
//!
//! ```bash
//! cargo run --example farm
//! ```

use remanga_farmer::{Config, accounts, farmer};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remanga_farmer=info".into()),
        )
        .init();

    let config = Arc::new(Config::default());
    let accounts = accounts::load_accounts(Path::new("accounts.txt"))?;
    info!(accounts = accounts.len(), "starting farming tasks");

    // Runs forever; each account's loop fails independently.
    farmer::farm_all(config, accounts).await;
    Ok(())
}
