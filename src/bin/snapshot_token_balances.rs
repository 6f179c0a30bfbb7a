use anyhow::Result;
use token_dashboard_backend::{log, snapshot_token_balances};

#[tokio::main]
pub async fn main() -> Result<()> {
    log::init();
    snapshot_token_balances().await
}
