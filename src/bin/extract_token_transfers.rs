use anyhow::Result;
use token_dashboard_backend::{extract_token_transfers, log};

#[tokio::main]
pub async fn main() -> Result<()> {
    log::init();
    extract_token_transfers().await
}
