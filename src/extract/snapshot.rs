use super::PAGE_SIZE;
use crate::csv_page::{render_balance_page, BalanceRow};
use crate::env::ENV_CONFIG;
use crate::object_sink::{ObjectSink, S3ObjectSink};
use crate::pagination::PageWalker;
use crate::query_api::{ListTokenBalancesRequest, QueryApi, QueryApiHttp, TokenFilter};
use anyhow::Result;
use tracing::info;

pub struct SnapshotJobConfig {
    pub token: String,
    pub network: String,
}

/// Entry point for the balance-snapshot job. Full refresh semantics: no
/// checkpoint is kept and a rerun always starts from page zero.
pub async fn snapshot_token_balances() -> Result<()> {
    let credentials = ENV_CONFIG.credentials();
    let api = QueryApiHttp::new(
        credentials.clone(),
        &ENV_CONFIG.region,
        ENV_CONFIG.request_tries,
    );
    let sink = S3ObjectSink::new(credentials, &ENV_CONFIG.region, &ENV_CONFIG.s3_bucket);
    let config = SnapshotJobConfig {
        token: ENV_CONFIG.token.clone(),
        network: ENV_CONFIG.network.clone(),
    };
    extract_balance_snapshot(&api, &sink, &config).await
}

/// Walks every holder balance of the token and flushes one CSV per page, in the
/// order the upstream returns them. Empty pages still produce a header-only
/// object.
pub async fn extract_balance_snapshot(
    api: &impl QueryApi,
    sink: &impl ObjectSink,
    config: &SnapshotJobConfig,
) -> Result<()> {
    info!(token = %config.token, "starting balance snapshot");
    let initial_request = ListTokenBalancesRequest {
        token_filter: TokenFilter {
            network: config.network.clone(),
            contract_address: config.token.clone(),
        },
        next_token: None,
        max_results: PAGE_SIZE,
    };
    let mut walker = PageWalker::new(initial_request, move |request| async move {
        api.list_token_balances(&request).await
    });

    let mut page_number: u64 = 0;
    while let Some(page) = walker.next_page().await? {
        info!(
            page = page_number,
            page_size = page.token_balances.len(),
            "balances page"
        );
        let rows: Vec<BalanceRow> = page
            .token_balances
            .iter()
            .map(|balance| BalanceRow {
                token: config.token.clone(),
                holder_address: balance.owner_identifier.address.clone(),
                balance: balance.balance.clone(),
                timestamp_ms: (balance.at_blockchain_instant.time * 1000.0) as i64,
            })
            .collect();
        let path = format!("{}/snapshot/{:09}.csv", config.token, page_number);
        sink.put(&path, &render_balance_page(&rows)).await?;
        page_number += 1;
        if !walker.has_more() {
            info!("reached the last page, exiting");
        }
    }

    Ok(())
}
