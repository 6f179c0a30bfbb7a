use super::PAGE_SIZE;
use crate::checkpoint::{checkpoint_key, CheckpointStore, SsmCheckpointStore};
use crate::csv_page::{render_transfer_page, TransferRow};
use crate::env::ENV_CONFIG;
use crate::object_sink::{ObjectSink, S3ObjectSink};
use crate::pagination::PageWalker;
use crate::query_api::{
    BlockchainInstant, ConfirmationStatusFilter, ListTransactionEventsRequest,
    ListTransactionsRequest, QueryApi, QueryApiHttp, SortCriteria, SortOrder,
    TransactionSummary,
};
use crate::signed_client::RequestError;
use anyhow::Result;
use tracing::info;

pub struct TransferJobConfig {
    pub token: String,
    pub network: String,
    pub confirmation_status_filter: Option<ConfirmationStatusFilter>,
}

/// Entry point for the incremental transfer-history job: wires the real query
/// client, parameter store and bucket from the environment, then runs the
/// extraction.
pub async fn extract_token_transfers() -> Result<()> {
    let credentials = ENV_CONFIG.credentials();
    let api = QueryApiHttp::new(
        credentials.clone(),
        &ENV_CONFIG.region,
        ENV_CONFIG.request_tries,
    );
    let checkpoints = SsmCheckpointStore::new(credentials.clone(), &ENV_CONFIG.region);
    let sink = S3ObjectSink::new(credentials, &ENV_CONFIG.region, &ENV_CONFIG.s3_bucket);
    let config = TransferJobConfig {
        token: ENV_CONFIG.token.clone(),
        network: ENV_CONFIG.network.clone(),
        confirmation_status_filter: ENV_CONFIG.confirmation_status_filter(),
    };
    extract_transfer_history(&api, &checkpoints, &sink, &config).await
}

/// Walks the token's transactions from the checkpointed lower bound to a fixed
/// upper bound, joins each transaction with its filtered event list, flushes one
/// CSV per page and persists the advanced checkpoint whenever another page
/// follows. A run that reaches the last page leaves the stored checkpoint
/// untouched, so the next run starts with a fresh upper-bound discovery.
pub async fn extract_transfer_history(
    api: &impl QueryApi,
    checkpoints: &impl CheckpointStore,
    sink: &impl ObjectSink,
    config: &TransferJobConfig,
) -> Result<()> {
    let key = checkpoint_key(&config.token);
    let mut checkpoint = checkpoints.load(&key).await?;
    info!(
        token = %config.token,
        page = checkpoint.page_number,
        from_time = checkpoint.last_saved_tx_time,
        "starting transfer extraction"
    );

    // One descending single-result query pins the upper time bound for the whole
    // run, so the walk never chases a moving head.
    let Some(to_time) = latest_transaction_time(api, config).await? else {
        info!(token = %config.token, "no transactions upstream, nothing to extract");
        return Ok(());
    };

    let initial_request = ListTransactionsRequest {
        address: config.token.clone(),
        network: config.network.clone(),
        next_token: None,
        sort: SortCriteria::by_transaction_timestamp(SortOrder::Ascending),
        from_blockchain_instant: Some(BlockchainInstant {
            time: checkpoint.last_saved_tx_time,
        }),
        to_blockchain_instant: Some(BlockchainInstant { time: to_time }),
        confirmation_status_filter: config.confirmation_status_filter.clone(),
        max_results: PAGE_SIZE,
    };
    let mut walker = PageWalker::new(initial_request, move |request| async move {
        api.list_transactions(&request).await
    });

    while let Some(page) = walker.next_page().await? {
        info!(
            page = checkpoint.page_number,
            page_size = page.transactions.len(),
            "transactions page"
        );

        if let Some(last) = page.transactions.last() {
            checkpoint.last_saved_tx_time = last.transaction_timestamp;
        }

        let mut rows = Vec::new();
        for tx in &page.transactions {
            collect_transfer_rows(api, config, tx, &mut rows).await?;
        }

        // A page without transactions produces no object; a page whose events all
        // belong to other contracts still flushes the header-only file.
        if !page.transactions.is_empty() {
            let path = format!(
                "{}/events/{:09}.csv",
                config.token, checkpoint.page_number
            );
            sink.put(&path, &render_transfer_page(&rows)).await?;
        }

        if walker.has_more() {
            checkpoint.page_number += 1;
            checkpoints.save(&key, &checkpoint).await?;
        } else {
            info!("this is the last page, exiting");
        }
    }

    Ok(())
}

async fn latest_transaction_time(
    api: &impl QueryApi,
    config: &TransferJobConfig,
) -> Result<Option<f64>, RequestError> {
    let request = ListTransactionsRequest {
        address: config.token.clone(),
        network: config.network.clone(),
        next_token: None,
        sort: SortCriteria::by_transaction_timestamp(SortOrder::Descending),
        from_blockchain_instant: None,
        to_blockchain_instant: None,
        confirmation_status_filter: config.confirmation_status_filter.clone(),
        max_results: 1,
    };
    let response = api.list_transactions(&request).await?;
    Ok(response
        .transactions
        .first()
        .map(|tx| tx.transaction_timestamp))
}

// Joins one transaction with its event list, keeping only events emitted by the
// token contract being extracted. The event list is itself paginated, so it gets
// its own walk.
async fn collect_transfer_rows(
    api: &impl QueryApi,
    config: &TransferJobConfig,
    tx: &TransactionSummary,
    rows: &mut Vec<TransferRow>,
) -> Result<(), RequestError> {
    let timestamp_ms = (tx.transaction_timestamp * 1000.0) as i64;
    let initial_request = ListTransactionEventsRequest {
        transaction_hash: tx.transaction_hash.clone(),
        network: config.network.clone(),
        next_token: None,
        max_results: PAGE_SIZE,
    };
    let mut walker = PageWalker::new(initial_request, move |request| async move {
        api.list_transaction_events(&request).await
    });
    while let Some(page) = walker.next_page().await? {
        for event in page.events {
            if event.contract_address.as_deref() != Some(config.token.as_str()) {
                continue;
            }
            rows.push(TransferRow {
                contract_address: event.contract_address.unwrap_or_default(),
                event_type: event.event_type.unwrap_or_default(),
                from_address: event.from_address.unwrap_or_default(),
                to_address: event.to_address.unwrap_or_default(),
                value: event.value.unwrap_or_else(|| "0".to_string()),
                transaction_hash: event.transaction_hash.unwrap_or_default(),
                transaction_timestamp_ms: timestamp_ms,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Checkpoint, MockCheckpointStore};
    use crate::object_sink::MockObjectSink;
    use crate::query_api::{
        ListTransactionEventsResponse, ListTransactionsResponse, MockQueryApi,
        TransactionEvent,
    };

    fn test_config() -> TransferJobConfig {
        TransferJobConfig {
            token: "0xtoken".to_string(),
            network: "ETHEREUM_MAINNET".to_string(),
            confirmation_status_filter: None,
        }
    }

    fn tx(hash: &str, timestamp: f64) -> TransactionSummary {
        TransactionSummary {
            transaction_hash: hash.to_string(),
            transaction_timestamp: timestamp,
        }
    }

    fn transactions_response(
        transactions: Vec<TransactionSummary>,
        next_token: Option<&str>,
    ) -> ListTransactionsResponse {
        ListTransactionsResponse {
            transactions,
            next_token: next_token.map(|token| token.to_string()),
        }
    }

    fn event(contract_address: &str, transaction_hash: &str) -> TransactionEvent {
        TransactionEvent {
            contract_address: Some(contract_address.to_string()),
            event_type: Some("ERC20_TRANSFER".to_string()),
            from_address: Some("0xfrom".to_string()),
            to_address: Some("0xto".to_string()),
            value: Some("100".to_string()),
            transaction_hash: Some(transaction_hash.to_string()),
        }
    }

    fn events_response(
        events: Vec<TransactionEvent>,
        next_token: Option<&str>,
    ) -> ListTransactionEventsResponse {
        ListTransactionEventsResponse {
            events,
            next_token: next_token.map(|token| token.to_string()),
        }
    }

    fn expect_upper_bound_discovery(api: &mut MockQueryApi, latest: Option<f64>) {
        api.expect_list_transactions()
            .withf(|request| {
                request.max_results == 1 && request.sort.sort_order == SortOrder::Descending
            })
            .times(1)
            .returning(move |_| {
                Ok(transactions_response(
                    latest.map(|time| tx("0xlatest", time)).into_iter().collect(),
                    None,
                ))
            });
    }

    #[tokio::test]
    async fn checkpoint_advances_and_persists_only_between_pages() {
        let mut api = MockQueryApi::new();
        expect_upper_bound_discovery(&mut api, Some(30.0));
        api.expect_list_transactions()
            .withf(|request| {
                request.sort.sort_order == SortOrder::Ascending
                    && request.next_token.is_none()
            })
            .times(1)
            .returning(|_| {
                Ok(transactions_response(
                    vec![tx("0xh1", 10.0), tx("0xh2", 20.0)],
                    Some("cursor-1"),
                ))
            });
        api.expect_list_transactions()
            .withf(|request| request.next_token.as_deref() == Some("cursor-1"))
            .times(1)
            .returning(|_| Ok(transactions_response(vec![tx("0xh3", 30.0)], None)));
        api.expect_list_transaction_events()
            .times(3)
            .returning(|request| {
                Ok(events_response(
                    vec![event("0xtoken", &request.transaction_hash)],
                    None,
                ))
            });

        let mut checkpoints = MockCheckpointStore::new();
        checkpoints
            .expect_load()
            .withf(|key| key == "token-transfers-0xtoken")
            .times(1)
            .returning(|_| Ok(Checkpoint::default()));
        // Persisted exactly once: after page 0, because a cursor followed. The
        // final page leaves the stored checkpoint untouched.
        checkpoints
            .expect_save()
            .withf(|key, checkpoint| {
                key == "token-transfers-0xtoken"
                    && checkpoint.page_number == 1
                    && checkpoint.last_saved_tx_time == 20.0
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut sink = MockObjectSink::new();
        sink.expect_put()
            .withf(|path, body| {
                path == "0xtoken/events/000000000.csv" && body.lines().count() == 3
            })
            .times(1)
            .returning(|_, _| Ok(()));
        sink.expect_put()
            .withf(|path, body| {
                path == "0xtoken/events/000000001.csv" && body.lines().count() == 2
            })
            .times(1)
            .returning(|_, _| Ok(()));

        extract_transfer_history(&api, &checkpoints, &sink, &test_config())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resume_uses_the_checkpointed_time_as_the_lower_bound() {
        let mut api = MockQueryApi::new();
        expect_upper_bound_discovery(&mut api, Some(9.0));
        api.expect_list_transactions()
            .withf(|request| {
                request.sort.sort_order == SortOrder::Ascending
                    && request
                        .from_blockchain_instant
                        .map(|instant| instant.time)
                        == Some(7.5)
                    && request.to_blockchain_instant.map(|instant| instant.time)
                        == Some(9.0)
                    && request.max_results == PAGE_SIZE
            })
            .times(1)
            .returning(|_| Ok(transactions_response(vec![tx("0xh9", 9.0)], None)));
        api.expect_list_transaction_events()
            .times(1)
            .returning(|request| {
                Ok(events_response(
                    vec![event("0xtoken", &request.transaction_hash)],
                    None,
                ))
            });

        let mut checkpoints = MockCheckpointStore::new();
        checkpoints.expect_load().times(1).returning(|_| {
            Ok(Checkpoint {
                page_number: 3,
                last_saved_tx_time: 7.5,
            })
        });
        checkpoints.expect_save().times(0);

        let mut sink = MockObjectSink::new();
        sink.expect_put()
            .withf(|path, _| path == "0xtoken/events/000000003.csv")
            .times(1)
            .returning(|_, _| Ok(()));

        extract_transfer_history(&api, &checkpoints, &sink, &test_config())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn events_of_other_contracts_are_filtered_out() {
        let mut api = MockQueryApi::new();
        expect_upper_bound_discovery(&mut api, Some(10.0));
        api.expect_list_transactions()
            .withf(|request| request.sort.sort_order == SortOrder::Ascending)
            .times(1)
            .returning(|_| Ok(transactions_response(vec![tx("0xh1", 10.0)], None)));
        api.expect_list_transaction_events()
            .times(1)
            .returning(|request| {
                Ok(events_response(
                    vec![
                        event("0xtoken", &request.transaction_hash),
                        event("0xother", &request.transaction_hash),
                    ],
                    None,
                ))
            });

        let mut checkpoints = MockCheckpointStore::new();
        checkpoints
            .expect_load()
            .times(1)
            .returning(|_| Ok(Checkpoint::default()));
        checkpoints.expect_save().times(0);

        let mut sink = MockObjectSink::new();
        sink.expect_put()
            .withf(|_, body| {
                let lines: Vec<&str> = body.lines().collect();
                lines.len() == 2 && lines[1].starts_with("\"0xtoken\"")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        extract_transfer_history(&api, &checkpoints, &sink, &test_config())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn nested_event_pages_are_walked_to_the_end() {
        let mut api = MockQueryApi::new();
        expect_upper_bound_discovery(&mut api, Some(10.0));
        api.expect_list_transactions()
            .withf(|request| request.sort.sort_order == SortOrder::Ascending)
            .times(1)
            .returning(|_| Ok(transactions_response(vec![tx("0xh1", 10.0)], None)));
        api.expect_list_transaction_events()
            .withf(|request| request.next_token.is_none())
            .times(1)
            .returning(|request| {
                Ok(events_response(
                    vec![event("0xtoken", &request.transaction_hash)],
                    Some("events-cursor"),
                ))
            });
        api.expect_list_transaction_events()
            .withf(|request| request.next_token.as_deref() == Some("events-cursor"))
            .times(1)
            .returning(|request| {
                Ok(events_response(
                    vec![event("0xtoken", &request.transaction_hash)],
                    None,
                ))
            });

        let mut checkpoints = MockCheckpointStore::new();
        checkpoints
            .expect_load()
            .times(1)
            .returning(|_| Ok(Checkpoint::default()));
        checkpoints.expect_save().times(0);

        let mut sink = MockObjectSink::new();
        sink.expect_put()
            .withf(|_, body| body.lines().count() == 3)
            .times(1)
            .returning(|_, _| Ok(()));

        extract_transfer_history(&api, &checkpoints, &sink, &test_config())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn no_upstream_transactions_means_nothing_to_do() {
        let mut api = MockQueryApi::new();
        expect_upper_bound_discovery(&mut api, None);
        api.expect_list_transaction_events().times(0);

        let mut checkpoints = MockCheckpointStore::new();
        checkpoints
            .expect_load()
            .times(1)
            .returning(|_| Ok(Checkpoint::default()));
        checkpoints.expect_save().times(0);

        let mut sink = MockObjectSink::new();
        sink.expect_put().times(0);

        extract_transfer_history(&api, &checkpoints, &sink, &test_config())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pages_with_transactions_but_no_matching_events_flush_header_only() {
        let mut api = MockQueryApi::new();
        expect_upper_bound_discovery(&mut api, Some(10.0));
        api.expect_list_transactions()
            .withf(|request| request.sort.sort_order == SortOrder::Ascending)
            .times(1)
            .returning(|_| Ok(transactions_response(vec![tx("0xh1", 10.0)], None)));
        api.expect_list_transaction_events()
            .times(1)
            .returning(|request| {
                Ok(events_response(
                    vec![event("0xother", &request.transaction_hash)],
                    None,
                ))
            });

        let mut checkpoints = MockCheckpointStore::new();
        checkpoints
            .expect_load()
            .times(1)
            .returning(|_| Ok(Checkpoint::default()));
        checkpoints.expect_save().times(0);

        let mut sink = MockObjectSink::new();
        sink.expect_put()
            .withf(|path, body| {
                path == "0xtoken/events/000000000.csv"
                    && body == format!("{}\n", crate::csv_page::TRANSFER_PAGE_HEADER)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        extract_transfer_history(&api, &checkpoints, &sink, &test_config())
            .await
            .unwrap();
    }
}
