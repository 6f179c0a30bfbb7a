///! Request and response types for the managed blockchain query API, plus the
///! signed HTTP client implementing the three paginated list operations.
///! Missing result arrays deserialize as empty pages rather than erroring.
use crate::pagination::{PageRequest, PageResponse};
use crate::signed_client::{
    HttpTransport, ReqwestTransport, RequestError, SignedClient,
};
use crate::sigv4::Credentials;
use async_trait::async_trait;
use mockall::automock;
use reqwest::Url;
use serde::{Deserialize, Serialize};

pub const QUERY_SERVICE: &str = "managedblockchain-query";

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, Serialize)]
pub struct SortCriteria {
    #[serde(rename = "sortBy")]
    pub sort_by: String,
    #[serde(rename = "sortOrder")]
    pub sort_order: SortOrder,
}

impl SortCriteria {
    pub fn by_transaction_timestamp(sort_order: SortOrder) -> Self {
        Self {
            sort_by: "TRANSACTION_TIMESTAMP".to_string(),
            sort_order,
        }
    }
}

/// Inclusive instant bound, epoch seconds (fractional allowed).
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct BlockchainInstant {
    pub time: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationStatus {
    Final,
    Nonfinal,
}

/// Restricts transaction listing to the named confirmation statuses; omitted
/// entirely when the job should take the upstream default.
#[derive(Clone, Debug, Serialize)]
pub struct ConfirmationStatusFilter {
    pub include: Vec<ConfirmationStatus>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTransactionsRequest {
    pub address: String,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
    pub sort: SortCriteria,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_blockchain_instant: Option<BlockchainInstant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_blockchain_instant: Option<BlockchainInstant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_status_filter: Option<ConfirmationStatusFilter>,
    pub max_results: u32,
}

impl PageRequest for ListTransactionsRequest {
    fn set_next_token(&mut self, next_token: String) {
        self.next_token = Some(next_token);
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTransactionEventsRequest {
    pub transaction_hash: String,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
    pub max_results: u32,
}

impl PageRequest for ListTransactionEventsRequest {
    fn set_next_token(&mut self, next_token: String) {
        self.next_token = Some(next_token);
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenFilter {
    pub network: String,
    pub contract_address: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTokenBalancesRequest {
    pub token_filter: TokenFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
    pub max_results: u32,
}

impl PageRequest for ListTokenBalancesRequest {
    fn set_next_token(&mut self, next_token: String) {
        self.next_token = Some(next_token);
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TransactionSummary {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    #[serde(rename = "transactionTimestamp")]
    pub transaction_timestamp: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ListTransactionsResponse {
    #[serde(default)]
    pub transactions: Vec<TransactionSummary>,
    #[serde(rename = "nextToken", default)]
    pub next_token: Option<String>,
}

impl PageResponse for ListTransactionsResponse {
    fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }
}

// Event fields mirror what the upstream actually fills in; any of them can be
// absent, so the row rendering falls back to empty strings and a zero value.
#[derive(Clone, Debug, Deserialize)]
pub struct TransactionEvent {
    #[serde(rename = "contractAddress", default)]
    pub contract_address: Option<String>,
    #[serde(rename = "eventType", default)]
    pub event_type: Option<String>,
    #[serde(rename = "from", default)]
    pub from_address: Option<String>,
    #[serde(rename = "to", default)]
    pub to_address: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ListTransactionEventsResponse {
    #[serde(default)]
    pub events: Vec<TransactionEvent>,
    #[serde(rename = "nextToken", default)]
    pub next_token: Option<String>,
}

impl PageResponse for ListTransactionEventsResponse {
    fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OwnerIdentifier {
    pub address: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenBalance {
    pub balance: String,
    #[serde(rename = "ownerIdentifier")]
    pub owner_identifier: OwnerIdentifier,
    #[serde(rename = "atBlockchainInstant")]
    pub at_blockchain_instant: BlockchainInstant,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ListTokenBalancesResponse {
    #[serde(rename = "tokenBalances", default)]
    pub token_balances: Vec<TokenBalance>,
    #[serde(rename = "nextToken", default)]
    pub next_token: Option<String>,
}

impl PageResponse for ListTokenBalancesResponse {
    fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }
}

#[automock]
#[async_trait]
pub trait QueryApi: Send + Sync {
    async fn list_transactions(
        &self,
        request: &ListTransactionsRequest,
    ) -> Result<ListTransactionsResponse, RequestError>;

    async fn list_transaction_events(
        &self,
        request: &ListTransactionEventsRequest,
    ) -> Result<ListTransactionEventsResponse, RequestError>;

    async fn list_token_balances(
        &self,
        request: &ListTokenBalancesRequest,
    ) -> Result<ListTokenBalancesResponse, RequestError>;
}

pub struct QueryApiHttp<T = ReqwestTransport> {
    client: SignedClient<T>,
    list_transactions_url: Url,
    list_transaction_events_url: Url,
    list_token_balances_url: Url,
}

impl QueryApiHttp {
    pub fn new(credentials: Credentials, region: &str, max_tries: u32) -> Self {
        let base = format!("https://{QUERY_SERVICE}.{region}.amazonaws.com");
        Self {
            client: SignedClient::new(credentials, QUERY_SERVICE, region, max_tries),
            list_transactions_url: Url::parse(&format!("{base}/list-transactions"))
                .expect("expect a valid list-transactions url"),
            list_transaction_events_url: Url::parse(&format!(
                "{base}/list-transaction-events"
            ))
            .expect("expect a valid list-transaction-events url"),
            list_token_balances_url: Url::parse(&format!("{base}/list-token-balances"))
                .expect("expect a valid list-token-balances url"),
        }
    }
}

#[async_trait]
impl<T: HttpTransport> QueryApi for QueryApiHttp<T> {
    async fn list_transactions(
        &self,
        request: &ListTransactionsRequest,
    ) -> Result<ListTransactionsResponse, RequestError> {
        self.client.call(&self.list_transactions_url, request).await
    }

    async fn list_transaction_events(
        &self,
        request: &ListTransactionEventsRequest,
    ) -> Result<ListTransactionEventsResponse, RequestError> {
        self.client
            .call(&self.list_transaction_events_url, request)
            .await
    }

    async fn list_token_balances(
        &self,
        request: &ListTokenBalancesRequest,
    ) -> Result<ListTokenBalancesResponse, RequestError> {
        self.client.call(&self.list_token_balances_url, request).await
    }
}
