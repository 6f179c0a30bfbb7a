pub mod checkpoint;
pub mod csv_page;
pub mod env;
pub mod extract;
pub mod log;
pub mod object_sink;
pub mod pagination;
pub mod query_api;
pub mod signed_client;
pub mod sigv4;

pub use extract::extract_token_transfers;
pub use extract::snapshot_token_balances;
