///! Extraction orchestrator. Two job shapes share the same walker and sink:
///! the incremental transfer-history job, which resumes from a persisted
///! checkpoint, and the full-refresh balance-snapshot job, which does not.
mod snapshot;
mod transfers;

pub use snapshot::{extract_balance_snapshot, snapshot_token_balances, SnapshotJobConfig};
pub use transfers::{extract_token_transfers, extract_transfer_history, TransferJobConfig};

pub const PAGE_SIZE: u32 = 250;
