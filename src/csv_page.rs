///! CSV rendering for extracted pages. Pure text assembly, no I/O.
///! String fields are quoted, numeric fields are not, and embedded quotes/commas
///! are not escaped: addresses and hashes are fixed-format hex and never contain
///! them in practice.

pub const TRANSFER_PAGE_HEADER: &str =
    r#""contractAddress","eventType","from","to","value","transactionHash","transactionTimestamp""#;

pub const BALANCE_PAGE_HEADER: &str = r#""token","address","balance","datetime""#;

/// One transfer event row: a transaction joined with one of its token events.
pub struct TransferRow {
    pub contract_address: String,
    pub event_type: String,
    pub from_address: String,
    pub to_address: String,
    pub value: String,
    pub transaction_hash: String,
    pub transaction_timestamp_ms: i64,
}

/// One holder balance row from a snapshot page.
pub struct BalanceRow {
    pub token: String,
    pub holder_address: String,
    pub balance: String,
    pub timestamp_ms: i64,
}

pub fn render_transfer_page(rows: &[TransferRow]) -> String {
    let mut text = String::from(TRANSFER_PAGE_HEADER);
    text.push('\n');
    for row in rows {
        text.push_str(&format!(
            "\"{}\",\"{}\",\"{}\",\"{}\",{},\"{}\",{}\n",
            row.contract_address,
            row.event_type,
            row.from_address,
            row.to_address,
            row.value,
            row.transaction_hash,
            row.transaction_timestamp_ms
        ));
    }
    text
}

pub fn render_balance_page(rows: &[BalanceRow]) -> String {
    let mut text = String::from(BALANCE_PAGE_HEADER);
    text.push('\n');
    for row in rows {
        text.push_str(&format!(
            "\"{}\",\"{}\",{},{}\n",
            row.token, row.holder_address, row.balance, row.timestamp_ms
        ));
    }
    text
}
