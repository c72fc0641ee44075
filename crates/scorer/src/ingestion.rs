use chrono::{DateTime, Utc};
use common::types::{Action, RawTransaction};
use serde_json::Value;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};

/// Raw amounts are 6-decimal base units (USDC-style).
pub const AMOUNT_DIVISOR: f64 = 1_000_000.0;
pub const UNKNOWN_ASSET: &str = "UNKNOWN";

/// One validated transaction event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub wallet: String,
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    /// Amount after division by the configured divisor.
    pub amount: f64,
    pub asset: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestionOptions {
    pub amount_divisor: f64,
    pub default_asset: String,
    pub strict_amounts: bool,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            amount_divisor: AMOUNT_DIVISOR,
            default_asset: UNKNOWN_ASSET.to_string(),
            strict_amounts: true,
        }
    }
}

impl From<&common::config::Ingestion> for IngestionOptions {
    fn from(cfg: &common::config::Ingestion) -> Self {
        Self {
            amount_divisor: cfg.amount_divisor,
            default_asset: cfg.default_asset.clone(),
            strict_amounts: cfg.strict_amounts,
        }
    }
}

pub fn load_transactions_from_path(
    path: &Path,
    opts: &IngestionOptions,
) -> Result<Vec<Transaction>> {
    let file = std::fs::File::open(path)?;
    load_transactions(BufReader::new(file), opts)
}

/// Read a JSON array of transaction records to completion.
///
/// All-or-nothing: the first malformed record fails the whole load.
pub fn load_transactions<R: Read>(reader: R, opts: &IngestionOptions) -> Result<Vec<Transaction>> {
    let values: Vec<Value> = serde_json::from_reader(reader)?;

    let mut transactions = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        let raw: RawTransaction = serde_json::from_value(value)
            .map_err(|e| Error::data_format(index, e.to_string()))?;
        transactions.push(normalize_record(index, raw, opts)?);
    }

    metrics::counter!("scorer_transactions_loaded_total").increment(transactions.len() as u64);
    tracing::info!(transactions = transactions.len(), "loaded transactions");
    Ok(transactions)
}

fn normalize_record(index: usize, raw: RawTransaction, opts: &IngestionOptions) -> Result<Transaction> {
    let wallet = raw
        .user_wallet
        .ok_or_else(|| Error::data_format(index, "missing field `userWallet`"))?;
    let timestamp = raw
        .timestamp
        .as_ref()
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::data_format(index, "missing field `timestamp`"))
        .and_then(|v| parse_timestamp(v).map_err(|reason| Error::data_format(index, reason)))?;
    let action = raw
        .action
        .as_deref()
        .map(Action::parse)
        .ok_or_else(|| Error::data_format(index, "missing field `action`"))?;

    let data = raw.action_data.unwrap_or_default();
    let base_amount = match parse_amount(data.amount.as_ref()) {
        Ok(amount) => amount,
        Err(reason) if !opts.strict_amounts => {
            metrics::counter!("scorer_amount_coercions_total").increment(1);
            tracing::warn!(index, %wallet, %reason, "coercing malformed amount to 0");
            0.0
        }
        Err(reason) => return Err(Error::data_format(index, reason)),
    };
    let asset = data
        .asset_symbol
        .unwrap_or_else(|| opts.default_asset.clone());

    Ok(Transaction {
        wallet,
        timestamp,
        action,
        amount: base_amount / opts.amount_divisor,
        asset,
    })
}

fn parse_timestamp(value: &Value) -> std::result::Result<DateTime<Utc>, String> {
    let secs = match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("timestamp {n} is not an integer number of seconds"))?,
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("timestamp {s:?} is not an integer: {e}"))?,
        other => return Err(format!("timestamp has unsupported type: {other}")),
    };
    DateTime::from_timestamp(secs, 0).ok_or_else(|| format!("timestamp {secs} is out of range"))
}

/// Missing or null amounts are 0; anything present must be finite and non-negative.
fn parse_amount(value: Option<&Value>) -> std::result::Result<f64, String> {
    let amount = match value {
        None | Some(Value::Null) => return Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| format!("amount {n} is not representable"))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("amount {s:?} is not numeric: {e}"))?,
        Some(other) => return Err(format!("amount has unsupported type: {other}")),
    };
    if !amount.is_finite() {
        Err(format!("amount {amount} is not finite"))
    } else if amount < 0.0 {
        Err(format!("amount {amount} is negative"))
    } else {
        Ok(amount)
    }
}
