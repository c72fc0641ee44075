use chrono::{DateTime, Utc};
use common::types::Action;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::ingestion::Transaction;

const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActionTotals {
    pub count: u64,
    pub sum: f64,
}

impl ActionTotals {
    fn record(&mut self, amount: f64) {
        self.count += 1;
        self.sum += amount;
    }
}

/// Behavioural features for one wallet. Every known action has totals, zero when unused.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletFeatures {
    pub wallet: String,
    pub deposit: ActionTotals,
    pub borrow: ActionTotals,
    pub repay: ActionTotals,
    pub redeem_underlying: ActionTotals,
    pub liquidation_call: ActionTotals,
    /// Totals for actions outside the known set, keyed by action name.
    pub other_actions: BTreeMap<String, ActionTotals>,
    pub distinct_assets: u32,
    /// Mean seconds from the i-th borrow to the i-th repay; 0 without pairs.
    pub borrow_repay_delay: f64,
    /// Sample standard deviation of amounts; 0 below two transactions.
    pub amount_std: f64,
    /// Whole days from the reference instant back to the last transaction.
    pub recency_days: i64,
}

impl WalletFeatures {
    fn empty(wallet: &str) -> Self {
        Self {
            wallet: wallet.to_string(),
            deposit: ActionTotals::default(),
            borrow: ActionTotals::default(),
            repay: ActionTotals::default(),
            redeem_underlying: ActionTotals::default(),
            liquidation_call: ActionTotals::default(),
            other_actions: BTreeMap::new(),
            distinct_assets: 0,
            borrow_repay_delay: 0.0,
            amount_std: 0.0,
            recency_days: 0,
        }
    }

    pub fn totals(&self, action: &Action) -> ActionTotals {
        match action {
            Action::Deposit => self.deposit,
            Action::Borrow => self.borrow,
            Action::Repay => self.repay,
            Action::RedeemUnderlying => self.redeem_underlying,
            Action::LiquidationCall => self.liquidation_call,
            Action::Other(name) => self.other_actions.get(name).copied().unwrap_or_default(),
        }
    }

    fn totals_mut(&mut self, action: &Action) -> &mut ActionTotals {
        match action {
            Action::Deposit => &mut self.deposit,
            Action::Borrow => &mut self.borrow,
            Action::Repay => &mut self.repay,
            Action::RedeemUnderlying => &mut self.redeem_underlying,
            Action::LiquidationCall => &mut self.liquidation_call,
            Action::Other(name) => self.other_actions.entry(name.clone()).or_default(),
        }
    }

    pub fn value(&self, column: &FeatureColumn) -> f64 {
        match column {
            FeatureColumn::Count(action) => self.totals(action).count as f64,
            FeatureColumn::Sum(action) => self.totals(action).sum,
            FeatureColumn::DistinctAssets => f64::from(self.distinct_assets),
            FeatureColumn::BorrowRepayDelay => self.borrow_repay_delay,
            FeatureColumn::AmountStd => self.amount_std,
            FeatureColumn::RecencyDays => self.recency_days as f64,
        }
    }
}

/// A named numeric column of the feature table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureColumn {
    Count(Action),
    Sum(Action),
    DistinctAssets,
    BorrowRepayDelay,
    AmountStd,
    RecencyDays,
}

impl FeatureColumn {
    pub fn name(&self) -> String {
        match self {
            Self::Count(action) => format!("count_{}", action.as_str()),
            Self::Sum(action) => format!("sum_{}", action.as_str()),
            Self::DistinctAssets => "distinct_assets".to_string(),
            Self::BorrowRepayDelay => "borrow_repay_delay".to_string(),
            Self::AmountStd => "amount_std".to_string(),
            Self::RecencyDays => "recency_days".to_string(),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "distinct_assets" => Some(Self::DistinctAssets),
            "borrow_repay_delay" => Some(Self::BorrowRepayDelay),
            "amount_std" => Some(Self::AmountStd),
            "recency_days" => Some(Self::RecencyDays),
            _ => {
                if let Some(action) = name.strip_prefix("count_").filter(|a| !a.is_empty()) {
                    Some(Self::Count(Action::parse(action)))
                } else {
                    name.strip_prefix("sum_")
                        .filter(|a| !a.is_empty())
                        .map(|action| Self::Sum(Action::parse(action)))
                }
            }
        }
    }
}

/// One row per wallet, iterated in wallet order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: BTreeMap<String, WalletFeatures>,
    other_actions: BTreeSet<String>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, wallet: &str) -> Option<&WalletFeatures> {
        self.rows.get(wallet)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WalletFeatures> {
        self.rows.values()
    }

    /// Unknown action names seen anywhere in the batch.
    pub fn other_actions(&self) -> &BTreeSet<String> {
        &self.other_actions
    }

    /// Known-action columns are always present; unknown-action columns only when observed.
    pub fn columns(&self) -> Vec<FeatureColumn> {
        let actions: Vec<Action> = Action::KNOWN
            .into_iter()
            .chain(self.other_actions.iter().cloned().map(Action::Other))
            .collect();

        let mut columns: Vec<FeatureColumn> =
            actions.iter().cloned().map(FeatureColumn::Count).collect();
        columns.extend(actions.into_iter().map(FeatureColumn::Sum));
        columns.extend([
            FeatureColumn::DistinctAssets,
            FeatureColumn::BorrowRepayDelay,
            FeatureColumn::AmountStd,
            FeatureColumn::RecencyDays,
        ]);
        columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(FeatureColumn::name).collect()
    }

    /// Fails on the first wallet holding a NaN or infinite column value.
    pub fn check_finite(&self) -> Result<()> {
        let columns = self.columns();
        for features in self.rows.values() {
            if let Some(column) = columns.iter().find(|c| !features.value(c).is_finite()) {
                tracing::error!(
                    wallet = %features.wallet,
                    column = %column.name(),
                    "feature is not finite"
                );
                return Err(Error::NonFinite {
                    wallet: features.wallet.clone(),
                    column: column.name(),
                });
            }
        }
        Ok(())
    }

    pub fn has_column(&self, column: &FeatureColumn) -> bool {
        match column {
            FeatureColumn::Count(Action::Other(name)) | FeatureColumn::Sum(Action::Other(name)) => {
                self.other_actions.contains(name)
            }
            _ => true,
        }
    }
}

/// Aggregate a flat transaction log into per-wallet features.
///
/// `now` is the reference instant for `recency_days`; production callers pass
/// the wall clock, tests pass a fixed instant.
pub fn compute_features(transactions: &[Transaction], now: DateTime<Utc>) -> FeatureTable {
    let mut by_wallet: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in transactions {
        by_wallet.entry(tx.wallet.as_str()).or_default().push(tx);
    }

    let mut table = FeatureTable::default();
    for (wallet, mut txs) in by_wallet {
        txs.sort_by_key(|t| t.timestamp);
        let features = compute_wallet_features(wallet, &txs, now);
        table
            .other_actions
            .extend(features.other_actions.keys().cloned());
        table.rows.insert(wallet.to_string(), features);
    }

    tracing::info!(
        wallets = table.len(),
        unknown_actions = table.other_actions.len(),
        "computed wallet features"
    );
    table
}

/// `txs` must be one wallet's transactions sorted by timestamp ascending.
fn compute_wallet_features(wallet: &str, txs: &[&Transaction], now: DateTime<Utc>) -> WalletFeatures {
    let mut features = WalletFeatures::empty(wallet);

    let mut assets = BTreeSet::new();
    for tx in txs {
        features.totals_mut(&tx.action).record(tx.amount);
        assets.insert(tx.asset.as_str());
    }
    features.distinct_assets = assets.len() as u32;

    features.borrow_repay_delay = mean_borrow_repay_delay(txs);

    let amounts: Vec<f64> = txs.iter().map(|t| t.amount).collect();
    features.amount_std = sample_std(&amounts);

    if let Some(last) = txs.last() {
        features.recency_days = whole_days_between(last.timestamp, now);
    }

    features
}

/// Pairs the i-th borrow with the i-th repay by chronological position, not by
/// causality. Repays that precede their paired borrow give negative delays.
fn mean_borrow_repay_delay(sorted: &[&Transaction]) -> f64 {
    let borrows = sorted
        .iter()
        .filter(|t| t.action == Action::Borrow)
        .map(|t| t.timestamp);
    let repays = sorted
        .iter()
        .filter(|t| t.action == Action::Repay)
        .map(|t| t.timestamp);

    let (total_secs, pairs) = borrows
        .zip(repays)
        .fold((0.0_f64, 0_u32), |(total, n), (borrow, repay)| {
            (total + (repay - borrow).num_seconds() as f64, n + 1)
        });

    if pairs == 0 {
        0.0
    } else {
        total_secs / f64::from(pairs)
    }
}

/// Sample (n - 1) standard deviation; 0 when fewer than two values.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

/// Floor of elapsed days; negative when `from` lies after `to`.
fn whole_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().div_euclid(SECS_PER_DAY)
}
