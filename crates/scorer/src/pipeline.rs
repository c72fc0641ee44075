use chrono::{DateTime, Utc};
use common::config::Config;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::ingestion::{self, IngestionOptions, Transaction};
use crate::wallet_features::{compute_features, FeatureTable};
use crate::wallet_scoring::{score_wallets, ScoreReport, ScoringParams};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub ingestion: IngestionOptions,
    pub scoring: ScoringParams,
    /// "Now" for recency. Inject a fixed instant for reproducible runs.
    pub reference_time: DateTime<Utc>,
    /// Fail with `EmptyInput` instead of returning empty tables.
    pub require_wallets: bool,
}

impl PipelineOptions {
    pub fn new(reference_time: DateTime<Utc>) -> Self {
        Self {
            ingestion: IngestionOptions::default(),
            scoring: ScoringParams::default(),
            reference_time,
            require_wallets: false,
        }
    }

    pub fn from_config(cfg: &Config, reference_time: DateTime<Utc>) -> Self {
        Self {
            ingestion: IngestionOptions::from(&cfg.ingestion),
            scoring: ScoringParams::from(&cfg.scoring),
            reference_time,
            require_wallets: cfg.scoring.require_wallets,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub features: FeatureTable,
    pub report: ScoreReport,
}

pub fn run_file(path: &Path, opts: &PipelineOptions) -> Result<PipelineOutput> {
    let transactions = ingestion::load_transactions_from_path(path, &opts.ingestion)?;
    score_transactions(&transactions, opts)
}

/// load -> extract -> score, all-or-nothing.
pub fn run<R: Read>(reader: R, opts: &PipelineOptions) -> Result<PipelineOutput> {
    let transactions = ingestion::load_transactions(reader, &opts.ingestion)?;
    score_transactions(&transactions, opts)
}

pub fn score_transactions(
    transactions: &[Transaction],
    opts: &PipelineOptions,
) -> Result<PipelineOutput> {
    let span = tracing::info_span!("pipeline_run", reference_time = %opts.reference_time);
    let _g = span.enter();

    if transactions.is_empty() {
        if opts.require_wallets {
            return Err(Error::EmptyInput);
        }
        tracing::warn!("input contains no transactions; producing empty tables");
    }

    let features = compute_features(transactions, opts.reference_time);
    let report = score_wallets(&features, &opts.scoring)?;
    Ok(PipelineOutput { features, report })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> PipelineOptions {
        PipelineOptions::new(DateTime::from_timestamp(1_700_086_400, 0).unwrap())
    }

    #[test]
    fn test_empty_input_is_soft_by_default() {
        let out = run("[]".as_bytes(), &opts()).unwrap();
        assert!(out.features.is_empty());
        assert!(out.report.is_empty());
    }

    #[test]
    fn test_empty_input_fails_when_wallets_required() {
        let strict = PipelineOptions {
            require_wallets: true,
            ..opts()
        };
        let err = run("[]".as_bytes(), &strict).unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }

    #[test]
    fn test_malformed_record_fails_whole_run() {
        let json = r#"[
            {"userWallet": "0xa", "timestamp": 1700000000, "action": "deposit"},
            {"userWallet": "0xb", "timestamp": "soon", "action": "deposit"}
        ]"#;
        let err = run(json.as_bytes(), &opts()).unwrap_err();
        assert!(matches!(err, Error::DataFormat { index: Some(1), .. }));
    }

    #[test]
    fn test_overflowing_amount_fails_whole_run() {
        let json = r#"[
            {"userWallet": "0xa", "timestamp": 1700000000, "action": "deposit",
             "actionData": {"amount": "1e300"}},
            {"userWallet": "0xa", "timestamp": 1700000001, "action": "deposit",
             "actionData": {"amount": "1"}},
            {"userWallet": "0xb", "timestamp": 1700000000, "action": "borrow",
             "actionData": {"amount": "1000000"}}
        ]"#;
        let err = run(json.as_bytes(), &opts()).unwrap_err();
        assert!(matches!(
            err,
            Error::NonFinite { ref wallet, ref column } if wallet == "0xa" && column == "amount_std"
        ));
    }

    #[test]
    fn test_from_config_carries_sections() {
        let mut cfg = Config::embedded_default().unwrap();
        cfg.ingestion.strict_amounts = false;
        cfg.scoring.require_wallets = true;
        let reference = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let opts = PipelineOptions::from_config(&cfg, reference);
        assert!(!opts.ingestion.strict_amounts);
        assert!(opts.require_wallets);
        assert_eq!(opts.scoring, ScoringParams::default());
        assert_eq!(opts.reference_time, reference);
    }
}
