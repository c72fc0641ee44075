//! Heuristic 0-1000 credit scores for lending-protocol wallets.
//!
//! Scores are relative to the batch they were computed in: every wallet's
//! score depends on the min/max of every other wallet's features in the same
//! run, so scores from different input files are not comparable.

pub mod error;
pub mod export;
pub mod ingestion;
pub mod metrics;
pub mod pipeline;
pub mod wallet_features;
pub mod wallet_scoring;

pub use error::{Error, Result};
