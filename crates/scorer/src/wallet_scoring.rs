use common::config::WeightEntry;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::wallet_features::{FeatureColumn, FeatureTable};

pub const SCORE_MAX: u16 = 1000;
pub const DEFAULT_EPSILON: f64 = 1e-9;

/// Pseudo-column name used when the combined raw score itself has zero variance.
pub const SCORE_COLUMN: &str = "score";

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWeight {
    pub feature: String,
    pub weight: f64,
}

impl FeatureWeight {
    fn new(feature: &str, weight: f64) -> Self {
        Self {
            feature: feature.to_string(),
            weight,
        }
    }
}

/// Ordered weight table applied to normalized feature columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWeights {
    entries: Vec<FeatureWeight>,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            entries: vec![
                FeatureWeight::new("sum_repay", 2.0),
                FeatureWeight::new("count_deposit", 1.0),
                FeatureWeight::new("sum_deposit", 1.0),
                // Rewards slower repayment; kept as-is, see DESIGN.md.
                FeatureWeight::new("borrow_repay_delay", 1.0),
                FeatureWeight::new("count_borrow", -1.0),
                // Matches no column, so it is skipped; see DESIGN.md.
                FeatureWeight::new("num_liquidations", -3.0),
                FeatureWeight::new("recency_days", -0.5),
                FeatureWeight::new("distinct_assets", 0.2),
                FeatureWeight::new("amount_std", -0.1),
            ],
        }
    }
}

impl ScoreWeights {
    pub fn new(entries: Vec<FeatureWeight>) -> Self {
        Self { entries }
    }

    pub fn from_config(entries: &[WeightEntry]) -> Self {
        Self::new(
            entries
                .iter()
                .map(|e| FeatureWeight::new(&e.feature, e.weight))
                .collect(),
        )
    }

    pub fn entries(&self) -> &[FeatureWeight] {
        &self.entries
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringParams {
    pub weights: ScoreWeights,
    /// Added to every (max - min) denominator.
    pub epsilon: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl From<&common::config::Scoring> for ScoringParams {
    fn from(cfg: &common::config::Scoring) -> Self {
        Self {
            weights: ScoreWeights::from_config(&cfg.weights),
            epsilon: cfg.epsilon,
        }
    }
}

/// Population extrema of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnRange {
    pub min: f64,
    pub max: f64,
}

impl ColumnRange {
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |range, v| {
            Some(match range {
                None => Self { min: v, max: v },
                Some(Self { min, max }) => Self {
                    min: min.min(v),
                    max: max.max(v),
                },
            })
        })
    }

    /// (value - min) / (max - min + epsilon); not clamped.
    pub fn normalize(&self, value: f64, epsilon: f64) -> f64 {
        (value - self.min) / (self.max - self.min + epsilon)
    }

    pub fn is_degenerate(&self) -> bool {
        self.max <= self.min
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreReport {
    pub scores: BTreeMap<String, u16>,
    /// Weighted sums before population rescaling.
    pub raw_scores: BTreeMap<String, f64>,
    /// Weighted columns (and `score`) with zero variance across the population.
    /// Unweighted columns never enter the sum and are not listed.
    pub degenerate_columns: Vec<String>,
}

impl ScoreReport {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Highest score first; ties broken by wallet.
    pub fn ranked(&self) -> Vec<(&str, u16)> {
        let mut rows: Vec<(&str, u16)> = self
            .scores
            .iter()
            .map(|(wallet, score)| (wallet.as_str(), *score))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        rows
    }
}

/// Score every wallet in the table against the rest of the same batch.
///
/// Scores are batch-relative: both the feature normalization and the final
/// rescale use this population's min/max, so adding or removing a wallet can
/// move every other wallet's score.
///
/// Fails with `NonFinite` when a feature or a combined raw score is NaN or
/// infinite, since min-max scaling cannot order such values.
pub fn score_wallets(table: &FeatureTable, params: &ScoringParams) -> Result<ScoreReport> {
    if table.is_empty() {
        tracing::info!("no wallets to score");
        return Ok(ScoreReport::default());
    }
    table.check_finite()?;
    let epsilon = params.epsilon;
    let mut degenerate_columns = Vec::new();

    // Pass 1: resolve weights against this batch's columns and collect extrema.
    let mut weighted: Vec<(FeatureColumn, f64, ColumnRange)> = Vec::new();
    for entry in params.weights.entries() {
        let Some(column) = FeatureColumn::parse(&entry.feature).filter(|c| table.has_column(c))
        else {
            tracing::debug!(feature = %entry.feature, "weighted feature absent from table; skipped");
            continue;
        };
        let Some(range) = ColumnRange::of(table.iter().map(|w| w.value(&column))) else {
            continue;
        };
        if range.is_degenerate() {
            report_degenerate(&entry.feature, range, &mut degenerate_columns);
        }
        weighted.push((column, entry.weight, range));
    }

    // Pass 2: weighted sum of normalized columns per wallet.
    let raw_scores: BTreeMap<String, f64> = table
        .iter()
        .map(|features| {
            let raw = weighted.iter().fold(0.0, |acc, (column, weight, range)| {
                acc + weight * range.normalize(features.value(column), epsilon)
            });
            (features.wallet.clone(), raw)
        })
        .collect();
    if let Some((wallet, raw)) = raw_scores.iter().find(|(_, raw)| !raw.is_finite()) {
        tracing::error!(%wallet, raw, "weighted score is not finite");
        return Err(Error::NonFinite {
            wallet: wallet.clone(),
            column: SCORE_COLUMN.to_string(),
        });
    }

    let mut scores = BTreeMap::new();
    if let Some(range) = ColumnRange::of(raw_scores.values().copied()) {
        if range.is_degenerate() {
            report_degenerate(SCORE_COLUMN, range, &mut degenerate_columns);
        }
        for (wallet, raw) in &raw_scores {
            let scaled = f64::from(SCORE_MAX) * (raw - range.min) / (range.max - range.min + epsilon);
            if scaled.is_nan() {
                return Err(Error::NonFinite {
                    wallet: wallet.clone(),
                    column: SCORE_COLUMN.to_string(),
                });
            }
            scores.insert(wallet.clone(), quantize(scaled));
        }
    }

    metrics::counter!("scorer_wallets_scored_total").increment(scores.len() as u64);
    tracing::info!(
        wallets = scores.len(),
        weighted_columns = weighted.len(),
        degenerate_columns = degenerate_columns.len(),
        "scored wallets"
    );

    Ok(ScoreReport {
        scores,
        raw_scores,
        degenerate_columns,
    })
}

fn report_degenerate(column: &str, range: ColumnRange, out: &mut Vec<String>) {
    metrics::counter!("scorer_degenerate_columns_total").increment(1);
    tracing::warn!(
        column,
        value = range.min,
        "zero variance across population; normalization falls back to epsilon"
    );
    out.push(column.to_string());
}

/// Clip to [0, SCORE_MAX] and round half-to-even.
fn quantize(scaled: f64) -> u16 {
    scaled.clamp(0.0, f64::from(SCORE_MAX)).round_ties_even() as u16
}
