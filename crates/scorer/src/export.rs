use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use crate::wallet_features::FeatureTable;
use crate::wallet_scoring::ScoreReport;

#[derive(Debug, Serialize)]
struct ScoreRow<'a> {
    wallet: &'a str,
    score: u16,
}

/// `wallet,score` rows in wallet order.
pub fn write_scores_csv<W: Write>(writer: W, report: &ScoreReport) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    for (wallet, score) in &report.scores {
        out.serialize(ScoreRow {
            wallet,
            score: *score,
        })?;
    }
    // An empty report still gets its header.
    if report.is_empty() {
        out.write_record(["wallet", "score"])?;
    }
    out.flush()?;
    Ok(())
}

/// `wallet` followed by every column of the table, one row per wallet.
pub fn write_features_csv<W: Write>(writer: W, table: &FeatureTable) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    let columns = table.columns();

    let mut header = vec!["wallet".to_string()];
    header.extend(table.column_names());
    out.write_record(&header)?;

    for features in table.iter() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(features.wallet.clone());
        record.extend(columns.iter().map(|c| features.value(c).to_string()));
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}
