use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::config::Config;
use std::path::{Path, PathBuf};

use scorer::export;
use scorer::pipeline::{self, PipelineOptions, PipelineOutput};

const USAGE: &str = "usage: scorer [score|rank|features] -i <transactions.json> [-o scores.csv] \
[--features <path>] [--top N] [--as-of <epoch>] [--config <path>]";

const DEFAULT_OUTPUT: &str = "scores.csv";
const DEFAULT_TOP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Score,
    Rank,
    Features,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub input: PathBuf,
    pub output: PathBuf,
    pub features_out: Option<PathBuf>,
    pub top: usize,
    /// Reference instant override, epoch seconds.
    pub as_of: Option<i64>,
    pub config: Option<PathBuf>,
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Invocation, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();
    let mut args = args.peekable();

    // Bare `-i in.json -o out.csv` means `score`.
    let command = match args.peek().map(String::as_str) {
        None | Some("help" | "-h" | "--help") => return Err(USAGE.to_string()),
        Some(flag) if flag.starts_with('-') => Command::Score,
        Some("score") => Command::Score,
        Some("rank") => Command::Rank,
        Some("features") => Command::Features,
        Some(other) => return Err(format!("unknown command: {other}\n{USAGE}")),
    };
    if args.peek().is_some_and(|a| !a.starts_with('-')) {
        let _ = args.next();
    }

    let mut input = None;
    let mut output = PathBuf::from(DEFAULT_OUTPUT);
    let mut features_out = None;
    let mut top = DEFAULT_TOP;
    let mut as_of = None;
    let mut config = None;

    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .ok_or_else(|| format!("missing value for {flag}\n{USAGE}"))
        };
        match flag.as_str() {
            "-i" | "--input" => input = Some(PathBuf::from(value()?)),
            "-o" | "--output" => output = PathBuf::from(value()?),
            "--features" => features_out = Some(PathBuf::from(value()?)),
            "--top" => {
                let raw = value()?;
                top = raw
                    .parse::<usize>()
                    .map_err(|e| format!("invalid --top {raw:?}: {e}"))?;
            }
            "--as-of" => {
                let raw = value()?;
                as_of = Some(
                    raw.parse::<i64>()
                        .map_err(|e| format!("invalid --as-of {raw:?}: {e}"))?,
                );
            }
            "--config" => config = Some(PathBuf::from(value()?)),
            other => return Err(format!("unknown argument: {other}\n{USAGE}")),
        }
    }

    let input = input.ok_or_else(|| format!("missing -i <transactions.json>\n{USAGE}"))?;
    Ok(Invocation {
        command,
        input,
        output,
        features_out,
        top,
        as_of,
        config,
    })
}

/// `--as-of` wins over `scoring.reference_time`; with neither, the wall clock.
pub fn reference_time(as_of: Option<i64>, config: &Config) -> Result<DateTime<Utc>> {
    match as_of.or(config.scoring.reference_time) {
        Some(secs) => DateTime::from_timestamp(secs, 0)
            .with_context(|| format!("reference time {secs} is out of range")),
        None => Ok(Utc::now()),
    }
}

pub fn run_command(inv: &Invocation, config: &Config) -> Result<()> {
    let now = reference_time(inv.as_of, config)?;
    let opts = PipelineOptions::from_config(config, now);
    let output = pipeline::run_file(&inv.input, &opts)
        .with_context(|| format!("failed to score {}", inv.input.display()))?;

    match inv.command {
        Command::Score => {
            write_scores(&inv.output, &output)?;
            if let Some(path) = &inv.features_out {
                write_features(path, &output)?;
            }
            println!(
                "Saved scores for {} wallets to {}",
                output.report.len(),
                inv.output.display()
            );
            Ok(())
        }
        Command::Rank => {
            show_rankings(&output, inv.top);
            Ok(())
        }
        Command::Features => {
            export::write_features_csv(std::io::stdout().lock(), &output.features)
        }
    }
}

fn write_scores(path: &Path, output: &PipelineOutput) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    export::write_scores_csv(file, &output.report)
}

fn write_features(path: &Path, output: &PipelineOutput) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    export::write_features_csv(file, &output.features)
}

fn show_rankings(output: &PipelineOutput, top: usize) {
    println!("Wallet credit scores (top {top}):");
    for (rank, (wallet, score)) in output.report.ranked().into_iter().take(top).enumerate() {
        println!("{:>4}  {score:>4}  {wallet}", rank + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> std::vec::IntoIter<String> {
        std::iter::once("scorer")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_bare_flags_mean_score() {
        let inv = parse_args(args(&["-i", "tx.json", "-o", "out.csv"])).unwrap();
        assert_eq!(inv.command, Command::Score);
        assert_eq!(inv.input, PathBuf::from("tx.json"));
        assert_eq!(inv.output, PathBuf::from("out.csv"));
        assert_eq!(inv.top, DEFAULT_TOP);
        assert!(inv.as_of.is_none());
    }

    #[test]
    fn test_output_defaults_to_scores_csv() {
        let inv = parse_args(args(&["score", "--input", "tx.json"])).unwrap();
        assert_eq!(inv.output, PathBuf::from("scores.csv"));
        assert!(inv.features_out.is_none());
    }

    #[test]
    fn test_rank_with_options() {
        let inv = parse_args(args(&[
            "rank",
            "-i",
            "tx.json",
            "--top",
            "5",
            "--as-of",
            "1700000000",
            "--config",
            "alt.toml",
        ]))
        .unwrap();
        assert_eq!(inv.command, Command::Rank);
        assert_eq!(inv.top, 5);
        assert_eq!(inv.as_of, Some(1_700_000_000));
        assert_eq!(inv.config, Some(PathBuf::from("alt.toml")));
    }

    #[test]
    fn test_features_command() {
        let inv = parse_args(args(&["features", "-i", "tx.json"])).unwrap();
        assert_eq!(inv.command, Command::Features);
    }

    #[test]
    fn test_errors() {
        assert!(parse_args(args(&[])).unwrap_err().starts_with("usage"));
        assert!(parse_args(args(&["plot", "-i", "x"]))
            .unwrap_err()
            .contains("unknown command: plot"));
        assert!(parse_args(args(&["score"]))
            .unwrap_err()
            .contains("missing -i"));
        assert!(parse_args(args(&["score", "-i"]))
            .unwrap_err()
            .contains("missing value for -i"));
        assert!(parse_args(args(&["rank", "-i", "x", "--top", "many"]))
            .unwrap_err()
            .contains("invalid --top"));
        assert!(parse_args(args(&["score", "-i", "x", "--verbose"]))
            .unwrap_err()
            .contains("unknown argument: --verbose"));
    }

    #[test]
    fn test_reference_time_precedence() {
        let mut config = Config::embedded_default().unwrap();
        config.scoring.reference_time = Some(1_600_000_000);

        let t = reference_time(Some(1_700_000_000), &config).unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);

        let t = reference_time(None, &config).unwrap();
        assert_eq!(t.timestamp(), 1_600_000_000);

        config.scoring.reference_time = None;
        let before = Utc::now();
        let t = reference_time(None, &config).unwrap();
        assert!(t >= before);

        assert!(reference_time(Some(i64::MAX), &config).is_err());
    }

    #[test]
    fn test_run_command_writes_scores_and_features() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("transactions.json");
        std::fs::write(
            &input,
            r#"[
                {"userWallet": "0xa", "timestamp": 1700000000, "action": "deposit",
                 "actionData": {"amount": "5000000", "assetSymbol": "USDC"}},
                {"userWallet": "0xb", "timestamp": 1700000000, "action": "liquidationcall",
                 "actionData": {"amount": "500000"}}
            ]"#,
        )
        .unwrap();

        let inv = Invocation {
            command: Command::Score,
            input,
            output: dir.path().join("scores.csv"),
            features_out: Some(dir.path().join("features.csv")),
            top: DEFAULT_TOP,
            as_of: Some(1_700_086_400),
            config: None,
        };
        run_command(&inv, &Config::embedded_default().unwrap()).unwrap();

        let scores = std::fs::read_to_string(&inv.output).unwrap();
        assert_eq!(scores, "wallet,score\n0xa,1000\n0xb,0\n");
        let features = std::fs::read_to_string(dir.path().join("features.csv")).unwrap();
        assert_eq!(features.lines().count(), 3);
    }

    #[test]
    fn test_run_command_reports_input_path_on_failure() {
        let inv = Invocation {
            command: Command::Rank,
            input: PathBuf::from("/nonexistent/transactions.json"),
            output: PathBuf::from(DEFAULT_OUTPUT),
            features_out: None,
            top: DEFAULT_TOP,
            as_of: Some(1_700_000_000),
            config: None,
        };
        let err = run_command(&inv, &Config::embedded_default().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/transactions.json"));
    }
}
