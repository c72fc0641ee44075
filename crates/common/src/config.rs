use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const EMBEDDED_DEFAULT: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub general: General,
    pub ingestion: Ingestion,
    pub scoring: Scoring,
    pub observability: Option<Observability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ingestion {
    /// Raw `actionData.amount` values are divided by this before aggregation.
    pub amount_divisor: f64,
    pub default_asset: String,
    /// When false, unparseable amounts become 0 instead of failing the run.
    pub strict_amounts: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scoring {
    pub epsilon: f64,
    /// Fixed "now" in epoch seconds. Absent means wall-clock time at startup.
    pub reference_time: Option<i64>,
    #[serde(default)]
    pub require_wallets: bool,
    pub weights: Vec<WeightEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeightEntry {
    pub feature: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct Observability {
    pub metrics_textfile: Option<String>,
}

impl Config {
    /// Load `config/default.toml` from the working directory, or the embedded
    /// copy when no such file exists.
    pub fn load() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load_from(path)
        } else {
            Self::embedded_default()
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn embedded_default() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_DEFAULT)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let divisor = self.ingestion.amount_divisor;
        if !divisor.is_finite() || divisor <= 0.0 {
            bail!("ingestion.amount_divisor must be positive, got {divisor}");
        }
        let epsilon = self.scoring.epsilon;
        if !epsilon.is_finite() || epsilon <= 0.0 {
            bail!("scoring.epsilon must be positive, got {epsilon}");
        }
        let mut seen = HashSet::new();
        for entry in &self.scoring.weights {
            if !entry.weight.is_finite() {
                bail!("weight for {} is not finite", entry.feature);
            }
            if !seen.insert(entry.feature.as_str()) {
                bail!("duplicate weight for feature {}", entry.feature);
            }
        }
        Ok(())
    }

    pub fn metrics_textfile(&self) -> Option<&str> {
        self.observability
            .as_ref()
            .and_then(|o| o.metrics_textfile.as_deref())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
