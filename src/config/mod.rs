use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::engine::{BaselineMode, GrowthScenario, Horizon, MAX_WINDOW_DAYS};
use crate::report::{CreditPrice, DEFAULT_CREDIT_PRICE};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub projection: ProjectionConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// Price of one credit in USD
    #[serde(default = "default_credit_price")]
    pub credit_price: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            credit_price: default_credit_price(),
        }
    }
}

fn default_credit_price() -> f64 {
    DEFAULT_CREDIT_PRICE
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Trailing window of usage history, in days (default: 30)
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Relative width of the projection range (default: 0.10 for ±10%)
    #[serde(default = "default_variance_pct")]
    pub variance_pct: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            variance_pct: default_variance_pct(),
        }
    }
}

fn default_lookback_days() -> u32 {
    30
}

fn default_variance_pct() -> f64 {
    0.10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectionConfig {
    /// Months to project (default: 12)
    #[serde(default = "default_horizon_months")]
    pub horizon_months: u32,
    /// Preset scenario name: conservative, moderate, aggressive or rapid
    #[serde(default = "default_scenario")]
    pub scenario: String,
    /// Custom monthly growth rate; overrides `scenario` when set
    #[serde(default)]
    pub growth_rate: Option<f64>,
    /// Baseline mode: "daily" (average × 30) or "monthly" (window total)
    #[serde(default = "default_baseline")]
    pub baseline: String,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            horizon_months: default_horizon_months(),
            scenario: default_scenario(),
            growth_rate: None,
            baseline: default_baseline(),
        }
    }
}

fn default_horizon_months() -> u32 {
    12
}

fn default_scenario() -> String {
    "moderate".to_string()
}

fn default_baseline() -> String {
    "daily".to_string()
}

impl ProjectionConfig {
    /// Scenario selected by this config
    pub fn growth_scenario(&self) -> Result<GrowthScenario> {
        resolve_scenario(Some(&self.scenario), self.growth_rate)
    }

    pub fn horizon(&self) -> Result<Horizon> {
        Ok(Horizon::new(self.horizon_months)?)
    }

    pub fn baseline_mode(&self) -> Result<BaselineMode> {
        BaselineMode::parse(&self.baseline).with_context(|| {
            format!(
                "Unknown baseline mode '{}' (expected daily or monthly)",
                self.baseline
            )
        })
    }
}

/// Pick a scenario: a custom rate wins over a preset name
pub fn resolve_scenario(name: Option<&str>, growth_rate: Option<f64>) -> Result<GrowthScenario> {
    if let Some(rate) = growth_rate {
        let label = format!("Custom ({:.0}%)", rate * 100.0);
        return Ok(GrowthScenario::custom(label, rate)?);
    }

    let name = name.unwrap_or("moderate");
    GrowthScenario::preset(name).with_context(|| {
        format!(
            "Unknown scenario '{}' (expected conservative, moderate, aggressive or rapid)",
            name
        )
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    /// Run the snapshot task while serving
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between snapshot checks (default: 3600)
    #[serde(default = "default_snapshot_interval")]
    pub interval_secs: u64,
    /// Days of snapshots to keep (default: 365)
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_snapshot_interval(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_snapshot_interval() -> u64 {
    3600
}

fn default_retention_days() -> i64 {
    365
}

/// Longest snapshot retention accepted (100 years)
pub const MAX_RETENTION_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse configuration file")?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        CreditPrice::new(self.pricing.credit_price)?;

        if self.report.lookback_days == 0 || self.report.lookback_days > MAX_WINDOW_DAYS {
            bail!(
                "report.lookback_days must be between 1 and {}, got {}",
                MAX_WINDOW_DAYS,
                self.report.lookback_days
            );
        }
        if !(0.0..1.0).contains(&self.report.variance_pct) {
            bail!(
                "report.variance_pct must be at least 0 and below 1, got {}",
                self.report.variance_pct
            );
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.snapshot.retention_days) {
            bail!(
                "snapshot.retention_days must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS,
                self.snapshot.retention_days
            );
        }

        self.projection.horizon()?;
        self.projection.growth_scenario()?;
        self.projection.baseline_mode()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.pricing.credit_price, 3.0);
        assert_eq!(config.report.lookback_days, 30);
        assert_eq!(config.projection.horizon_months, 12);
        assert_eq!(config.projection.growth_scenario().unwrap(), GrowthScenario::moderate());
        assert_eq!(config.projection.baseline_mode().unwrap(), BaselineMode::DailyAverage);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[pricing]\ncredit_price = 2.5\n\n[projection]\nhorizon_months = 24\ngrowth_rate = -0.2\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.pricing.credit_price, 2.5);
        assert_eq!(config.projection.horizon_months, 24);
        assert_eq!(config.report.lookback_days, 30);

        let scenario = config.projection.growth_scenario().unwrap();
        assert_eq!(scenario.monthly_growth_rate(), -0.2);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.pricing.credit_price = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.projection.growth_rate = Some(-1.5);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.projection.scenario = "hypergrowth".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.report.variance_pct = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_day_counts_are_bounded() {
        let mut config = Config::default();
        config.report.lookback_days = MAX_WINDOW_DAYS;
        assert!(config.validate().is_ok());
        config.report.lookback_days = u32::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.snapshot.retention_days = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.projection.horizon_months = u32::MAX;
        assert!(config.validate().is_err());
    }
}
