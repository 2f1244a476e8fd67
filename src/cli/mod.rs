//! CLI module for the cortex-cost command-line interface.
//!
//! Subcommands work directly against the local database (or a summary CSV
//! passed with `--input`):
//! - `serve` - Run the HTTP API and the snapshot task (default)
//! - `import <csv>` - Load raw usage rows into the database
//! - `snapshot` - Aggregate the trailing window and persist daily snapshots
//! - `summary` / `trend` / `project` / `compare` / `report` - Print reports
//! - `export` - Write a CSV export
//! - `config check` - Validate configuration file
//!
//! Tables go to stdout; logs go to stderr.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{resolve_scenario, Config};
use crate::db::{self, DbPool, SqliteSnapshotStore, UsageRecord};
use crate::engine::{
    aggregate_window, build_trend, compare_scenarios, project_portfolio, Baseline, BaselineMode,
    GrowthScenario, Horizon, SnapshotJob, SqliteUsageSource, UsageWindow, VarianceBand,
};
use crate::report::{
    credit_estimate, executive_summary, export_rows, format_currency, format_number,
    historical_overview, projection_rows, read_summary_csv, read_usage_csv, write_csv, CreditPrice,
};
use crate::usage::{normalize_batch, DailySummary, ServiceType};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "cortex-cost")]
#[command(author, version, about = "Usage cost monitoring and forecasting", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CORTEX_COST_CONFIG", default_value = "cortex-cost.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API and the background snapshot task
    Serve,

    /// Import raw usage rows from a CSV file
    Import {
        /// CSV with usage_time, service and per-service measure columns
        file: PathBuf,
    },

    /// Aggregate the trailing window and persist daily snapshots
    Snapshot {
        /// Snapshot date (default: today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Days of usage to aggregate (default: report.lookback_days)
        #[arg(long)]
        lookback: Option<u32>,
    },

    /// Print the historical overview and monthly credit estimate
    Summary {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print the week-over-week credit trend for one service
    Trend {
        /// Service id or name (e.g. cortex_analyst)
        #[arg(short, long)]
        service: String,
        #[arg(long)]
        lookback: Option<u32>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Project costs under one growth scenario
    Project {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        projection: ProjectionArgs,
    },

    /// Compare the preset growth scenarios side by side
    Compare {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        projection: ProjectionArgs,
    },

    /// Write a CSV export
    Export {
        #[arg(long, value_enum, default_value_t = ExportKind::Daily)]
        kind: ExportKind,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        projection: ProjectionArgs,
    },

    /// Print the executive summary
    Report {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        projection: ProjectionArgs,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    /// One row per date and service
    Daily,
    /// One row per projected month and service
    Projection,
    /// Monthly credit estimate per service
    Estimate,
}

/// Where daily summaries come from
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Read daily summaries from a CSV export instead of the database
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// Days of history (default: report.lookback_days)
    #[arg(long)]
    pub lookback: Option<u32>,
    /// Last day of history (default: today, UTC)
    #[arg(long)]
    pub end: Option<NaiveDate>,
    /// Price of one credit (default: pricing.credit_price)
    #[arg(long)]
    pub credit_price: Option<f64>,
}

/// Projection overrides
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectionArgs {
    /// Preset scenario: conservative, moderate, aggressive or rapid
    #[arg(long)]
    pub scenario: Option<String>,
    /// Custom monthly growth rate (e.g. 0.15 or -0.05)
    #[arg(long, allow_negative_numbers = true)]
    pub growth_rate: Option<f64>,
    /// Months to project
    #[arg(long)]
    pub months: Option<u32>,
    /// Baseline mode: daily or monthly
    #[arg(long)]
    pub baseline: Option<String>,
}

impl ProjectionArgs {
    fn scenario(&self, config: &Config) -> Result<GrowthScenario> {
        if self.scenario.is_none() && self.growth_rate.is_none() {
            return config.projection.growth_scenario();
        }
        resolve_scenario(self.scenario.as_deref(), self.growth_rate)
    }

    fn horizon(&self, config: &Config) -> Result<Horizon> {
        Ok(Horizon::new(
            self.months.unwrap_or(config.projection.horizon_months),
        )?)
    }

    fn baseline_mode(&self, config: &Config) -> Result<BaselineMode> {
        match &self.baseline {
            Some(raw) => BaselineMode::parse(raw).with_context(|| {
                format!("Unknown baseline mode '{}' (expected daily or monthly)", raw)
            }),
            None => config.projection.baseline_mode(),
        }
    }
}

impl SourceArgs {
    fn credit_price(&self, config: &Config) -> Result<CreditPrice> {
        Ok(CreditPrice::new(
            self.credit_price.unwrap_or(config.pricing.credit_price),
        )?)
    }

    fn window(&self, config: &Config) -> Result<UsageWindow> {
        let end = self.end.unwrap_or_else(|| Utc::now().date_naive());
        Ok(UsageWindow::trailing(
            end,
            self.lookback.unwrap_or(config.report.lookback_days),
        )?)
    }
}

// ============================================================================
// CLI Command Handlers
// ============================================================================

/// Run a subcommand other than `serve` and `config check`
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Some(Commands::Import { file }) => cmd_import(config, file).await,
        Some(Commands::Snapshot { date, lookback }) => cmd_snapshot(config, *date, *lookback).await,
        Some(Commands::Summary { source }) => cmd_summary(config, source).await,
        Some(Commands::Trend { service, lookback, end }) => {
            cmd_trend(config, service, *lookback, *end).await
        }
        Some(Commands::Project { source, projection }) => {
            cmd_project(config, source, projection).await
        }
        Some(Commands::Compare { source, projection }) => {
            cmd_compare(config, source, projection).await
        }
        Some(Commands::Export {
            kind,
            output,
            source,
            projection,
        }) => cmd_export(config, *kind, output.as_deref(), source, projection).await,
        Some(Commands::Report {
            json,
            source,
            projection,
        }) => cmd_report(config, *json, source, projection).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::Serve) | None => {
            // Serving is handled in main.rs
            Ok(())
        }
    }
}

/// Open the database under the configured data directory
pub async fn open_database(config: &Config) -> Result<DbPool> {
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.server.data_dir.display()
        )
    })?;
    db::init(&config.server.data_dir).await
}

/// Load daily summaries from `--input` or by aggregating the database window
pub async fn load_summaries(config: &Config, source: &SourceArgs) -> Result<Vec<DailySummary>> {
    if let Some(path) = &source.input {
        let file = File::open(path)
            .with_context(|| format!("Failed to open summary CSV: {}", path.display()))?;
        let imported = read_summary_csv(BufReader::new(file))?;
        if !imported.rejected.is_empty() {
            tracing::warn!(
                rejected = imported.rejected.len(),
                "Some summary rows were skipped"
            );
        }

        // A CSV only narrows to a window when one is asked for explicitly.
        if source.lookback.is_none() && source.end.is_none() {
            return Ok(imported.summaries);
        }
        let window = source.window(config)?;
        return Ok(imported
            .summaries
            .into_iter()
            .filter(|s| window.contains(s.usage_date))
            .collect());
    }

    let db = open_database(config).await?;
    let run = aggregate_window(&SqliteUsageSource::new(db), source.window(config)?).await?;
    if !run.rejected.is_empty() {
        eprintln!(
            "Warning: {} of {} usage rows were rejected (see logs)",
            run.rejected.len(),
            run.rows_read
        );
    }
    Ok(run.summaries)
}

async fn cmd_import(config: &Config, file: &Path) -> Result<()> {
    let reader = File::open(file)
        .with_context(|| format!("Failed to open usage CSV: {}", file.display()))?;
    let imported = read_usage_csv(BufReader::new(reader))?;
    let rows = imported.rows;

    let batch = normalize_batch(&rows);
    let db = open_database(config).await?;
    let inserted = UsageRecord::insert_many(&db, &rows)
        .await
        .context("Failed to store usage rows")?;

    println!("Imported {} usage rows from {}", inserted, file.display());
    if !imported.rejected.is_empty() {
        println!(
            "  {} unreadable rows were not imported (see logs)",
            imported.rejected.len()
        );
    }
    if !batch.rejected.is_empty() {
        println!(
            "  {} rows will be skipped during aggregation ({} invalid, {} unknown service)",
            batch.rejected.len(),
            batch.invalid_count(),
            batch.unknown_service_count()
        );
    }
    Ok(())
}

async fn cmd_snapshot(
    config: &Config,
    date: Option<NaiveDate>,
    lookback: Option<u32>,
) -> Result<()> {
    let db = open_database(config).await?;
    let job = SnapshotJob::new(
        Arc::new(SqliteUsageSource::new(db.clone())),
        Arc::new(SqliteSnapshotStore::new(db)),
        lookback.unwrap_or(config.report.lookback_days),
    )
    .with_retention(config.snapshot.retention_days);

    let snapshot_date = date.unwrap_or_else(|| Utc::now().date_naive());
    let result = job.run(snapshot_date).await?;

    println!("Snapshot {}", snapshot_date);
    println!("  Rows read:          {}", result.rows_read);
    println!("  Rows rejected:      {}", result.rows_rejected);
    println!("  Summaries computed: {}", result.summaries.len());
    println!("  Snapshots written:  {}", result.snapshots_written);

    if let Some(error) = result.persistence_error {
        bail!("Snapshot persistence failed: {}", error);
    }
    Ok(())
}

async fn cmd_summary(config: &Config, source: &SourceArgs) -> Result<()> {
    let price = source.credit_price(config)?;
    let summaries = load_summaries(config, source).await?;

    if summaries.is_empty() {
        println!("No usage data found.");
        return Ok(());
    }

    let overview = historical_overview(&summaries, price);
    println!();
    println!("=== Historical Overview ===");
    println!("  Days of data:      {}", overview.days_of_data);
    println!("  Active services:   {}", overview.active_services);
    println!("  Total credits:     {}", format_number(overview.total_credits));
    println!("  Total cost:        {}", format_currency(overview.total_cost));
    println!("  Avg daily cost:    {}", format_currency(overview.avg_daily_cost));
    println!("  Avg daily users:   {:.1}", overview.avg_daily_users);
    println!();
    println!(
        "{:<20}  {:>14}  {:>14}  {:>12}  {:>8}",
        "SERVICE", "CREDITS", "COST", "OPERATIONS", "SHARE"
    );
    println!("{}", "-".repeat(76));
    for service in &overview.services {
        println!(
            "{:<20}  {:>14.4}  {:>14}  {:>12}  {:>7.1}%",
            service.service_type.display_name(),
            service.total_credits,
            format_currency(service.total_cost),
            service.total_operations,
            service.pct_of_total
        );
    }

    println!();
    println!("=== Monthly Credit Estimate ===");
    println!(
        "{:<20}  {:>14}  {:>14}  {:>16}",
        "SERVICE", "CREDITS/DAY", "CREDITS/MONTH", "COST/MONTH"
    );
    println!("{}", "-".repeat(70));
    for row in credit_estimate(&summaries, price) {
        println!(
            "{:<20}  {:>14.4}  {:>14.4}  {:>16}",
            row.service,
            row.avg_credits_per_day,
            row.est_credits_per_month,
            format_currency(row.est_cost_per_month)
        );
    }
    println!();
    Ok(())
}

async fn cmd_trend(
    config: &Config,
    service: &str,
    lookback: Option<u32>,
    end: Option<NaiveDate>,
) -> Result<()> {
    let service_type = ServiceType::parse(service)
        .with_context(|| format!("Unknown service type '{}'", service))?;
    let window = UsageWindow::trailing(
        end.unwrap_or_else(|| Utc::now().date_naive()),
        lookback.unwrap_or(config.report.lookback_days),
    )?;

    let db = open_database(config).await?;
    let points = build_trend(&SqliteSnapshotStore::new(db), service_type, window).await?;

    if points.is_empty() {
        println!(
            "No snapshots for {} between {} and {}. Run `cortex-cost snapshot` first.",
            service_type.display_name(),
            window.start,
            window.end
        );
        return Ok(());
    }

    println!();
    println!("{} trend", service_type.display_name());
    println!("{:<12}  {:>14}  {:>14}  {:>10}", "DATE", "CREDITS", "7D AGO", "WOW");
    println!("{}", "-".repeat(56));
    for point in points {
        let previous = point
            .credits_7d_ago
            .map(|c| format!("{:.4}", c))
            .unwrap_or_else(|| "-".to_string());
        let growth = point
            .wow_growth_pct
            .map(|g| format!("{:+.1}%", g))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "{:<12}  {:>14.4}  {:>14}  {:>10}",
            point.usage_date, point.total_credits, previous, growth
        );
    }
    println!();
    Ok(())
}

fn baselines_or_bail(summaries: &[DailySummary], mode: BaselineMode) -> Result<Vec<Baseline>> {
    let baselines = Baseline::all_from_history(summaries, mode);
    if baselines.is_empty() {
        bail!("No usage history in the selected window; no projection possible");
    }
    Ok(baselines)
}

async fn cmd_project(config: &Config, source: &SourceArgs, args: &ProjectionArgs) -> Result<()> {
    let price = source.credit_price(config)?;
    let scenario = args.scenario(config)?;
    let horizon = args.horizon(config)?;
    let mode = args.baseline_mode(config)?;

    let summaries = load_summaries(config, source).await?;
    let baselines = baselines_or_bail(&summaries, mode)?;
    let projection = project_portfolio(&baselines, &scenario, horizon);

    println!();
    println!(
        "{} scenario: {:.0}% monthly growth over {} months",
        scenario.name(),
        scenario.monthly_growth_rate() * 100.0,
        horizon.months()
    );
    println!();
    println!("{:<20}  {:>16}  {:>16}", "SERVICE", "BASELINE CREDITS", "BASELINE COST");
    println!("{}", "-".repeat(56));
    for baseline in &baselines {
        println!(
            "{:<20}  {:>16.4}  {:>16}",
            baseline.service_type.display_name(),
            baseline.monthly_credits,
            format_currency(price.cost_of(baseline.monthly_credits))
        );
    }

    println!();
    println!(
        "{:<6}  {:>16}  {:>14}  {:>14}  {:>14}",
        "MONTH", "CREDITS", "COST", "LOW", "HIGH"
    );
    println!("{}", "-".repeat(72));
    for total in projection.monthly_totals.iter().filter(|t| t.month_index > 0) {
        let band = VarianceBand::new(
            price.cost_of(total.projected_credits),
            config.report.variance_pct,
        )?;
        println!(
            "{:<6}  {:>16.4}  {:>14}  {:>14}  {:>14}",
            total.month_index,
            total.projected_credits,
            format_currency(band.expected),
            format_currency(band.lower),
            format_currency(band.upper)
        );
    }

    let band = VarianceBand::new(
        price.cost_of(projection.horizon_total()),
        config.report.variance_pct,
    )?;
    println!("{}", "-".repeat(72));
    println!(
        "{:<6}  {:>16.4}  {:>14}  {:>14}  {:>14}",
        "TOTAL",
        projection.horizon_total(),
        format_currency(band.expected),
        format_currency(band.lower),
        format_currency(band.upper)
    );
    println!();
    Ok(())
}

fn comparison_scenarios(args: &ProjectionArgs) -> Result<Vec<GrowthScenario>> {
    let mut scenarios = GrowthScenario::presets();
    if let Some(rate) = args.growth_rate {
        scenarios.push(resolve_scenario(None, Some(rate))?);
    }
    Ok(scenarios)
}

async fn cmd_compare(config: &Config, source: &SourceArgs, args: &ProjectionArgs) -> Result<()> {
    let price = source.credit_price(config)?;
    let horizon = args.horizon(config)?;
    let mode = args.baseline_mode(config)?;
    let scenarios = comparison_scenarios(args)?;

    let summaries = load_summaries(config, source).await?;
    let baselines = baselines_or_bail(&summaries, mode)?;

    println!();
    println!("Scenario comparison over {} months", horizon.months());
    println!(
        "{:<16}  {:>8}  {:>16}  {:>16}  {:>16}",
        "SCENARIO", "GROWTH", "TOTAL CREDITS", "TOTAL COST", "FINAL MONTH"
    );
    println!("{}", "-".repeat(82));
    for projection in compare_scenarios(&baselines, &scenarios, horizon) {
        println!(
            "{:<16}  {:>7.0}%  {:>16}  {:>16}  {:>16}",
            projection.scenario.name(),
            projection.scenario.monthly_growth_rate() * 100.0,
            format_number(projection.horizon_total()),
            format_currency(price.cost_of(projection.horizon_total())),
            format_currency(price.cost_of(projection.final_month()))
        );
    }
    println!();
    Ok(())
}

async fn cmd_export(
    config: &Config,
    kind: ExportKind,
    output: Option<&Path>,
    source: &SourceArgs,
    args: &ProjectionArgs,
) -> Result<()> {
    let price = source.credit_price(config)?;
    let summaries = load_summaries(config, source).await?;

    let mut sink: Box<dyn std::io::Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("Failed to create output file: {}", path.display())
        })?)),
        None => Box::new(std::io::stdout().lock()),
    };

    let rows_written = match kind {
        ExportKind::Daily => {
            let rows = export_rows(&summaries, price);
            write_csv(&mut sink, &rows)?;
            rows.len()
        }
        ExportKind::Estimate => {
            let rows = credit_estimate(&summaries, price);
            write_csv(&mut sink, &rows)?;
            rows.len()
        }
        ExportKind::Projection => {
            let baselines = baselines_or_bail(&summaries, args.baseline_mode(config)?)?;
            let projection =
                project_portfolio(&baselines, &args.scenario(config)?, args.horizon(config)?);
            let rows = projection_rows(&projection, price, config.report.variance_pct)?;
            write_csv(&mut sink, &rows)?;
            rows.len()
        }
    };

    if let Some(path) = output {
        tracing::info!(rows = rows_written, path = %path.display(), "Export written");
        eprintln!("Wrote {} rows to {}", rows_written, path.display());
    }
    Ok(())
}

async fn cmd_report(
    config: &Config,
    json: bool,
    source: &SourceArgs,
    args: &ProjectionArgs,
) -> Result<()> {
    let price = source.credit_price(config)?;
    let scenario = args.scenario(config)?;
    let horizon = args.horizon(config)?;
    let mode = args.baseline_mode(config)?;

    let summaries = load_summaries(config, source).await?;
    let summary = executive_summary(
        &summaries,
        price,
        &scenario,
        horizon,
        mode,
        config.report.variance_pct,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let overview = &summary.overview;
    println!();
    println!("=== Executive Summary ===");
    println!();
    println!("Current state ({} days of data):", overview.days_of_data);
    println!("  Total cost:       {}", format_currency(overview.total_cost));
    println!("  Avg daily cost:   {}", format_currency(overview.avg_daily_cost));
    println!("  Active services:  {}", overview.active_services);
    if let Some(top) = overview.services.first() {
        println!(
            "  Largest service:  {} ({:.1}% of credits)",
            top.service_type.display_name(),
            top.pct_of_total
        );
    }
    println!();

    match &summary.projection {
        Some(projection) => {
            println!(
                "Projection ({}, {:.0}% monthly, {} months):",
                projection.scenario,
                projection.monthly_growth_rate * 100.0,
                projection.horizon_months
            );
            println!(
                "  Total cost:       {} (range {} to {})",
                format_currency(projection.projected_total_cost.expected),
                format_currency(projection.projected_total_cost.lower),
                format_currency(projection.projected_total_cost.upper)
            );
            println!("  Avg monthly cost: {}", format_currency(projection.avg_monthly_cost));
            println!("  Final month cost: {}", format_currency(projection.final_month_cost));
            if !projection.services_without_baseline.is_empty() {
                let names: Vec<&str> = projection
                    .services_without_baseline
                    .iter()
                    .map(|s| s.display_name())
                    .collect();
                println!("  No history for:   {}", names.join(", "));
            }
        }
        None => println!("Projection: no usage history to project from"),
    }
    println!();
    Ok(())
}

/// Validate configuration file
pub fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!(
            "Defaults will be used. To customize, copy cortex-cost.example.toml to cortex-cost.toml"
        );
        return Ok(());
    }

    match Config::load(config_path) {
        Ok(config) => {
            println!("[OK] Configuration file is valid!");
            println!();
            println!("=== Configuration Summary ===");
            println!();
            println!("Server:");
            println!("  Host:         {}", config.server.host);
            println!("  Port:         {}", config.server.port);
            println!("  Data Dir:     {}", config.server.data_dir.display());
            println!();
            println!("Pricing:");
            println!("  Credit price: {}", format_currency(config.pricing.credit_price));
            println!();
            println!("Reporting:");
            println!("  Lookback:     {} days", config.report.lookback_days);
            println!("  Variance:     ±{:.0}%", config.report.variance_pct * 100.0);
            println!();
            println!("Projection:");
            println!("  Horizon:      {} months", config.projection.horizon_months);
            match config.projection.growth_scenario() {
                Ok(scenario) => println!(
                    "  Scenario:     {} ({:.0}% monthly)",
                    scenario.name(),
                    scenario.monthly_growth_rate() * 100.0
                ),
                Err(e) => println!("  Scenario:     invalid ({})", e),
            }
            println!("  Baseline:     {}", config.projection.baseline);
            println!();
            println!("Snapshots:");
            println!(
                "  Background:   {}",
                if config.snapshot.enabled { "Enabled" } else { "Disabled" }
            );
            println!("  Interval:     {}s", config.snapshot.interval_secs);
            println!("  Retention:    {} days", config.snapshot.retention_days);
            Ok(())
        }
        Err(e) => {
            println!("[FAIL] Configuration is invalid");
            println!();
            println!("Error: {:#}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_project_args() {
        let cli = Cli::try_parse_from([
            "cortex-cost",
            "project",
            "--growth-rate",
            "-0.05",
            "--months",
            "6",
            "--credit-price",
            "2.5",
        ])
        .unwrap();

        let Some(Commands::Project { source, projection }) = cli.command else {
            panic!("expected project command");
        };
        assert_eq!(projection.growth_rate, Some(-0.05));
        assert_eq!(projection.months, Some(6));
        assert_eq!(source.credit_price, Some(2.5));

        let config = Config::default();
        let scenario = projection.scenario(&config).unwrap();
        assert_eq!(scenario.monthly_growth_rate(), -0.05);
        assert_eq!(projection.horizon(&config).unwrap().months(), 6);
    }

    #[test]
    fn test_projection_args_fall_back_to_config() {
        let mut config = Config::default();
        config.projection.scenario = "aggressive".to_string();
        config.projection.baseline = "monthly".to_string();

        let args = ProjectionArgs::default();
        assert_eq!(args.scenario(&config).unwrap(), GrowthScenario::aggressive());
        assert_eq!(args.baseline_mode(&config).unwrap(), BaselineMode::MonthlyTotal);

        let bad = ProjectionArgs {
            baseline: Some("weekly".to_string()),
            ..Default::default()
        };
        assert!(bad.baseline_mode(&config).is_err());
    }

    #[test]
    fn test_parse_export_kind() {
        let cli = Cli::try_parse_from(["cortex-cost", "export", "--kind", "estimate"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Export {
                kind: ExportKind::Estimate,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_load_summaries_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "DATE,SERVICE_TYPE,TOTAL_CREDITS\n2025-01-01,cortex_analyst,4\n2025-01-20,cortex_search,2"
        )
        .unwrap();

        let config = Config::default();
        let all = SourceArgs {
            input: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(load_summaries(&config, &all).await.unwrap().len(), 2);

        let narrowed = SourceArgs {
            input: Some(file.path().to_path_buf()),
            lookback: Some(7),
            end: NaiveDate::from_ymd_opt(2025, 1, 21),
            ..Default::default()
        };
        let summaries = load_summaries(&config, &narrowed).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].service_type, ServiceType::CortexSearch);
    }

    #[test]
    fn test_source_window_rejects_oversized_lookback() {
        let config = Config::default();
        let source = SourceArgs {
            lookback: Some(u32::MAX),
            ..Default::default()
        };
        assert!(source.window(&config).is_err());

        let source = SourceArgs {
            end: Some(NaiveDate::MIN),
            ..Default::default()
        };
        assert!(source.window(&config).is_err());
    }

    #[tokio::test]
    async fn test_import_then_summarize_database() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("usage.csv");
        std::fs::write(
            &csv_path,
            "usage_time,service,credits,message_count,unique_users\n\
             2025-03-01 08:00:00,cortex_analyst,3.5,10,2\n\
             2025-03-01 09:00:00,cortex_analyst,1.5,5,1\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.server.data_dir = dir.path().join("data");
        cmd_import(&config, &csv_path).await.unwrap();

        let source = SourceArgs {
            end: NaiveDate::from_ymd_opt(2025, 3, 2),
            ..Default::default()
        };
        let summaries = load_summaries(&config, &source).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_credits, 5.0);
        assert_eq!(summaries[0].total_operations, 15);
        assert_eq!(summaries[0].daily_unique_actors, 3);
    }
}
