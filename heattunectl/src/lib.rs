use std::fmt::Write as _;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use heattune_core::{
    cost_report, load_config, metered_gj, plan_gain_changes, weekly_report, AnalysisWindow,
    ChangePlan, CostReport, CycleMetrics, HealthReport, HealthStatus, HeatTuneConfig,
    HistoryError, HistorySource, JsonLearningStore, LearningReport, MeterKind, Recommendation,
    ResponseMetrics, SqliteHistoryStore, StoreError, TuningError, TuningService, WeeklyReport,
    ZoneDuty, ZoneHealthInput, ZoneWeek, MAX_WINDOW_HOURS,
};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] heattune_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history error: {0}")]
    History(#[from] HistoryError),
    #[error("learning store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tuning(#[from] TuningError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("health check failed: {0}")]
    Unhealthy(String),
    #[error("window of {0} hours is out of range")]
    Window(i64),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Adaptive PID tuning for floor-heating zones", long_about = None)]
pub struct Cli {
    /// Path to heattune.toml (or .yaml)
    #[arg(long, default_value = "configs/heattune.toml")]
    pub config: PathBuf,
    /// SQLite file holding recorded entity history
    #[arg(long, default_value = "data/history.sqlite")]
    pub history_db: PathBuf,
    /// JSON file holding learned response metrics
    #[arg(long, default_value = "data/learning.json")]
    pub learning_file: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Heater switching statistics per zone
    Cycles(CyclesArgs),
    /// Closed-loop response metrics of one zone
    Response(ResponseArgs),
    /// Recommended gains with their provenance
    Recommend(ZoneArgs),
    /// Run a learning pass and persist sufficient metrics
    Learn(ZoneArgs),
    /// Gain changes the current recommendations would apply
    Plan(ZoneArgs),
    /// Check cycling, power demand and temperature sensors
    Health,
    /// Weekly energy use and cost
    Cost(CostArgs),
    /// Weekly per-zone performance report
    Report(ReportArgs),
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct CyclesArgs {
    /// Restrict to one zone
    #[arg(long)]
    pub zone: Option<String>,
    /// Window length in hours (defaults to analysis.window_hours)
    #[arg(long, value_parser = hours_parser())]
    pub hours: Option<i64>,
}

#[derive(Args, Debug, Clone)]
pub struct ResponseArgs {
    #[arg(long)]
    pub zone: String,
    /// Window length in hours (defaults to analysis.window_hours)
    #[arg(long, value_parser = hours_parser())]
    pub hours: Option<i64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ZoneArgs {
    /// Zones to include; all configured zones when omitted
    #[arg(long = "zone")]
    pub zones: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CostArgs {
    /// Heat meter entity reporting GJ
    #[arg(long)]
    pub meter_entity: Option<String>,
    #[arg(long, value_enum, default_value_t = MeterKindArg::Cumulative)]
    pub meter_kind: MeterKindArg,
    #[arg(long, default_value_t = 168, value_parser = hours_parser())]
    pub hours: i64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MeterKindArg {
    Cumulative,
    Resetting,
}

impl From<MeterKindArg> for MeterKind {
    fn from(value: MeterKindArg) -> Self {
        match value {
            MeterKindArg::Cumulative => MeterKind::Cumulative,
            MeterKindArg::Resetting => MeterKind::Resetting,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[arg(long, default_value_t = 168, value_parser = hours_parser())]
    pub hours: i64,
}

fn hours_parser() -> clap::builder::RangedI64ValueParser<i64> {
    clap::value_parser!(i64).range(1..=MAX_WINDOW_HOURS)
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "heattunectl", &mut io::stdout());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(&cli))
}

async fn execute(cli: &Cli) -> Result<()> {
    let context = AppContext::new(cli).await?;
    let now = Utc::now();

    match &cli.command {
        Commands::Cycles(args) => render(&context.cycles(args, now).await?, cli.format)?,
        Commands::Response(args) => render(&context.response(args, now).await?, cli.format)?,
        Commands::Recommend(args) => render(&context.recommend(args).await?, cli.format)?,
        Commands::Learn(args) => render(&context.learn(args, now).await?, cli.format)?,
        Commands::Plan(args) => render(&context.plan(args).await?, cli.format)?,
        Commands::Health => {
            let report = context.health(now).await?;
            render(&report, cli.format)?;
            if report.status == HealthStatus::Critical {
                return Err(AppError::Unhealthy(format!(
                    "{} issue(s), status {}",
                    report.issues.len(),
                    report.status
                )));
            }
        }
        Commands::Cost(args) => render(&context.cost(args, now).await?, cli.format)?,
        Commands::Report(args) => render(&context.report(args, now).await?, cli.format)?,
        Commands::Completions { .. } => {}
    }
    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

struct AppContext {
    config: Arc<HeatTuneConfig>,
    history: Arc<SqliteHistoryStore>,
    service: TuningService,
}

impl AppContext {
    async fn new(cli: &Cli) -> Result<Self> {
        let config = Arc::new(load_config(&cli.config)?);

        if let Some(parent) = cli.history_db.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let history = SqliteHistoryStore::builder()
            .path(&cli.history_db)
            .create_if_missing(true)
            .build()?;
        history.initialize()?;
        let history = Arc::new(history);

        let store = Arc::new(JsonLearningStore::open(&cli.learning_file).await?);
        debug!(
            target: "heattune",
            config = %cli.config.display(),
            history = %cli.history_db.display(),
            learning = %cli.learning_file.display(),
            zones = config.zones.len(),
            "context ready"
        );

        let service = TuningService::new(config.clone(), history.clone(), history.clone(), store);
        Ok(Self {
            config,
            history,
            service,
        })
    }

    fn zone_selection(&self, requested: &[String]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Ok(self.config.zone_ids());
        }
        for zone_id in requested {
            self.config.zone(zone_id)?;
        }
        Ok(requested.to_vec())
    }

    fn window(&self, hours: Option<i64>, now: DateTime<Utc>) -> Result<AnalysisWindow> {
        let hours = hours.unwrap_or(self.config.analysis.window_hours);
        AnalysisWindow::trailing_hours(now, hours).ok_or(AppError::Window(hours))
    }

    async fn cycles(&self, args: &CyclesArgs, now: DateTime<Utc>) -> Result<CycleTable> {
        let zones = self.zone_selection(args.zone.as_slice())?;
        let window = self.window(args.hours, now)?;
        let mut rows = Vec::with_capacity(zones.len());
        for zone_id in zones {
            let metrics = self.service.analyze_cycles_in(&zone_id, window).await?;
            let display_name = self.config.zone(&zone_id)?.display_name.clone();
            rows.push(CycleRow {
                zone_id,
                display_name,
                metrics,
            });
        }
        Ok(CycleTable {
            hours: window.length().num_hours(),
            rows,
        })
    }

    async fn response(&self, args: &ResponseArgs, now: DateTime<Utc>) -> Result<ResponseOutput> {
        let window = self.window(args.hours, now)?;
        let metrics = self
            .service
            .analyze_heating_response_in(&args.zone, window)
            .await?;
        Ok(ResponseOutput {
            zone_id: args.zone.clone(),
            min_analyzed_events: self.config.analysis.min_analyzed_events,
            metrics,
        })
    }

    async fn recommend(&self, args: &ZoneArgs) -> Result<RecommendationList> {
        let mut rows = Vec::new();
        for zone_id in self.zone_selection(&args.zones)? {
            rows.push(self.service.recommend_gains(&zone_id).await?);
        }
        Ok(RecommendationList { rows })
    }

    async fn learn(&self, args: &ZoneArgs, now: DateTime<Utc>) -> Result<LearningReport> {
        let zones = self.zone_selection(&args.zones)?;
        Ok(self.service.run_learning_at(&zones, now).await?)
    }

    async fn plan(&self, args: &ZoneArgs) -> Result<ChangePlan> {
        let zones = self.zone_selection(&args.zones)?;
        Ok(plan_gain_changes(&self.service, &zones).await?)
    }

    async fn health(&self, now: DateTime<Utc>) -> Result<HealthReport> {
        let window = self.window(None, now)?;
        let mut collected = Vec::new();
        for (zone_id, zone) in &self.config.zones {
            let cycles = self.service.analyze_cycles_in(zone_id, window).await?;
            let sensor_available = self.service.sensor_available(zone_id, now).await?;
            collected.push((zone_id.as_str(), zone.display_name.as_str(), cycles, sensor_available));
        }
        let inputs: Vec<ZoneHealthInput<'_>> = collected
            .into_iter()
            .map(|(zone_id, display_name, cycles, sensor_available)| ZoneHealthInput {
                zone_id,
                display_name,
                cycles,
                sensor_available,
            })
            .collect();
        Ok(heattune_core::health::evaluate(&inputs, &self.config.health))
    }

    async fn cost(&self, args: &CostArgs, now: DateTime<Utc>) -> Result<CostReport> {
        let window = self.window(Some(args.hours), now)?;
        let mut duties = Vec::new();
        for (zone_id, zone) in &self.config.zones {
            let duty = self
                .service
                .analyze_cycles_in(zone_id, window)
                .await?
                .map(|metrics| metrics.duty_cycle_percent)
                .unwrap_or(0.0);
            duties.push(ZoneDuty {
                zone_id,
                area_m2: zone.area_m2,
                duty_cycle_percent: duty,
            });
        }

        let metered = match &args.meter_entity {
            Some(entity) => {
                let samples = self
                    .history
                    .fetch_history(entity, window.start, window.end)
                    .await?;
                metered_gj(&samples, args.meter_kind.into())
            }
            None => None,
        };
        Ok(cost_report(
            &duties,
            metered,
            &self.config.energy,
            self.config.power.reference_w_m2,
        ))
    }

    async fn report(&self, args: &ReportArgs, now: DateTime<Utc>) -> Result<WeeklyReport> {
        let window = self.window(Some(args.hours), now)?;
        let mut weeks = Vec::new();
        for (zone_id, zone) in &self.config.zones {
            if let Some(cycles) = self.service.analyze_cycles_in(zone_id, window).await? {
                weeks.push(ZoneWeek {
                    zone_id,
                    zone,
                    cycles,
                });
            }
        }
        Ok(weekly_report(
            &weeks,
            &self.config.energy,
            self.config.health.short_cycle_min,
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct CycleTable {
    pub hours: i64,
    pub rows: Vec<CycleRow>,
}

#[derive(Debug, Serialize)]
pub struct CycleRow {
    pub zone_id: String,
    pub display_name: String,
    pub metrics: Option<CycleMetrics>,
}

#[derive(Debug, Serialize)]
pub struct ResponseOutput {
    pub zone_id: String,
    pub min_analyzed_events: usize,
    pub metrics: Option<ResponseMetrics>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationList {
    pub rows: Vec<Recommendation>,
}

impl DisplayFallback for CycleTable {
    fn display(&self) -> String {
        let mut lines = vec![format!("Heater cycles, last {} h", self.hours)];
        for row in &self.rows {
            match &row.metrics {
                Some(m) => lines.push(format!(
                    "{} | cycles={} | avg={:.1} min | duty={:.1}% | power={:.1} W/m²",
                    row.display_name,
                    m.cycle_count,
                    m.avg_cycle_minutes,
                    m.duty_cycle_percent,
                    m.power_w_m2
                )),
                None => lines.push(format!("{} | no history", row.display_name)),
            }
        }
        lines.join("\n")
    }
}

impl DisplayFallback for ResponseOutput {
    fn display(&self) -> String {
        let Some(m) = &self.metrics else {
            return format!("{}: no history in window", self.zone_id);
        };
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{}: {} events, {} analysed, {} excluded",
            self.zone_id, m.response_events, m.analyzed_events, m.excluded_events
        );
        let _ = writeln!(out, "  overshoot:    {:.2} °C", m.overshoot);
        let _ = writeln!(out, "  undershoot:   {:.2} °C", m.undershoot);
        let _ = writeln!(out, "  rise time:    {:.1} min", m.rise_time);
        let _ = writeln!(out, "  settling:     {:.1} min", m.settling_time);
        let _ = writeln!(out, "  oscillations: {:.1}", m.oscillation_count);
        match m.setpoint {
            Some(setpoint) => {
                let _ = write!(out, "  setpoint:     {setpoint:.1} °C (constant)");
            }
            None => {
                let _ = write!(out, "  setpoint:     variable, range {:.1} °C", m.setpoint_range);
            }
        }
        if !m.has_sufficient_data(self.min_analyzed_events) {
            let _ = write!(
                out,
                "\n  not enough analysed events to learn from (need {})",
                self.min_analyzed_events
            );
        }
        out
    }
}

impl DisplayFallback for RecommendationList {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for rec in &self.rows {
            lines.push(format!(
                "{} [{}] current {} -> recommended Kp={} Ki={} Kd={} ({})",
                rec.zone_id,
                rec.state,
                rec.current,
                rec.recommended.kp,
                rec.recommended.ki,
                rec.recommended.kd,
                rec.recommended.source
            ));
            for reason in &rec.recommended.rationale {
                lines.push(format!("  - {reason}"));
            }
        }
        lines.join("\n")
    }
}

impl DisplayFallback for LearningReport {
    fn display(&self) -> String {
        let list = |zones: &[String]| {
            if zones.is_empty() {
                "-".to_string()
            } else {
                zones.join(", ")
            }
        };
        format!(
            "Learning run {}\n  updated:      {}\n  insufficient: {}\n  not heating:  {}",
            self.run_id,
            list(&self.updated),
            list(&self.insufficient),
            list(&self.skipped)
        )
    }
}

impl DisplayFallback for ChangePlan {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        if self.is_empty() {
            lines.push("No gain changes".to_string());
        }
        for change in &self.changes {
            lines.push(format!(
                "{}: {} -> {} ({})",
                change.zone_id, change.old, change.new, change.source
            ));
        }
        if !self.unchanged.is_empty() {
            lines.push(format!("unchanged: {}", self.unchanged.join(", ")));
        }
        if !self.skipped.is_empty() {
            lines.push(format!("not heating: {}", self.skipped.join(", ")));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for HealthReport {
    fn display(&self) -> String {
        let mut lines = vec![format!("Status: {}", self.status)];
        for issue in &self.issues {
            lines.push(format!("[{}] {}", issue.severity, issue.message));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for CostReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Weekly energy ({}): {:.3} GJ / {:.1} kWh, cost {:.2} at {:.2} per GJ",
            self.source, self.gj, self.kwh, self.cost, self.gj_price
        )];
        for zone in &self.zones {
            lines.push(format!(
                "  {} | duty={:.1}% | {:.1} kWh",
                zone.zone_id, zone.duty_cycle_percent, zone.kwh_week
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for WeeklyReport {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for zone in &self.zones {
            lines.push(format!(
                "{} | {:.1} W/m² ({}) | cycle {:.1} min | duty {:.1}%",
                zone.display_name,
                zone.power_w_m2,
                zone.rating,
                zone.avg_cycle_minutes,
                zone.duty_cycle_percent
            ));
        }
        match self.system_average_w_m2 {
            Some(avg) => lines.push(format!("System average: {avg:.1} W/m²")),
            None => lines.push("System average: no data".to_string()),
        }
        if !self.short_cycling.is_empty() {
            lines.push(format!("Short cycling: {}", self.short_cycling.join(", ")));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use heattune_core::{
        ControllerState, PidGains, StateSample, ToleranceBand, TuningState,
    };
    use std::fs;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap()
    }

    fn seed_kitchen(store: &SqliteHistoryStore) {
        let mut heater = Vec::new();
        let mut temperature = Vec::new();
        for burst in 0..3 {
            let start = now() - Duration::hours(20) + Duration::hours(5 * burst);
            heater.push(StateSample::switch(start - Duration::minutes(60), false));
            heater.push(StateSample::switch(start, true));
            heater.push(StateSample::switch(start + Duration::minutes(40), false));
            let mut profile = vec![
                (0, 20.5),
                (10, 20.8),
                (20, 21.2),
                (30, 21.6),
                (40, 21.9),
                (50, 21.6),
                (60, 21.2),
            ];
            for minute in (70..=160).step_by(10) {
                profile.push((minute, 21.1));
            }
            temperature.extend(profile.into_iter().map(|(minute, value)| {
                StateSample::numeric(start + Duration::minutes(minute), value)
            }));
        }
        temperature.push(StateSample::numeric(now() - Duration::minutes(5), 21.0));
        store.record_samples("switch.kitchen_floor_heater", &heater).unwrap();
        store
            .record_samples("sensor.kitchen_temperature", &temperature)
            .unwrap();
        store
            .upsert_controller_state(
                "climate.kitchen",
                &ControllerState::heating(21.0)
                    .with_tolerances(ToleranceBand::symmetric(0.3))
                    .with_gains(PidGains::new(0.8, 0.012, 5.0)),
            )
            .unwrap();
    }

    async fn prepare_test_context() -> Result<(TempDir, AppContext)> {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let configs_dir = root.join("configs");
        fs::create_dir_all(&configs_dir).unwrap();
        fs::copy(
            "../configs/heattune.toml",
            configs_dir.join("heattune.toml"),
        )
        .unwrap();

        let data_dir = root.join("data");
        let history_db = data_dir.join("history.sqlite");
        let cli = Cli {
            config: configs_dir.join("heattune.toml"),
            history_db: history_db.clone(),
            learning_file: data_dir.join("learning.json"),
            format: OutputFormat::Json,
            verbose: false,
            command: Commands::Health,
        };
        let context = AppContext::new(&cli).await?;
        seed_kitchen(&context.history);
        Ok((temp, context))
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn zone_flags_accumulate() {
        let cli = Cli::try_parse_from([
            "heattunectl",
            "--format",
            "json",
            "learn",
            "--zone",
            "kitchen",
            "--zone",
            "bedroom",
        ])
        .unwrap();
        match cli.command {
            Commands::Learn(args) => assert_eq!(args.zones, vec!["kitchen", "bedroom"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn hour_flags_are_range_checked() {
        for hours in ["0", "-4", "9000000000000000"] {
            assert!(
                Cli::try_parse_from(["heattunectl", "cycles", "--hours", hours]).is_err(),
                "cycles --hours {hours}"
            );
            assert!(Cli::try_parse_from(["heattunectl", "report", "--hours", hours]).is_err());
            assert!(Cli::try_parse_from(["heattunectl", "cost", "--hours", hours]).is_err());
            assert!(Cli::try_parse_from([
                "heattunectl",
                "response",
                "--zone",
                "kitchen",
                "--hours",
                hours
            ])
            .is_err());
        }
        let cli = Cli::try_parse_from(["heattunectl", "report", "--hours", "720"]).unwrap();
        assert!(matches!(cli.command, Commands::Report(ReportArgs { hours: 720 })));
    }

    #[tokio::test]
    async fn out_of_range_window_is_an_error() {
        let (_temp, context) = prepare_test_context().await.unwrap();
        let err = context
            .cycles(
                &CyclesArgs {
                    zone: Some("kitchen".into()),
                    hours: Some(i64::MAX),
                },
                now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Window(hours) if hours == i64::MAX));
    }

    #[tokio::test]
    async fn cycles_cover_every_configured_zone() {
        let (_temp, context) = prepare_test_context().await.unwrap();
        let table = context
            .cycles(
                &CyclesArgs {
                    zone: None,
                    hours: Some(24),
                },
                now(),
            )
            .await
            .unwrap();
        assert_eq!(table.rows.len(), 6);
        let kitchen = table.rows.iter().find(|row| row.zone_id == "kitchen").unwrap();
        assert_eq!(kitchen.metrics.unwrap().cycle_count, 3);
        let bedroom = table.rows.iter().find(|row| row.zone_id == "bedroom").unwrap();
        assert!(bedroom.metrics.is_none());
        assert!(table.display().contains("Kitchen | cycles=3"));
    }

    #[tokio::test]
    async fn unknown_zone_is_rejected() {
        let (_temp, context) = prepare_test_context().await.unwrap();
        let err = context
            .recommend(&ZoneArgs {
                zones: vec!["garage".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn learn_then_plan_uses_adaptive_gains() {
        let (temp, context) = prepare_test_context().await.unwrap();
        let args = ZoneArgs {
            zones: vec!["kitchen".into(), "bedroom".into()],
        };
        let report = context.learn(&args, now()).await.unwrap();
        assert_eq!(report.updated, vec!["kitchen".to_string()]);
        assert_eq!(report.skipped, vec!["bedroom".to_string()]);
        assert!(temp.path().join("data/learning.json").exists());

        let recs = context.recommend(&args).await.unwrap();
        assert_eq!(recs.rows[0].state, TuningState::Adaptive);

        let plan = context.plan(&args).await.unwrap();
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].zone_id, "kitchen");
        assert!(plan.changes[0].new.kp < 0.8);
        assert!(plan.display().contains("kitchen:"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["updated"][0], "kitchen");
    }

    #[tokio::test]
    async fn health_flags_missing_sensors() {
        let (_temp, context) = prepare_test_context().await.unwrap();
        let report = context.health(now()).await.unwrap();
        assert_eq!(report.status, HealthStatus::Critical);
        assert!(report
            .issues
            .iter()
            .all(|issue| issue.zone_id != "kitchen"));
        assert!(report
            .issues
            .iter()
            .any(|issue| issue.zone_id == "bedroom" && issue.message.contains("sensor")));
    }

    #[tokio::test]
    async fn cost_and_report_use_duty_cycles() {
        let (_temp, context) = prepare_test_context().await.unwrap();
        let cost = context
            .cost(
                &CostArgs {
                    meter_entity: None,
                    meter_kind: MeterKindArg::Cumulative,
                    hours: 168,
                },
                now(),
            )
            .await
            .unwrap();
        assert_eq!(cost.zones.len(), 6);
        assert!(cost.estimated_kwh > 0.0);

        context
            .history
            .record_samples(
                "sensor.heat_meter",
                &[
                    StateSample::numeric(now() - Duration::hours(100), 310.2),
                    StateSample::numeric(now() - Duration::hours(1), 311.7),
                ],
            )
            .unwrap();
        let metered = context
            .cost(
                &CostArgs {
                    meter_entity: Some("sensor.heat_meter".into()),
                    meter_kind: MeterKindArg::Cumulative,
                    hours: 168,
                },
                now(),
            )
            .await
            .unwrap();
        assert_eq!(metered.source, heattune_core::CostSource::Meter);
        assert_eq!(metered.gj, 1.5);

        let report = context.report(&ReportArgs { hours: 168 }, now()).await.unwrap();
        assert_eq!(report.zones.len(), 1);
        assert_eq!(report.zones[0].zone_id, "kitchen");
        assert!(report.system_average_w_m2.is_some());
    }
}
