// Command-line front end.
//
// Loads the gold tables once, applies the filters given on the command line
// and prints every view as a markdown table. Optional flags export the same
// views as CSV files and the full render model as JSON.
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rail_punctuality::loader::{load_store, sources_for, LoadReport};
use rail_punctuality::manifest::ManifestConfig;
use rail_punctuality::metrics::MetricMode;
use rail_punctuality::output::{preview_table, preview_table_rows, write_json, ReportTables};
use rail_punctuality::pipeline::DataStatus;
use rail_punctuality::reports::HistogramMode;
use rail_punctuality::state::AppState;
use rail_punctuality::types::StationOptionRow;
use rail_punctuality::util::{format_int, format_number};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rail-punctuality")]
#[command(about = "Filter and aggregate Italian train punctuality gold tables", long_about = None)]
struct Cli {
    /// Directory or http(s) base URL holding the gold files (repeatable, tried in order)
    #[arg(short, long = "source", global = true, value_name = "DIR_OR_URL")]
    sources: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print KPIs, series, histogram, leaderboards and map points
    Report(ReportArgs),
    /// Search the station list used by the origin/destination selectors
    Stations {
        /// Name or code fragment; accents and case are ignored
        query: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// List the years and categories present in the data
    Options,
}

#[derive(Clone, Copy, ValueEnum)]
enum HistogramArg {
    Count,
    Percent,
}

impl From<HistogramArg> for HistogramMode {
    fn from(a: HistogramArg) -> Self {
        match a {
            HistogramArg::Count => HistogramMode::Count,
            HistogramArg::Percent => HistogramMode::Percent,
        }
    }
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long)]
    year: Option<String>,

    /// Train category code (e.g. REG, FR)
    #[arg(long)]
    category: Option<String>,

    /// Origin station code; every alias of the station matches
    #[arg(long)]
    origin: Option<String>,

    #[arg(long)]
    destination: Option<String>,

    /// First month, YYYY-MM (bounds may be given in either order)
    #[arg(long)]
    month_from: Option<String>,

    #[arg(long)]
    month_to: Option<String>,

    /// Enabled day types (feriale, sabato, festivo); all when omitted
    #[arg(long, value_delimiter = ',')]
    day_types: Vec<String>,

    /// Enabled time slots (notte, mattina, giorno, pomeriggio, sera); all when omitted
    #[arg(long, value_delimiter = ',')]
    time_slots: Vec<String>,

    #[arg(short, long, default_value = "pct_ritardo")]
    metric: MetricMode,

    /// Leaderboard length
    #[arg(short, long, default_value_t = 10)]
    top: usize,

    #[arg(long, value_enum, default_value_t = HistogramArg::Count)]
    histogram: HistogramArg,

    /// Rows shown per preview table
    #[arg(long, default_value_t = 12)]
    preview: usize,

    /// Write the full render model as JSON
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Write one CSV per view into this directory
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
}

fn print_load_summary(report: &LoadReport, manifest: &ManifestConfig) {
    match (&report.manifest_location, manifest.build_stamp()) {
        (None, _) => println!("Build: manifest non trovato, carico i CSV disponibili"),
        (Some(_), Some(stamp)) => println!("Build: {}", stamp),
        (Some(_), None) => println!("Build: n/d"),
    }
    let missing = report.missing();
    println!(
        "Loaded {} rows from {} files ({} stations, {} capitals).",
        format_int(report.total_rows() as u64),
        report.tables.len() - missing.len(),
        format_int(report.stations as u64),
        format_int(report.capitals as u64)
    );
    if !missing.is_empty() {
        println!("Note: {} files not found, treated as empty.", missing.len());
    }
}

fn run_report(app: &mut AppState, args: ReportArgs) -> Result<()> {
    app.set_year(args.year.as_deref());
    app.set_category(args.category.as_deref());
    app.set_origin(args.origin.as_deref());
    app.set_destination(args.destination.as_deref());
    app.set_months(args.month_from.as_deref(), args.month_to.as_deref());
    if !args.day_types.is_empty() {
        app.set_day_types(&args.day_types);
    }
    if !args.time_slots.is_empty() {
        app.set_time_slots(&args.time_slots);
    }
    app.set_metric(args.metric);
    app.set_top_n(args.top);
    app.set_histogram_mode(args.histogram.into());

    let model = app.render();
    if model.status == DataStatus::NoValidData {
        println!("No valid data found.");
    }
    let diag = &model.diagnostics;
    if diag.segmentation_fallback {
        warn!(
            "day-type/time-slot filter requested but no segmented table is available; \
             showing unsegmented data"
        );
    }
    if diag.segments.unrecognized_day_types + diag.segments.unrecognized_time_slots > 0 {
        info!(
            day_types = diag.segments.unrecognized_day_types,
            time_slots = diag.segments.unrecognized_time_slots,
            "rows with unrecognized segmentation values kept"
        );
    }

    let tables = ReportTables::from_model(&model, app.options.histogram_mode);
    let n = args.preview;
    let metric_note = format!("metric: {}", model.metric.label());

    preview_table("KPI", None, &tables.kpi, 1);
    preview_table("Monthly series", Some(&metric_note), &tables.monthly, n);
    preview_table("Daily series", Some(&metric_note), &tables.daily, n);
    let threshold_note = app.store.manifest.threshold_note();
    preview_table(
        "Arrival delay distribution",
        Some(&threshold_note),
        &tables.histogram,
        n,
    );
    let min_trains = format!(
        "{}, at least {} trains",
        metric_note,
        format_number(app.store.manifest.leaderboard_min_trains, 0)
    );
    preview_table("Stations", Some(&min_trains), &tables.stations, n);
    preview_table("Provincial capitals", Some(&min_trains), &tables.cities, n);
    preview_table("Routes", Some(&min_trains), &tables.od_pairs, n);
    preview_table("Map points", Some(&metric_note), &tables.map, n);
    if model.map.missing_coords > 0 {
        println!(
            "({} stations left off the map for missing coordinates)\n",
            model.map.missing_coords
        );
    }

    if let Some(dir) = &args.out_dir {
        let written = tables.export(dir)?;
        println!("(Full tables exported to {})\n", dir.display());
        info!(files = written.len(), "csv export done");
    }
    if let Some(path) = &args.json {
        write_json(path, &model)?;
        println!("(Render model written to {})\n", path.display());
    }
    Ok(())
}

fn run_stations(app: &AppState, query: Option<&str>, limit: usize) {
    let hits = app.search_stations(query.unwrap_or(""));
    let rows: Vec<StationOptionRow> = hits.iter().map(|it| it.to_row()).collect();
    println!("{} stations match.\n", format_int(rows.len() as u64));
    preview_table_rows(&rows, limit);
}

fn run_options(app: &AppState) {
    let o = app.option_lists();
    println!("Years: {}", o.years.join(", "));
    println!("Categories: {}", o.categories.join(", "));
    println!(
        "Stations: {} origins, {} destinations",
        format_int(o.origins.len() as u64),
        format_int(o.destinations.len() as u64)
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let sources = sources_for(&cli.sources);
    let (store, load_report) = load_store(&sources).await;
    print_load_summary(&load_report, &store.manifest);
    let mut app = AppState::new(store);

    match cli.command {
        Commands::Report(args) => run_report(&mut app, args)?,
        Commands::Stations { query, limit } => run_stations(&app, query.as_deref(), limit),
        Commands::Options => run_options(&app),
    }
    Ok(())
}
