use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};

use caravan_forcing::analysis::climate_indices::{self, ClimateIndices};
use caravan_forcing::config::{self, CaravanConfig};
use caravan_forcing::gauges::{self, GaugeLocation};
use caravan_forcing::ingest::era5land::RegionFileSource;
use caravan_forcing::ingest::streamflow::{self, StreamflowClient};
use caravan_forcing::logging::{self, DataSource};
use caravan_forcing::output::{self, GaugeMetadata};
use caravan_forcing::pipeline;
use caravan_forcing::transform::timezone::TimezoneResolver;
use caravan_forcing::validate;

/// Caravan dataset builder for Victorian gauges.
#[derive(Parser)]
#[command(name = "caravan", version, about = "Build Caravan streamflow, forcing and attribute tables")]
struct Cli {
    /// Increase verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to TOML configuration file (default: $CARAVAN_CONFIG or caravan.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Append log output to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch daily streamflow for every gauge and write gauge metadata.
    Streamflow,
    /// Aggregate ERA5-Land hourly data to daily forcing and merge with streamflow.
    Forcing {
        /// Process only this gauge id.
        #[arg(short, long)]
        gauge: Option<String>,
    },
    /// Compute climate indices from the merged daily tables.
    Attributes,
    /// Check gauge ids and that every output table is present.
    Validate,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Error: cannot open log file: {e}");
        process::exit(1);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let path = config::resolve_path(cli.config.as_deref());
    let config = CaravanConfig::load(&path).with_context(|| format!("loading {}", path.display()))?;

    match cli.command {
        Command::Streamflow => run_streamflow(&config),
        Command::Forcing { gauge } => run_forcing(&config, gauge.as_deref()),
        Command::Attributes => run_attributes(&config),
        Command::Validate => run_validate(&config),
    }
}

fn run_streamflow(config: &CaravanConfig) -> Result<()> {
    let settings = &config.settings;
    let client = StreamflowClient::new(settings).context("building HTTP client")?;
    let today = Utc::now().date_naive();
    let mut metadata = Vec::new();

    for gauge in &config.gauges {
        logging::info(DataSource::Pipeline, Some(&gauge.gauge_id), &format!("Fetching streamflow for {}", gauge.name));
        let series = streamflow::fetch_streamflow(&client, gauge, today);

        let Some(meta) = GaugeMetadata::from_streamflow(gauge, &series, settings) else {
            logging::warn(DataSource::Pipeline, Some(&gauge.gauge_id), "No streamflow retrieved");
            continue;
        };

        let path = settings.timeseries_path(&gauge.gauge_id);
        output::write_streamflow_csv(&path, &series).with_context(|| format!("writing {}", path.display()))?;
        logging::info(
            DataSource::Filesystem,
            Some(&gauge.gauge_id),
            &format!("{} days -> {}", series.len(), path.display()),
        );
        metadata.push(meta);
    }

    logging::log_backfill_summary(DataSource::Pipeline, config.gauges.len(), metadata.len(), config.gauges.len() - metadata.len());
    if !metadata.is_empty() {
        let path = settings.attributes_other_path();
        output::write_gauge_metadata(&path, &metadata).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn selected_gauges<'a>(config: &'a CaravanConfig, only: Option<&str>) -> Result<Vec<&'a GaugeLocation>> {
    match only {
        Some(id) => gauges::find_gauge(&config.gauges, id)
            .map(|g| vec![g])
            .with_context(|| format!("gauge '{}' is not in the config", id)),
        None => Ok(config.gauges.iter().collect()),
    }
}

fn run_forcing(config: &CaravanConfig, only: Option<&str>) -> Result<()> {
    let settings = &config.settings;
    let source = RegionFileSource::new(&settings.era5_dir);
    let resolver = TimezoneResolver::new();
    let end_year = settings.era5_end_year.unwrap_or_else(|| Utc::now().year());
    let years = settings.era5_start_year..=end_year;

    let gauges = selected_gauges(config, only)?;
    let mut failed = 0;
    for gauge in &gauges {
        if let Err(e) = forcing_for_gauge(settings, &source, &resolver, gauge, years.clone()) {
            failed += 1;
            logging::error(DataSource::Pipeline, Some(&gauge.gauge_id), &format!("{e:#}"));
        }
    }

    logging::log_backfill_summary(DataSource::Pipeline, gauges.len(), gauges.len() - failed, failed);
    Ok(())
}

fn forcing_for_gauge(
    settings: &config::Settings,
    source: &RegionFileSource,
    resolver: &TimezoneResolver,
    gauge: &GaugeLocation,
    years: std::ops::RangeInclusive<i32>,
) -> Result<()> {
    let forcing = pipeline::run_gauge(source, resolver, gauge, years).context("ERA5-Land pipeline")?;

    let path = settings.timeseries_path(&gauge.gauge_id);
    let flow = output::read_streamflow_csv(&path).with_context(|| format!("reading {}", path.display()))?;
    let rows = pipeline::merge_streamflow(&forcing.days, &flow);

    output::write_daily_table(&path, &rows).with_context(|| format!("writing {}", path.display()))?;
    logging::info(
        DataSource::Filesystem,
        Some(&gauge.gauge_id),
        &format!("{} rows ({} with streamflow) -> {}", rows.len(), flow.len(), path.display()),
    );
    Ok(())
}

fn indices_for_gauge(config: &CaravanConfig, gauge: &GaugeLocation, path: &Path) -> Result<Option<ClimateIndices>> {
    let rows = output::read_daily_table(path).with_context(|| format!("reading {}", path.display()))?;
    let settings = &config.settings;
    Ok(climate_indices::calculate_climate_indices(
        &gauge.gauge_id,
        &rows,
        settings.caravan_start,
        settings.caravan_end,
    ))
}

fn run_attributes(config: &CaravanConfig) -> Result<()> {
    let settings = &config.settings;
    let mut results = Vec::new();

    for gauge in &config.gauges {
        let id = gauge.gauge_id.as_str();
        let path = settings.timeseries_path(id);
        if !path.exists() {
            logging::warn(DataSource::Filesystem, Some(id), &format!("No timeseries at {}", path.display()));
            continue;
        }

        match indices_for_gauge(config, gauge, &path)? {
            Some(indices) => {
                if indices.pet_mean_era5_land < 0.0 {
                    logging::warn(
                        DataSource::Pipeline,
                        Some(id),
                        &format!("pet_mean_ERA5_LAND is negative ({:.3} mm/d)", indices.pet_mean_era5_land),
                    );
                }
                logging::info(
                    DataSource::Pipeline,
                    Some(id),
                    &format!("p_mean={:.3} mm/d, aridity_FAO_PM={:?}", indices.p_mean, indices.aridity_fao_pm),
                );
                results.push(indices);
            }
            None => logging::warn(
                DataSource::Pipeline,
                Some(id),
                &format!("No data in {}..{}", settings.caravan_start, settings.caravan_end),
            ),
        }
    }

    if results.is_empty() {
        logging::warn(DataSource::Pipeline, None, "No gauge had data in the Caravan period");
        return Ok(());
    }
    let path = settings.attributes_caravan_path();
    output::write_climate_indices(&path, &results).with_context(|| format!("writing {}", path.display()))?;
    logging::info(DataSource::Filesystem, None, &format!("{} gauges -> {}", results.len(), path.display()));
    Ok(())
}

fn run_validate(config: &CaravanConfig) -> Result<()> {
    let report = validate::validate_submission(&config.settings, &config.gauges);
    validate::log_report(&report);
    if !report.is_ready() {
        bail!("{} check(s) did not pass", report.failures());
    }
    logging::info(DataSource::Pipeline, None, "All checks passed");
    Ok(())
}
