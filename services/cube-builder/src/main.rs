//! Velocity cube builder.
//!
//! Searches ITS_LIVE for image-pair granules over a region (or lists a local
//! directory), removes duplicate observations and appends the rest to a
//! Zarr cube batch by batch.

mod config;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use cube_assembly::{CubeBuilder, GranuleSearch, ItsLiveSearchClient, LocalDirectorySource};
use cube_common::EpsgCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use config::{BuilderConfig, Overrides};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Parser, Debug)]
#[command(name = "cube-builder")]
#[command(about = "Assemble ITS_LIVE velocity granules into a Zarr datacube")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "cube-builder.yaml")]
    config: PathBuf,

    /// Output Zarr store
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Read granules from a local directory instead of the search API
    #[arg(long)]
    local_path: Option<PathBuf>,

    /// Target projection (EPSG code)
    #[arg(long)]
    projection: Option<EpsgCode>,

    /// Region as "min_x,min_y,max_x,max_y" in the target projection
    #[arg(long, conflicts_with_all = ["center_x", "center_y", "half_size"])]
    bbox: Option<String>,

    /// Region center x in the target projection
    #[arg(long, requires_all = ["center_y", "half_size"])]
    center_x: Option<f64>,

    /// Region center y in the target projection
    #[arg(long, requires_all = ["center_x", "half_size"])]
    center_y: Option<f64>,

    /// Half the side of the square region, in projection units
    #[arg(long, requires_all = ["center_x", "center_y"])]
    half_size: Option<f64>,

    /// Granules per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Concurrent granule reads per batch
    #[arg(short, long)]
    workers: Option<usize>,

    /// Search start date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Search end date (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Minimum percentage of valid pixels in a granule
    #[arg(long)]
    percent_valid: Option<u32>,

    /// Extra points per region side when reprojecting the search polygon
    #[arg(long)]
    points_per_side: Option<usize>,

    /// Examine only the first N search results
    #[arg(long)]
    num_granules: Option<usize>,

    /// Skip this many granules and append to the existing cube
    #[arg(long)]
    start_offset: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,
}

impl Args {
    fn overrides(&self) -> Overrides {
        let center = match (self.center_x, self.center_y, self.half_size) {
            (Some(x), Some(y), Some(half)) => Some((x, y, half)),
            _ => None,
        };
        Overrides {
            output: self.output.clone(),
            local_path: self.local_path.clone(),
            projection: self.projection,
            bbox: self.bbox.clone(),
            center,
            batch_size: self.batch_size,
            workers: self.workers,
            num_granules: self.num_granules,
            start_offset: self.start_offset,
            start: self.start,
            end: self.end,
            percent_valid: self.percent_valid,
            points_per_side: self.points_per_side,
        }
    }
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;

    info!("Starting cube builder");

    let mut config = BuilderConfig::load(&args.config)?;
    config.apply(args.overrides())?;
    config.validate()?;
    info!(
        output = %config.output.display(),
        projection = %config.cube.projection,
        batch_size = config.cube.batch_size,
        workers = config.cube.workers,
        start_offset = config.cube.start_offset,
        "Loaded configuration"
    );

    let builder = CubeBuilder::new(config.cube.clone(), config.store.clone(), &config.output)?;
    let search: Box<dyn GranuleSearch> = match &config.local_path {
        Some(path) => Box::new(LocalDirectorySource::new(path)),
        None => Box::new(ItsLiveSearchClient::new(config.search.clone())?),
    };

    match builder
        .build(search.as_ref(), &config.search, &config.storage)
        .await
    {
        Ok(summary) => {
            println!("{}", summary);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Cube run failed");
            Err(e.into())
        }
    }
}
