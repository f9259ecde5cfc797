#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! CLI for the EMS prediction atlas preprocessing pipeline.
//!
//! `training-data` runs the full grid → densify → weather-match pipeline
//! over CSV inputs and writes the training table; `grid-geojson` exports
//! the polygon-per-cell grid geometry for map rendering.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ems_atlas_grid::{GridAxes, GridConfig};
use ems_atlas_training::io;
use ems_atlas_training_models::{
    BoundsPolicy, CovariateSchema, TrainingConfig, WeatherFeature,
};

#[derive(Parser)]
#[command(name = "ems-atlas", about = "EMS training data preprocessing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Bounding box and resolution flags shared by both subcommands.
#[derive(Args)]
struct GridArgs {
    /// Southern edge of the grid bounding box, in degrees
    #[arg(long, allow_hyphen_values = true)]
    min_lat: f64,

    /// Northern edge of the grid bounding box, in degrees
    #[arg(long, allow_hyphen_values = true)]
    max_lat: f64,

    /// Western edge of the grid bounding box, in degrees
    #[arg(long, allow_hyphen_values = true)]
    min_lon: f64,

    /// Eastern edge of the grid bounding box, in degrees
    #[arg(long, allow_hyphen_values = true)]
    max_lon: f64,

    /// Number of latitude (row) cells
    #[arg(long, default_value_t = 16)]
    lat_cells: u32,

    /// Number of longitude (column) cells
    #[arg(long, default_value_t = 16)]
    lon_cells: u32,
}

impl GridArgs {
    const fn to_config(&self) -> GridConfig {
        GridConfig {
            min_lat: self.min_lat,
            max_lat: self.max_lat,
            min_lon: self.min_lon,
            max_lon: self.max_lon,
            n_lat_cells: self.lat_cells,
            n_lon_cells: self.lon_cells,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the training table from event and weather CSVs
    TrainingData {
        #[command(flatten)]
        grid: GridArgs,

        /// Event table CSV (latitude, longitude, occurred_at, covariates)
        #[arg(long)]
        events: PathBuf,

        /// Weather table CSV (date, station coords, daily measurements)
        #[arg(long)]
        weather: PathBuf,

        /// Output CSV path for the training table
        #[arg(long)]
        output: PathBuf,

        /// Weather features to retain, comma-separated
        /// (fmax, fmin, prcp_in, snow_in, snwd_in)
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<WeatherFeature>>,

        /// Event covariate columns to carry through densification,
        /// comma-separated
        #[arg(long, value_delimiter = ',')]
        covariates: Option<Vec<String>>,

        /// Drop events outside the bounding box instead of failing
        #[arg(long)]
        filter_out_of_bounds: bool,

        /// Process events one calendar year at a time to bound memory
        #[arg(long)]
        chunk_by_year: bool,
    },
    /// Export the grid geometry as GeoJSON
    GridGeojson {
        #[command(flatten)]
        grid: GridArgs,

        /// Output GeoJSON path
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::TrainingData {
            grid,
            events,
            weather,
            output,
            features,
            covariates,
            filter_out_of_bounds,
            chunk_by_year,
        } => {
            let mut config = TrainingConfig::new(grid.to_config());
            if let Some(features) = features {
                config.features = features;
            }
            if let Some(columns) = covariates {
                config.covariates = CovariateSchema::new(columns);
            }
            if filter_out_of_bounds {
                config.bounds_policy = BoundsPolicy::Filter;
            }
            config.chunk_by_year = chunk_by_year;

            let event_rows = io::read_events(&events, &config.covariates)?;
            let weather_rows = io::read_weather(&weather)?;

            let (rows, report) =
                ems_atlas_training::build_training_table(&event_rows, &weather_rows, &config)?;

            io::write_training_csv(&output, &rows, &config.features)?;

            log::info!(
                "Done: {} events -> {} training rows ({} filtered out of bounds, \
                 {} dropped in covariate fill, {} dropped for weather coverage)",
                report.events_in,
                report.rows_out,
                report.out_of_bounds_filtered,
                report.fill_dropped_rows,
                report.weather_dropped_rows
            );
        }
        Commands::GridGeojson { grid, output } => {
            let axes = GridAxes::build(&grid.to_config())?;
            io::write_grid_geojson(&output, &axes)?;
        }
    }

    Ok(())
}
