#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Training-table pipeline for the EMS prediction atlas.
//!
//! Sequences the three preprocessing stages — grid assignment
//! ([`ems_atlas_grid`]), densification ([`ems_atlas_densify`]), and
//! nearest-station weather matching ([`ems_atlas_spatial`]) — then selects
//! and types the final feature columns. The whole run is a pure function
//! of the input tables and a [`TrainingConfig`]; every accepted-data-loss
//! policy along the way is surfaced in the returned [`RunReport`].

pub mod io;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{Datelike as _, NaiveDate, Timelike as _};
use ems_atlas_densify::{CellEvent, DensifyError, densify};
use ems_atlas_grid::{GridAxes, GridError};
use ems_atlas_spatial::{MatchError, StationIndex};
use ems_atlas_training_models::{
    BoundsPolicy, EmergencyCall, RunReport, TrainingConfig, TrainingRow, WeatherReading,
};
use thiserror::Error;

/// Errors from the training pipeline and its I/O boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Grid construction or cell lookup failed.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// Densification failed.
    #[error(transparent)]
    Densify(#[from] DensifyError),

    /// Station-index construction failed.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// An input table is missing required columns.
    #[error("{table} is missing columns: {columns:?}")]
    MissingColumns {
        /// Which input table ("events" or "weather").
        table: String,
        /// Every missing column name.
        columns: Vec<String>,
    },

    /// A required input file does not exist.
    #[error("input file not found: {}", path.display())]
    InputNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A field value could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Builds the training table from event and weather inputs.
///
/// Stages: bounding-box policy → cell assignment → densification (per
/// calendar year when [`TrainingConfig::chunk_by_year`] is set, bounding
/// scaffold memory) → nearest-station weather matching by cell centroid →
/// feature selection. Output rows are fully typed with no missing values;
/// rows that could not be completed are counted in the report.
///
/// # Errors
///
/// Returns a [`PipelineError`] if the grid configuration is invalid, an
/// event is out of bounds under [`BoundsPolicy::Strict`], the event table
/// densifies to nothing, or the weather table has no stations.
pub fn build_training_table(
    events: &[EmergencyCall],
    weather: &[WeatherReading],
    config: &TrainingConfig,
) -> Result<(Vec<TrainingRow>, RunReport), PipelineError> {
    let axes = GridAxes::build(&config.grid)?;
    let index = StationIndex::build(weather)?;

    let mut report = RunReport {
        events_in: events.len(),
        ..RunReport::default()
    };

    let kept: Vec<&EmergencyCall> = match config.bounds_policy {
        BoundsPolicy::Strict => events.iter().collect(),
        BoundsPolicy::Filter => {
            let kept: Vec<&EmergencyCall> = events
                .iter()
                .filter(|event| axes.contains(event.latitude, event.longitude))
                .collect();
            report.out_of_bounds_filtered = events.len() - kept.len();
            if report.out_of_bounds_filtered > 0 {
                log::info!(
                    "Filtered {} of {} events outside the grid bounding box",
                    report.out_of_bounds_filtered,
                    events.len()
                );
            }
            kept
        }
    };

    let mut cell_events = Vec::with_capacity(kept.len());
    for event in kept {
        let cell = axes.assign_cell(event.latitude, event.longitude)?;
        cell_events.push(CellEvent {
            cell,
            occurred_at: event.occurred_at,
            covariates: event.covariates.clone(),
        });
    }

    let chunks: Vec<Vec<CellEvent>> = if config.chunk_by_year {
        // An empty event set yields zero year chunks; fail here so the
        // chunked path reports NoEvents just like the unchunked one.
        if cell_events.is_empty() {
            return Err(DensifyError::NoEvents.into());
        }
        let mut by_year: BTreeMap<i32, Vec<CellEvent>> = BTreeMap::new();
        for event in cell_events {
            by_year.entry(event.occurred_at.year()).or_default().push(event);
        }
        log::info!("Processing {} calendar-year chunks", by_year.len());
        by_year.into_values().collect()
    } else {
        vec![cell_events]
    };

    let mut rows_out: Vec<TrainingRow> = Vec::new();

    for chunk in &chunks {
        let (dense, densify_report) = densify(chunk, &config.covariates)?;
        report.scaffold_rows += densify_report.scaffold_rows;
        report.fill_dropped_rows += densify_report.dropped_rows;

        // Scaffold rows carry no raw coordinates; the cell centroid is the
        // representative point for station matching.
        let queries: Vec<(f64, f64, NaiveDate)> = dense
            .iter()
            .map(|row| {
                let (lat, lon) = axes.cell_centroid(row.cell)?;
                Ok((lat, lon, row.hour.date()))
            })
            .collect::<Result<_, GridError>>()?;

        let (matches, match_report) = index.match_readings(&queries);
        report.weather_dropped_rows += match_report.dropped_rows;

        for (row, reading) in dense.iter().zip(matches) {
            // Inner join: no reading for this row's date at its matched
            // station means the row is dropped.
            let Some(reading) = reading else { continue };

            rows_out.push(TrainingRow {
                cell: row.cell,
                year: row.hour.year(),
                month: row.hour.month(),
                day: row.hour.day(),
                hour: row.hour.hour(),
                features: config
                    .features
                    .iter()
                    .map(|feature| feature.value(reading))
                    .collect(),
                emergency_count: row.emergency_count,
            });
        }
    }

    report.rows_out = rows_out.len();
    log::info!(
        "Training table built: {} events in, {} rows out ({} scaffold, {} fill-dropped, {} weather-dropped)",
        report.events_in,
        report.rows_out,
        report.scaffold_rows,
        report.fill_dropped_rows,
        report.weather_dropped_rows
    );

    Ok((rows_out, report))
}
