#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared record and configuration types for the training pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use ems_atlas_grid::{CellId, GridConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single emergency-call event: a timestamped point plus optional
/// covariate values aligned to the run's [`CovariateSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyCall {
    /// When the call was received.
    pub occurred_at: NaiveDateTime,
    /// Latitude of the call location, in degrees.
    pub latitude: f64,
    /// Longitude of the call location, in degrees.
    pub longitude: f64,
    /// Covariate values in schema order, or `None` when the schema is empty.
    pub covariates: Option<Vec<f64>>,
}

/// One weather station reading for one calendar day.
///
/// A station is the distinct `(latitude, longitude)` pair; measurement
/// field names follow the NOAA export columns the original data used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// Calendar day of the reading.
    pub date: NaiveDate,
    /// Station latitude, in degrees.
    pub latitude: f64,
    /// Station longitude, in degrees.
    pub longitude: f64,
    /// Daily maximum temperature, degrees Fahrenheit.
    pub fmax: f64,
    /// Daily minimum temperature, degrees Fahrenheit.
    pub fmin: f64,
    /// Precipitation, inches.
    pub prcp_in: f64,
    /// Snowfall, inches.
    pub snow_in: f64,
    /// Snow depth, inches.
    pub snwd_in: f64,
}

/// One fully-typed output row of the training table.
///
/// Calendar and count fields are integers, weather features floats, and no
/// field is ever missing: rows that could not be completed are dropped
/// upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    /// Grid cell id.
    pub cell: CellId,
    /// Calendar year of the hour bucket.
    pub year: i32,
    /// Calendar month (1-12).
    pub month: u32,
    /// Calendar day of month (1-31).
    pub day: u32,
    /// Hour of day (0-23).
    pub hour: u32,
    /// Selected weather feature values, in [`TrainingConfig::features`]
    /// order.
    pub features: Vec<f64>,
    /// Number of emergency calls in this (cell, hour).
    pub emergency_count: u32,
}

/// The five daily weather measurements available for training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeatherFeature {
    /// Daily maximum temperature (`fmax`).
    Tmax,
    /// Daily minimum temperature (`fmin`).
    Tmin,
    /// Precipitation (`prcp_in`).
    Precipitation,
    /// Snowfall (`snow_in`).
    Snowfall,
    /// Snow depth (`snwd_in`).
    SnowDepth,
}

impl WeatherFeature {
    /// All features, in canonical column order.
    pub const ALL: &[Self] = &[
        Self::Tmax,
        Self::Tmin,
        Self::Precipitation,
        Self::Snowfall,
        Self::SnowDepth,
    ];

    /// The column name used in weather input and training output tables.
    #[must_use]
    pub const fn column_name(self) -> &'static str {
        match self {
            Self::Tmax => "fmax",
            Self::Tmin => "fmin",
            Self::Precipitation => "prcp_in",
            Self::Snowfall => "snow_in",
            Self::SnowDepth => "snwd_in",
        }
    }

    /// Extracts this feature's value from a reading.
    #[must_use]
    pub const fn value(self, reading: &WeatherReading) -> f64 {
        match self {
            Self::Tmax => reading.fmax,
            Self::Tmin => reading.fmin,
            Self::Precipitation => reading.prcp_in,
            Self::Snowfall => reading.snow_in,
            Self::SnowDepth => reading.snwd_in,
        }
    }
}

impl fmt::Display for WeatherFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for WeatherFeature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.column_name() == s)
            .ok_or_else(|| {
                format!(
                    "unknown weather feature '{s}', expected one of: {}",
                    Self::ALL
                        .iter()
                        .map(|f| f.column_name())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// Validation error for covariate vectors against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CovariateError {
    /// An event's covariate vector length disagrees with the schema.
    #[error("event covariate vector has {found} values, schema expects {expected}")]
    Arity {
        /// Schema column count.
        expected: usize,
        /// Event vector length.
        found: usize,
    },
}

/// Explicit, ordered covariate column schema.
///
/// Replaces dynamic column discovery: only the columns named here are read
/// from the event table and carried through densification, and every
/// event's covariate vector must match this length exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CovariateSchema {
    columns: Vec<String>,
}

impl CovariateSchema {
    /// Creates a schema from ordered column names.
    #[must_use]
    pub const fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// The empty schema: no covariates are read or filled.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Ordered covariate column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of covariate columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Validates one event's covariate vector against this schema.
    ///
    /// `None` is only valid for the empty schema.
    ///
    /// # Errors
    ///
    /// Returns [`CovariateError::Arity`] on any length mismatch.
    pub fn validate(&self, covariates: Option<&[f64]>) -> Result<(), CovariateError> {
        let found = covariates.map_or(0, <[f64]>::len);
        if found == self.len() {
            Ok(())
        } else {
            Err(CovariateError::Arity {
                expected: self.len(),
                found,
            })
        }
    }
}

/// How the pipeline treats events outside the configured bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundsPolicy {
    /// An out-of-bounds event aborts the run with a bounds error.
    #[default]
    Strict,
    /// Events outside the bounding box are filtered out before cell
    /// assignment; the filtered count is reported.
    Filter,
}

/// Full configuration for one training-table run.
///
/// An explicit configuration object (rather than module-level constants)
/// so multiple grid/time configurations can coexist in one process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Bounding box and grid resolution.
    pub grid: GridConfig,
    /// Covariate columns carried through densification.
    pub covariates: CovariateSchema,
    /// Weather features retained in the output, in column order.
    pub features: Vec<WeatherFeature>,
    /// Treatment of events outside the bounding box.
    pub bounds_policy: BoundsPolicy,
    /// Process events one calendar year at a time to bound scaffold
    /// memory.
    pub chunk_by_year: bool,
}

impl TrainingConfig {
    /// A configuration with all weather features, no covariates, strict
    /// bounds, and no chunking.
    #[must_use]
    pub fn new(grid: GridConfig) -> Self {
        Self {
            grid,
            covariates: CovariateSchema::empty(),
            features: WeatherFeature::ALL.to_vec(),
            bounds_policy: BoundsPolicy::Strict,
            chunk_by_year: false,
        }
    }
}

/// Row-count accounting for one run.
///
/// Every accepted-data-loss policy in the pipeline is observable here:
/// bounds filtering, covariate-fill drops, and weather-coverage drops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Events read from the input table.
    pub events_in: usize,
    /// Events removed by [`BoundsPolicy::Filter`].
    pub out_of_bounds_filtered: usize,
    /// Scaffold rows produced by densification (before any drop).
    pub scaffold_rows: usize,
    /// Scaffold rows dropped for unresolved covariates.
    pub fill_dropped_rows: usize,
    /// Rows dropped because the matched station had no reading for their
    /// date.
    pub weather_dropped_rows: usize,
    /// Final training rows written.
    pub rows_out: usize,
}

impl RunReport {
    /// Sums two reports, for chunked runs.
    #[must_use]
    pub const fn merged(self, other: Self) -> Self {
        Self {
            events_in: self.events_in + other.events_in,
            out_of_bounds_filtered: self.out_of_bounds_filtered + other.out_of_bounds_filtered,
            scaffold_rows: self.scaffold_rows + other.scaffold_rows,
            fill_dropped_rows: self.fill_dropped_rows + other.fill_dropped_rows,
            weather_dropped_rows: self.weather_dropped_rows + other.weather_dropped_rows,
            rows_out: self.rows_out + other.rows_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_round_trips_through_column_name() {
        for feature in WeatherFeature::ALL {
            let parsed: WeatherFeature = feature.column_name().parse().unwrap();
            assert_eq!(parsed, *feature);
        }
    }

    #[test]
    fn rejects_unknown_feature_name() {
        assert!("tavg".parse::<WeatherFeature>().is_err());
    }

    #[test]
    fn empty_schema_accepts_missing_covariates() {
        let schema = CovariateSchema::empty();
        assert!(schema.validate(None).is_ok());
        assert!(schema.validate(Some(&[1.0])).is_err());
    }

    #[test]
    fn schema_validates_arity() {
        let schema = CovariateSchema::new(vec!["fmax".to_owned(), "fmin".to_owned()]);
        assert!(schema.validate(Some(&[70.0, 50.0])).is_ok());
        assert_eq!(
            schema.validate(Some(&[70.0])),
            Err(CovariateError::Arity {
                expected: 2,
                found: 1
            })
        );
        assert!(schema.validate(None).is_err());
    }

    #[test]
    fn merged_reports_sum_fieldwise() {
        let a = RunReport {
            events_in: 10,
            out_of_bounds_filtered: 1,
            scaffold_rows: 100,
            fill_dropped_rows: 5,
            weather_dropped_rows: 2,
            rows_out: 93,
        };
        let b = RunReport {
            events_in: 3,
            ..RunReport::default()
        };
        assert_eq!(a.merged(b).events_in, 13);
        assert_eq!(a.merged(b).rows_out, 93);
    }
}
