#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Expands sparse cell-assigned events onto a dense (cell, hour) scaffold.
//!
//! Every (observed cell, hour) combination in the event time range becomes
//! a row, whether or not a call occurred: rows with no matching events get
//! `emergency_count = 0`, so "nothing happened here" is represented
//! explicitly for supervised learning. True event counts are conserved
//! (the scaffold's counts always sum to the input event count), and
//! covariate gaps are filled from the nearest known value in the same cell
//! and calendar day, forward first, then backward.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike as _};
use ems_atlas_grid::CellId;
use ems_atlas_training_models::{CovariateError, CovariateSchema};
use thiserror::Error;

/// An emergency event that has already been assigned to a grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEvent {
    /// Grid cell containing the event location.
    pub cell: CellId,
    /// Event timestamp (floored to the hour during densification).
    pub occurred_at: NaiveDateTime,
    /// Covariate values in schema order, or `None` for the empty schema.
    pub covariates: Option<Vec<f64>>,
}

/// One row of the dense (cell, hour) table.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseRow {
    /// Grid cell id.
    pub cell: CellId,
    /// Hour bucket (minutes and seconds are zero).
    pub hour: NaiveDateTime,
    /// Number of events in this (cell, hour).
    pub emergency_count: u32,
    /// Covariate values after fill, or `None` if unresolved (such rows are
    /// dropped before being returned) or the schema is empty.
    pub covariates: Option<Vec<f64>>,
}

/// Row-count accounting for one densification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DensifyReport {
    /// Input events aggregated onto the scaffold.
    pub event_count: usize,
    /// Scaffold rows before the covariate drop (hours x observed cells).
    pub scaffold_rows: usize,
    /// Rows dropped for covariates unresolved after fill.
    pub dropped_rows: usize,
}

/// Errors from densification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DensifyError {
    /// The input event table is empty, so no time range exists.
    #[error("cannot densify an empty event table")]
    NoEvents,

    /// An event's covariate vector disagrees with the schema.
    #[error(transparent)]
    Covariate(#[from] CovariateError),
}

/// Expands events onto the full (observed cells x hours) scaffold.
///
/// The hour range is `[min event hour, max event hour]` inclusive at
/// one-hour steps; the cell set is the distinct cells actually observed in
/// the input, not the full grid. Rows are ordered by cell, then hour.
///
/// Covariates are deduplicated per (cell, hour) with the first event
/// winning, then forward- and backward-filled within each (cell, calendar
/// day) group. Rows whose covariates remain unresolved are dropped — an
/// accepted, reported data loss, not an error.
///
/// # Errors
///
/// Returns [`DensifyError::NoEvents`] for empty input and
/// [`DensifyError::Covariate`] if any event's covariate vector fails
/// schema validation.
pub fn densify(
    events: &[CellEvent],
    schema: &CovariateSchema,
) -> Result<(Vec<DenseRow>, DensifyReport), DensifyError> {
    if events.is_empty() {
        return Err(DensifyError::NoEvents);
    }
    for event in events {
        schema.validate(event.covariates.as_deref())?;
    }

    // Aggregate counts and first-wins covariates per (cell, hour).
    let mut counts: BTreeMap<(CellId, NaiveDateTime), u32> = BTreeMap::new();
    let mut covariates: BTreeMap<(CellId, NaiveDateTime), &Vec<f64>> = BTreeMap::new();
    let mut cells: BTreeSet<CellId> = BTreeSet::new();
    let mut min_hour = NaiveDateTime::MAX;
    let mut max_hour = NaiveDateTime::MIN;

    for event in events {
        let hour = floor_to_hour(event.occurred_at);
        min_hour = min_hour.min(hour);
        max_hour = max_hour.max(hour);
        cells.insert(event.cell);
        *counts.entry((event.cell, hour)).or_insert(0) += 1;
        if let Some(values) = &event.covariates {
            covariates.entry((event.cell, hour)).or_insert(values);
        }
    }

    let hours_per_cell = usize::try_from((max_hour - min_hour).num_hours())
        .expect("max hour is never before min hour")
        + 1;
    let scaffold_rows = hours_per_cell * cells.len();

    log::debug!(
        "Densifying {} events onto {scaffold_rows} scaffold rows ({} cells x {hours_per_cell} hours)",
        events.len(),
        cells.len(),
    );

    // Full cross product, ordered by cell then hour.
    let mut scaffold: Vec<DenseRow> = Vec::with_capacity(scaffold_rows);
    for &cell in &cells {
        let mut hour = min_hour;
        while hour <= max_hour {
            scaffold.push(DenseRow {
                cell,
                hour,
                emergency_count: counts.get(&(cell, hour)).copied().unwrap_or(0),
                covariates: covariates.get(&(cell, hour)).map(|v| (*v).clone()),
            });
            hour += TimeDelta::hours(1);
        }
    }

    debug_assert_eq!(
        scaffold
            .iter()
            .map(|row| row.emergency_count as usize)
            .sum::<usize>(),
        events.len(),
        "scaffold counts must conserve the input event count"
    );

    // Fill covariate gaps within each (cell, day) group, then drop rows
    // that stayed unresolved.
    let mut dropped_rows = 0;
    if !schema.is_empty() {
        for cell_rows in scaffold.chunks_mut(hours_per_cell) {
            fill_forward(cell_rows.iter_mut());
            fill_forward(cell_rows.iter_mut().rev());
        }

        let before = scaffold.len();
        scaffold.retain(|row| row.covariates.is_some());
        dropped_rows = before - scaffold.len();
        if dropped_rows > 0 {
            log::info!(
                "Dropped {dropped_rows} of {before} scaffold rows with unresolved covariates"
            );
        }
    }

    let report = DensifyReport {
        event_count: events.len(),
        scaffold_rows,
        dropped_rows,
    };

    Ok((scaffold, report))
}

/// Rounds a timestamp down to the start of its hour.
fn floor_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date()
        .and_hms_opt(ts.hour(), 0, 0)
        .expect("hour component is always a valid time of day")
}

/// Propagates the last seen covariate vector onto later rows of the same
/// calendar day. Run once in each direction for forward-then-backward fill.
fn fill_forward<'a>(rows: impl Iterator<Item = &'a mut DenseRow>) {
    let mut carry: Option<(NaiveDate, Vec<f64>)> = None;
    for row in rows {
        if let Some(values) = &row.covariates {
            carry = Some((row.hour.date(), values.clone()));
        } else if let Some((date, values)) = &carry {
            if *date == row.hour.date() {
                row.covariates = Some(values.clone());
            }
        }
    }
}
