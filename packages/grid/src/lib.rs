#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fixed-resolution geographic grid with deterministic cell-id assignment.
//!
//! Defines a rectangular grid over a bounding box as two equal-width axes
//! (latitude and longitude) and maps coordinates to 1-based row-major cell
//! ids. The forward mapping is total over the bounding box and fails
//! explicitly outside it; the inverse mapping recovers a cell's lower-left
//! corner or centroid. [`export`] emits a polygon-per-cell `GeoJSON`
//! collection for map rendering.

pub mod export;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A 1-based row-major grid cell identifier.
///
/// For a grid with `n_lon_cells` columns, the cell covering latitude bin
/// `r` and longitude bin `c` (both 1-based) has
/// `id = (r - 1) * n_lon_cells + c`.
pub type CellId = u32;

/// Bounding box and resolution for a grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Southern edge of the bounding box, in degrees.
    pub min_lat: f64,
    /// Northern edge of the bounding box, in degrees.
    pub max_lat: f64,
    /// Western edge of the bounding box, in degrees.
    pub min_lon: f64,
    /// Eastern edge of the bounding box, in degrees.
    pub max_lon: f64,
    /// Number of latitude (row) bins.
    pub n_lat_cells: u32,
    /// Number of longitude (column) bins.
    pub n_lon_cells: u32,
}

/// Errors from grid construction and cell lookups.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// The grid configuration cannot produce a valid axis pair.
    #[error("invalid grid config: {0}")]
    InvalidConfig(String),

    /// A coordinate lies strictly outside the grid bounding box.
    #[error(
        "point ({latitude}, {longitude}) is outside the grid bounds \
         lat [{min_lat}, {max_lat}], lon [{min_lon}, {max_lon}]"
    )]
    OutOfBounds {
        /// Latitude of the offending point.
        latitude: f64,
        /// Longitude of the offending point.
        longitude: f64,
        /// Southern edge of the grid.
        min_lat: f64,
        /// Northern edge of the grid.
        max_lat: f64,
        /// Western edge of the grid.
        min_lon: f64,
        /// Eastern edge of the grid.
        max_lon: f64,
    },

    /// A cell id is outside `[1, n_cells]` for this grid.
    #[error("cell id {cell} is outside [1, {n_cells}]")]
    UnknownCell {
        /// The offending cell id.
        cell: CellId,
        /// Total number of cells in the grid.
        n_cells: u32,
    },
}

/// The two boundary axes defining a rectangular grid.
///
/// Each axis holds `cells + 1` strictly ascending breakpoints. Axes are
/// normalized ascending on construction, so lookups behave identically for
/// grids built from descending boundary lists.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxes {
    lats: Vec<f64>,
    lons: Vec<f64>,
}

impl GridAxes {
    /// Builds equal-width axes from a bounding box and resolution.
    ///
    /// For `n` cells the axis has `n + 1` equally spaced breakpoints, with
    /// the first and last exactly equal to the configured bounds.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidConfig`] if either cell count is zero,
    /// either range is empty or inverted, or any bound is non-finite.
    pub fn build(config: &GridConfig) -> Result<Self, GridError> {
        if config.n_lat_cells == 0 || config.n_lon_cells == 0 {
            return Err(GridError::InvalidConfig(
                "cell counts must be at least 1".to_owned(),
            ));
        }
        for (name, lo, hi) in [
            ("lat", config.min_lat, config.max_lat),
            ("lon", config.min_lon, config.max_lon),
        ] {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(GridError::InvalidConfig(format!(
                    "{name} bounds must be finite, got [{lo}, {hi}]"
                )));
            }
            if lo >= hi {
                return Err(GridError::InvalidConfig(format!(
                    "{name} range [{lo}, {hi}] is empty"
                )));
            }
        }

        Ok(Self {
            lats: linspace(config.min_lat, config.max_lat, config.n_lat_cells),
            lons: linspace(config.min_lon, config.max_lon, config.n_lon_cells),
        })
    }

    /// Adopts caller-provided boundary axes.
    ///
    /// Descending axes are reversed so that a grid built from reversed
    /// boundary lists assigns the same cell ids as its ascending twin.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidConfig`] if either axis has fewer than
    /// two breakpoints or is not strictly monotonic after normalization.
    pub fn new(mut lats: Vec<f64>, mut lons: Vec<f64>) -> Result<Self, GridError> {
        for (name, axis) in [("lat", &mut lats), ("lon", &mut lons)] {
            if axis.len() < 2 {
                return Err(GridError::InvalidConfig(format!(
                    "{name} axis needs at least 2 breakpoints, got {}",
                    axis.len()
                )));
            }
            // Normalize descending input to ascending before any lookup.
            if axis[0] > axis[axis.len() - 1] {
                axis.reverse();
            }
            if axis.windows(2).any(|w| w[0] >= w[1]) {
                return Err(GridError::InvalidConfig(format!(
                    "{name} axis breakpoints must be strictly monotonic"
                )));
            }
        }

        Ok(Self { lats, lons })
    }

    /// Latitude breakpoints, ascending.
    #[must_use]
    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    /// Longitude breakpoints, ascending.
    #[must_use]
    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    /// Number of latitude (row) bins.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn n_lat_cells(&self) -> u32 {
        (self.lats.len() - 1) as u32
    }

    /// Number of longitude (column) bins.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn n_lon_cells(&self) -> u32 {
        (self.lons.len() - 1) as u32
    }

    /// Total number of cells in the grid.
    #[must_use]
    pub fn n_cells(&self) -> u32 {
        self.n_lat_cells() * self.n_lon_cells()
    }

    /// Whether a point lies within the bounding box (boundaries inclusive).
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.lats[0]
            && latitude <= self.lats[self.lats.len() - 1]
            && longitude >= self.lons[0]
            && longitude <= self.lons[self.lons.len() - 1]
    }

    /// Maps a coordinate to its 1-based row-major cell id.
    ///
    /// Bins are right-biased: a point exactly on an interior boundary falls
    /// into the upper/right bin, and the exact maximum boundary value falls
    /// into the last bin rather than overflowing.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::OutOfBounds`] if the point lies strictly outside
    /// the bounding box on either dimension. No clamping is performed other
    /// than at the exact upper boundary; callers wanting partial coverage
    /// must pre-filter.
    pub fn assign_cell(&self, latitude: f64, longitude: f64) -> Result<CellId, GridError> {
        if !self.contains(latitude, longitude) {
            return Err(GridError::OutOfBounds {
                latitude,
                longitude,
                min_lat: self.lats[0],
                max_lat: self.lats[self.lats.len() - 1],
                min_lon: self.lons[0],
                max_lon: self.lons[self.lons.len() - 1],
            });
        }

        let lat_bin = bin_index(&self.lats, latitude);
        let lon_bin = bin_index(&self.lons, longitude);

        // 1-based row-major id.
        Ok(lat_bin * self.n_lon_cells() + lon_bin + 1)
    }

    /// Maps a batch of `(latitude, longitude)` points to cell ids.
    ///
    /// Semantics are identical to [`Self::assign_cell`], applied
    /// independently per point.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::OutOfBounds`] for the first point that lies
    /// outside the bounding box.
    pub fn assign_cells(&self, points: &[(f64, f64)]) -> Result<Vec<CellId>, GridError> {
        points
            .iter()
            .map(|&(lat, lon)| self.assign_cell(lat, lon))
            .collect()
    }

    /// Decomposes a 1-based cell id into 0-based `(row, column)` bin indices.
    #[allow(clippy::cast_possible_truncation)]
    fn cell_bins(&self, cell: CellId) -> Result<(usize, usize), GridError> {
        if cell < 1 || cell > self.n_cells() {
            return Err(GridError::UnknownCell {
                cell,
                n_cells: self.n_cells(),
            });
        }
        let zero_based = (cell - 1) as usize;
        let n_lon = self.lons.len() - 1;
        Ok((zero_based / n_lon, zero_based % n_lon))
    }

    /// Returns the lower-left `(latitude, longitude)` corner of a cell.
    ///
    /// This inverse is lossy: any point inside the cell maps forward to the
    /// same id, and only the lower-left corner is recovered. Consumers that
    /// need a representative interior point should use
    /// [`Self::cell_centroid`].
    ///
    /// # Errors
    ///
    /// Returns [`GridError::UnknownCell`] if the id is outside
    /// `[1, n_cells]`.
    pub fn cell_origin(&self, cell: CellId) -> Result<(f64, f64), GridError> {
        let (row, col) = self.cell_bins(cell)?;
        Ok((self.lats[row], self.lons[col]))
    }

    /// Returns the lower-left corners for a batch of cell ids.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::UnknownCell`] for the first invalid id.
    pub fn cell_origins(&self, cells: &[CellId]) -> Result<Vec<(f64, f64)>, GridError> {
        cells.iter().map(|&cell| self.cell_origin(cell)).collect()
    }

    /// Returns the center `(latitude, longitude)` of a cell.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::UnknownCell`] if the id is outside
    /// `[1, n_cells]`.
    pub fn cell_centroid(&self, cell: CellId) -> Result<(f64, f64), GridError> {
        let (row, col) = self.cell_bins(cell)?;
        Ok((
            f64::midpoint(self.lats[row], self.lats[row + 1]),
            f64::midpoint(self.lons[col], self.lons[col + 1]),
        ))
    }
}

/// `n + 1` equally spaced breakpoints over `[min, max]`.
///
/// The last breakpoint is forced to exactly `max` so the upper boundary
/// check never loses the configured bound to rounding.
fn linspace(min: f64, max: f64, n_cells: u32) -> Vec<f64> {
    let n = f64::from(n_cells);
    let mut axis: Vec<f64> = (0..=n_cells)
        .map(|i| (max - min).mul_add(f64::from(i) / n, min))
        .collect();
    axis[n_cells as usize] = max;
    axis
}

/// 0-based bin index for an in-bounds value on an ascending axis.
///
/// Equivalent to `bisect_right(axis, value) - 1`, clamped into
/// `[0, cells - 1]` so the exact maximum boundary lands in the last bin.
#[allow(clippy::cast_possible_truncation)]
fn bin_index(axis: &[f64], value: f64) -> u32 {
    let n_cells = axis.len() - 1;
    let upper = axis.partition_point(|breakpoint| *breakpoint <= value);
    (upper.saturating_sub(1).min(n_cells - 1)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x4 grid around Sacramento, CA.
    fn sacramento_grid() -> GridAxes {
        GridAxes::build(&GridConfig {
            min_lat: 38.0,
            max_lat: 39.0,
            min_lon: -122.0,
            max_lon: -121.0,
            n_lat_cells: 4,
            n_lon_cells: 4,
        })
        .unwrap()
    }

    #[test]
    fn axes_have_cells_plus_one_breakpoints() {
        let axes = sacramento_grid();
        assert_eq!(axes.lats().len(), 5);
        assert_eq!(axes.lons().len(), 5);
        assert!((axes.lats()[0] - 38.0).abs() < f64::EPSILON);
        assert!((axes.lats()[4] - 39.0).abs() < f64::EPSILON);
        assert!((axes.lons()[0] - -122.0).abs() < f64::EPSILON);
        assert!((axes.lons()[4] - -121.0).abs() < f64::EPSILON);
    }

    #[test]
    fn axes_are_strictly_monotonic() {
        let axes = GridAxes::build(&GridConfig {
            min_lat: 37.695_916,
            max_lat: 37.837_044,
            min_lon: -122.532_444,
            max_lon: -122.358_207,
            n_lat_cells: 50,
            n_lon_cells: 50,
        })
        .unwrap();
        assert!(axes.lats().windows(2).all(|w| w[0] < w[1]));
        assert!(axes.lons().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn assigns_cell_in_interior() {
        // 3rd latitude bin, 2nd longitude bin: (3 - 1) * 4 + 2 = 10.
        let axes = sacramento_grid();
        assert_eq!(axes.assign_cell(38.6, -121.6).unwrap(), 10);
    }

    #[test]
    fn boundary_point_falls_in_upper_bin() {
        // (38.5, -121.5) is the lower-left corner of cell 11.
        let axes = sacramento_grid();
        assert_eq!(axes.assign_cell(38.5, -121.5).unwrap(), 11);
    }

    #[test]
    fn assigns_corner_cells() {
        let axes = sacramento_grid();
        assert_eq!(axes.assign_cell(38.1, -121.9).unwrap(), 1);
        assert_eq!(axes.assign_cell(38.9, -121.1).unwrap(), 16);
    }

    #[test]
    fn max_boundary_clamps_into_last_cell() {
        let axes = sacramento_grid();
        assert_eq!(axes.assign_cell(39.0, -121.0).unwrap(), 16);
    }

    #[test]
    fn out_of_bounds_point_is_an_error() {
        let axes = sacramento_grid();
        assert!(matches!(
            axes.assign_cell(37.0, -121.5),
            Err(GridError::OutOfBounds { .. })
        ));
        assert!(matches!(
            axes.assign_cell(38.5, -120.0),
            Err(GridError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn reversed_axes_assign_same_cells() {
        let axes = sacramento_grid();
        let reversed = GridAxes::new(
            axes.lats().iter().rev().copied().collect(),
            axes.lons().iter().rev().copied().collect(),
        )
        .unwrap();
        assert_eq!(reversed.assign_cell(38.6, -121.6).unwrap(), 10);
        assert_eq!(
            axes.assign_cell(38.2, -121.7).unwrap(),
            reversed.assign_cell(38.2, -121.7).unwrap()
        );
    }

    #[test]
    fn batch_assignment_matches_scalar() {
        let axes = sacramento_grid();
        let points = [(38.6, -121.6), (38.5, -121.5), (38.1, -121.9)];
        let cells = axes.assign_cells(&points).unwrap();
        assert_eq!(cells, vec![10, 11, 1]);
    }

    #[test]
    fn batch_assignment_fails_on_out_of_bounds_row() {
        let axes = sacramento_grid();
        let points = [(38.6, -121.6), (37.0, -121.5)];
        assert!(axes.assign_cells(&points).is_err());
    }

    #[test]
    fn cell_origin_is_lower_left_corner() {
        let axes = sacramento_grid();
        let (lat, lon) = axes.cell_origin(11).unwrap();
        assert!((lat - 38.5).abs() < 1e-12);
        assert!((lon - -121.5).abs() < 1e-12);
    }

    #[test]
    fn cell_origin_round_trips_through_forward_mapping() {
        let axes = sacramento_grid();
        for cell in 1..=axes.n_cells() {
            let (lat, lon) = axes.cell_origin(cell).unwrap();
            // The lower-left corner sits on the boundary and is right-biased
            // into this very cell.
            assert_eq!(axes.assign_cell(lat, lon).unwrap(), cell);
        }
    }

    #[test]
    fn cell_centroid_is_strictly_inside_the_cell() {
        let axes = sacramento_grid();
        let (lat, lon) = axes.cell_centroid(10).unwrap();
        assert!((lat - 38.625).abs() < 1e-12);
        assert!((lon - -121.625).abs() < 1e-12);
        assert_eq!(axes.assign_cell(lat, lon).unwrap(), 10);
    }

    #[test]
    fn unknown_cell_id_is_an_error() {
        let axes = sacramento_grid();
        assert!(matches!(
            axes.cell_origin(0),
            Err(GridError::UnknownCell { .. })
        ));
        assert!(matches!(
            axes.cell_origin(17),
            Err(GridError::UnknownCell { .. })
        ));
    }

    #[test]
    fn rejects_degenerate_config() {
        let mut config = GridConfig {
            min_lat: 38.0,
            max_lat: 39.0,
            min_lon: -122.0,
            max_lon: -121.0,
            n_lat_cells: 0,
            n_lon_cells: 4,
        };
        assert!(GridAxes::build(&config).is_err());

        config.n_lat_cells = 4;
        config.max_lat = 38.0;
        assert!(GridAxes::build(&config).is_err());

        config.max_lat = f64::NAN;
        assert!(GridAxes::build(&config).is_err());
    }

    #[test]
    fn rejects_non_monotonic_axis() {
        assert!(GridAxes::new(vec![38.0, 38.5, 38.5, 39.0], vec![-122.0, -121.0]).is_err());
    }
}
