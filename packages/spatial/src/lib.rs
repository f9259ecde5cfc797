#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for nearest-station weather matching.
//!
//! Builds an R-tree over the distinct weather-station coordinates and
//! answers single-nearest-neighbor queries in raw degree space (flat
//! Euclidean distance, no geodesic projection — an accepted approximation
//! for city-scale grids). Readings are keyed by (station, date); matching
//! a row means finding its nearest station and looking up that station's
//! reading for the row's calendar date.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ems_atlas_training_models::WeatherReading;
use rstar::RTree;
use rstar::primitives::GeomWithData;
use thiserror::Error;

/// Errors from building or querying the station index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// The weather table contains no readings, so no stations exist.
    #[error("weather table contains no stations to match against")]
    NoStations,
}

/// Row-count accounting for one matching pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Rows queried against the index.
    pub rows_in: usize,
    /// Rows whose matched station had a reading for their date.
    pub matched_rows: usize,
    /// Rows dropped because their date had no weather coverage at the
    /// matched station.
    pub dropped_rows: usize,
}

/// Pre-built nearest-neighbor index over distinct weather stations.
///
/// Stations are the distinct-coordinate projection of the weather table,
/// numbered in first-seen order. Duplicate (station, date) readings keep
/// the first occurrence.
pub struct StationIndex {
    tree: RTree<GeomWithData<[f64; 2], usize>>,
    stations: Vec<[f64; 2]>,
    readings: BTreeMap<(usize, NaiveDate), WeatherReading>,
}

impl StationIndex {
    /// Builds the index from a weather table.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::NoStations`] if the table is empty.
    pub fn build(weather: &[WeatherReading]) -> Result<Self, MatchError> {
        if weather.is_empty() {
            return Err(MatchError::NoStations);
        }

        // Distinct-coordinate projection, preserving first-seen order so
        // tie-breaking is deterministic.
        let mut by_coordinate: BTreeMap<(u64, u64), usize> = BTreeMap::new();
        let mut stations: Vec<[f64; 2]> = Vec::new();
        let mut readings: BTreeMap<(usize, NaiveDate), WeatherReading> = BTreeMap::new();

        for reading in weather {
            let key = (reading.latitude.to_bits(), reading.longitude.to_bits());
            let station = *by_coordinate.entry(key).or_insert_with(|| {
                stations.push([reading.latitude, reading.longitude]);
                stations.len() - 1
            });
            readings
                .entry((station, reading.date))
                .or_insert_with(|| reading.clone());
        }

        let tree = RTree::bulk_load(
            stations
                .iter()
                .enumerate()
                .map(|(idx, &coords)| GeomWithData::new(coords, idx))
                .collect(),
        );

        log::debug!(
            "Built station index: {} stations, {} readings",
            stations.len(),
            readings.len()
        );

        Ok(Self {
            tree,
            stations,
            readings,
        })
    }

    /// Number of distinct stations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Always `false`: construction fails on an empty weather table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Coordinates of a station, as `[latitude, longitude]`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a station index returned by this index.
    #[must_use]
    pub fn station(&self, index: usize) -> [f64; 2] {
        self.stations[index]
    }

    /// Index of the single nearest station by Euclidean distance in
    /// degree space.
    ///
    /// A point exactly equidistant between stations resolves to the lowest
    /// station index (first inserted wins): every candidate at the minimum
    /// squared distance is inspected rather than trusting the tree's
    /// internal ordering.
    #[must_use]
    pub fn nearest_station(&self, latitude: f64, longitude: f64) -> usize {
        let query = [latitude, longitude];
        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&query);

        // Construction rejects empty weather tables, so the tree always
        // holds at least one station.
        let Some((first, best_distance)) = candidates.next() else {
            return 0;
        };
        let mut best = first.data;

        for (candidate, distance) in candidates {
            if distance > best_distance {
                break;
            }
            best = best.min(candidate.data);
        }

        best
    }

    /// The reading for a station on a calendar date, if coverage exists.
    #[must_use]
    pub fn reading_for(&self, station: usize, date: NaiveDate) -> Option<&WeatherReading> {
        self.readings.get(&(station, date))
    }

    /// Matches each `(latitude, longitude, date)` row to its nearest
    /// station's reading for that date.
    ///
    /// Inner-join semantics: a row whose date has no reading at the
    /// matched station yields `None` and is counted as dropped. The output
    /// is positionally aligned with the input, so callers can zip rows
    /// away without re-querying; it never contains more matches than input
    /// rows.
    #[must_use]
    pub fn match_readings(
        &self,
        rows: &[(f64, f64, NaiveDate)],
    ) -> (Vec<Option<&WeatherReading>>, MatchReport) {
        let mut matches = Vec::with_capacity(rows.len());
        let mut matched_rows = 0;

        for &(latitude, longitude, date) in rows {
            let station = self.nearest_station(latitude, longitude);
            let reading = self.reading_for(station, date);
            if reading.is_some() {
                matched_rows += 1;
            }
            matches.push(reading);
        }

        let report = MatchReport {
            rows_in: rows.len(),
            matched_rows,
            dropped_rows: rows.len() - matched_rows,
        };

        if report.dropped_rows > 0 {
            log::info!(
                "Dropped {} of {} rows with no weather coverage at their matched station",
                report.dropped_rows,
                report.rows_in
            );
        }

        (matches, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, day).unwrap()
    }

    fn reading(lat: f64, lon: f64, day: u32, fmax: f64) -> WeatherReading {
        WeatherReading {
            date: date(day),
            latitude: lat,
            longitude: lon,
            fmax,
            fmin: 50.0,
            prcp_in: 0.0,
            snow_in: 0.0,
            snwd_in: 0.0,
        }
    }

    #[test]
    fn empty_weather_table_is_an_error() {
        assert!(matches!(
            StationIndex::build(&[]),
            Err(MatchError::NoStations)
        ));
    }

    #[test]
    fn deduplicates_station_coordinates() {
        let weather = vec![
            reading(37.77, -122.42, 1, 70.0),
            reading(37.77, -122.42, 2, 68.0),
            reading(37.62, -122.36, 1, 65.0),
        ];
        let index = StationIndex::build(&weather).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn single_station_matches_everything() {
        let weather = vec![reading(37.77, -122.42, 1, 70.0)];
        let index = StationIndex::build(&weather).unwrap();
        assert_eq!(index.nearest_station(0.0, 0.0), 0);
        assert_eq!(index.nearest_station(89.0, 179.0), 0);
    }

    #[test]
    fn matches_the_geometrically_nearest_station() {
        let weather = vec![
            reading(37.7705, -122.4269, 1, 70.0), // downtown
            reading(37.6196, -122.3656, 1, 65.0), // airport
        ];
        let index = StationIndex::build(&weather).unwrap();
        assert_eq!(index.nearest_station(37.78, -122.43), 0);
        assert_eq!(index.nearest_station(37.61, -122.36), 1);
    }

    #[test]
    fn equidistant_tie_goes_to_the_first_inserted_station() {
        let weather = vec![
            reading(38.0, -122.0, 1, 70.0),
            reading(38.0, -121.0, 1, 65.0),
        ];
        let index = StationIndex::build(&weather).unwrap();
        // Exactly halfway between the two stations.
        assert_eq!(index.nearest_station(38.0, -121.5), 0);

        // Same stations inserted in the opposite order: the other one wins.
        let reversed: Vec<WeatherReading> = weather.into_iter().rev().collect();
        let index = StationIndex::build(&reversed).unwrap();
        let station = index.station(index.nearest_station(38.0, -121.5));
        assert!((station[1] - -121.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reading_lookup_is_keyed_by_station_and_date() {
        let weather = vec![
            reading(37.77, -122.42, 1, 70.0),
            reading(37.77, -122.42, 2, 68.0),
        ];
        let index = StationIndex::build(&weather).unwrap();
        assert!((index.reading_for(0, date(1)).unwrap().fmax - 70.0).abs() < f64::EPSILON);
        assert!((index.reading_for(0, date(2)).unwrap().fmax - 68.0).abs() < f64::EPSILON);
        assert!(index.reading_for(0, date(3)).is_none());
    }

    #[test]
    fn duplicate_station_date_readings_keep_the_first() {
        let weather = vec![
            reading(37.77, -122.42, 1, 70.0),
            reading(37.77, -122.42, 1, 99.0),
        ];
        let index = StationIndex::build(&weather).unwrap();
        assert!((index.reading_for(0, date(1)).unwrap().fmax - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn match_readings_never_creates_rows() {
        let weather = vec![reading(37.77, -122.42, 1, 70.0)];
        let index = StationIndex::build(&weather).unwrap();
        let rows = vec![
            (37.78, -122.43, date(1)),
            (37.78, -122.43, date(2)), // no coverage for day 2
        ];
        let (matches, report) = index.match_readings(&rows);
        assert_eq!(matches.len(), 2);
        assert!(matches[0].is_some());
        assert!(matches[1].is_none());
        assert_eq!(report.rows_in, 2);
        assert_eq!(report.matched_rows, 1);
        assert_eq!(report.dropped_rows, 1);
    }
}
