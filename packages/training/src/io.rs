//! CSV and `GeoJSON` I/O boundary for the pipeline.
//!
//! Readers validate the header row against the required column list before
//! any record is parsed, so a malformed input fails fast with every missing
//! column named. Writers emit the fully-typed training table and the
//! polygon-per-cell grid geometry.

use std::fs::File;
use std::io::{BufWriter, Read, Write as _};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use ems_atlas_grid::GridAxes;
use ems_atlas_training_models::{
    CovariateSchema, EmergencyCall, TrainingRow, WeatherFeature, WeatherReading,
};

use crate::PipelineError;

/// Required event-table columns, before any configured covariates.
pub const EVENT_COLUMNS: &[&str] = &["latitude", "longitude", "occurred_at"];

/// Required weather-table columns.
pub const WEATHER_COLUMNS: &[&str] = &[
    "date", "latitude", "longitude", "fmax", "fmin", "prcp_in", "snow_in", "snwd_in",
];

/// Reads the event table from a CSV file.
///
/// Requires the [`EVENT_COLUMNS`] plus every column named in `schema`;
/// extra columns are ignored rather than silently absorbed as covariates.
///
/// # Errors
///
/// Returns [`PipelineError::InputNotFound`] if the file does not exist,
/// [`PipelineError::MissingColumns`] naming every absent column, or
/// [`PipelineError::Parse`] for unparseable field values.
pub fn read_events(
    path: &Path,
    schema: &CovariateSchema,
) -> Result<Vec<EmergencyCall>, PipelineError> {
    read_events_from(open_input(path)?, schema)
}

/// Reads the event table from any CSV reader. See [`read_events`].
///
/// # Errors
///
/// As [`read_events`], minus the file-existence check.
pub fn read_events_from(
    reader: impl Read,
    schema: &CovariateSchema,
) -> Result<Vec<EmergencyCall>, PipelineError> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let mut required: Vec<&str> = EVENT_COLUMNS.to_vec();
    required.extend(schema.columns().iter().map(String::as_str));
    let columns = validate_columns(&mut csv_reader, "events", &required)?;

    let mut events = Vec::new();
    for (line, result) in csv_reader.records().enumerate() {
        let record = result?;
        let field = |idx: usize| record.get(columns[idx]).unwrap_or("").trim();

        let latitude = parse_f64(field(0), "latitude", line)?;
        let longitude = parse_f64(field(1), "longitude", line)?;
        let occurred_at = parse_datetime(field(2), line)?;

        let covariates = if schema.is_empty() {
            None
        } else {
            let values = (0..schema.len())
                .map(|i| parse_f64(field(EVENT_COLUMNS.len() + i), &schema.columns()[i], line))
                .collect::<Result<Vec<f64>, PipelineError>>()?;
            Some(values)
        };

        events.push(EmergencyCall {
            occurred_at,
            latitude,
            longitude,
            covariates,
        });
    }

    log::info!("Read {} events", events.len());
    Ok(events)
}

/// Reads the weather table from a CSV file.
///
/// # Errors
///
/// Returns [`PipelineError::InputNotFound`] if the file does not exist,
/// [`PipelineError::MissingColumns`] naming every absent column, or
/// [`PipelineError::Parse`] for unparseable field values. Measurement
/// fields are required: a blank measurement is a parse error, not a
/// silently-missing value.
pub fn read_weather(path: &Path) -> Result<Vec<WeatherReading>, PipelineError> {
    read_weather_from(open_input(path)?)
}

/// Reads the weather table from any CSV reader. See [`read_weather`].
///
/// # Errors
///
/// As [`read_weather`], minus the file-existence check.
pub fn read_weather_from(reader: impl Read) -> Result<Vec<WeatherReading>, PipelineError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let columns = validate_columns(&mut csv_reader, "weather", WEATHER_COLUMNS)?;

    let mut readings = Vec::new();
    for (line, result) in csv_reader.records().enumerate() {
        let record = result?;
        let field = |idx: usize| record.get(columns[idx]).unwrap_or("").trim();

        readings.push(WeatherReading {
            date: parse_date(field(0), line)?,
            latitude: parse_f64(field(1), "latitude", line)?,
            longitude: parse_f64(field(2), "longitude", line)?,
            fmax: parse_f64(field(3), "fmax", line)?,
            fmin: parse_f64(field(4), "fmin", line)?,
            prcp_in: parse_f64(field(5), "prcp_in", line)?,
            snow_in: parse_f64(field(6), "snow_in", line)?,
            snwd_in: parse_f64(field(7), "snwd_in", line)?,
        });
    }

    log::info!("Read {} weather readings", readings.len());
    Ok(readings)
}

/// Writes the training table as CSV with a header of
/// `cell,year,month,day,hour,<features...>,emergency_count`.
///
/// # Errors
///
/// Returns an error if the file cannot be created or a row fails to
/// serialize.
pub fn write_training_csv(
    path: &Path,
    rows: &[TrainingRow],
    features: &[WeatherFeature],
) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(path)?));

    let mut header = vec!["cell", "year", "month", "day", "hour"];
    header.extend(features.iter().map(|f| f.column_name()));
    header.push("emergency_count");
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.cell.to_string(),
            row.year.to_string(),
            row.month.to_string(),
            row.day.to_string(),
            row.hour.to_string(),
        ];
        record.extend(row.features.iter().map(ToString::to_string));
        record.push(row.emergency_count.to_string());
        writer.write_record(&record)?;
    }

    writer.flush()?;
    log::info!("Wrote {} training rows to {}", rows.len(), path.display());
    Ok(())
}

/// Writes the polygon-per-cell grid geometry as a `GeoJSON` file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or serialization fails.
pub fn write_grid_geojson(path: &Path, axes: &GridAxes) -> Result<(), PipelineError> {
    let collection = ems_atlas_grid::export::grid_geometry(axes);
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &collection)?;
    writer.flush()?;
    log::info!(
        "Wrote grid geometry ({} cells) to {}",
        collection.features.len(),
        path.display()
    );
    Ok(())
}

/// Opens an input file, mapping absence to a resource-not-found error.
fn open_input(path: &Path) -> Result<File, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(File::open(path)?)
}

/// Checks the header row for every required column and returns their
/// positions, in `required` order.
fn validate_columns<R: Read>(
    reader: &mut csv::Reader<R>,
    table: &str,
    required: &[&str],
) -> Result<Vec<usize>, PipelineError> {
    let headers = reader.headers()?.clone();

    let mut positions = Vec::with_capacity(required.len());
    let mut missing = Vec::new();
    for &name in required {
        match headers.iter().position(|h| h.trim() == name) {
            Some(idx) => positions.push(idx),
            None => missing.push(name.to_owned()),
        }
    }

    if missing.is_empty() {
        Ok(positions)
    } else {
        Err(PipelineError::MissingColumns {
            table: table.to_owned(),
            columns: missing,
        })
    }
}

fn parse_f64(value: &str, column: &str, line: usize) -> Result<f64, PipelineError> {
    value.parse().map_err(|_| {
        PipelineError::Parse(format!(
            "record {line}: column '{column}' has invalid number '{value}'"
        ))
    })
}

fn parse_datetime(value: &str, line: usize) -> Result<NaiveDateTime, PipelineError> {
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    Err(PipelineError::Parse(format!(
        "record {line}: invalid timestamp '{value}'"
    )))
}

fn parse_date(value: &str, line: usize) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        PipelineError::Parse(format!("record {line}: invalid date '{value}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_events_with_extra_columns_ignored() {
        let csv = "call_number,latitude,longitude,occurred_at\n\
                   T1,38.6,-121.6,2023-06-01T10:30:00\n\
                   T2,38.1,-121.9,2023-06-01 12:00:00\n";
        let events = read_events_from(csv.as_bytes(), &CovariateSchema::empty()).unwrap();
        assert_eq!(events.len(), 2);
        assert!((events[0].latitude - 38.6).abs() < f64::EPSILON);
        assert_eq!(events[1].occurred_at.to_string(), "2023-06-01 12:00:00");
        assert!(events[0].covariates.is_none());
    }

    #[test]
    fn missing_event_columns_are_named() {
        let csv = "latitude,when\n38.6,2023-06-01T10:30:00\n";
        let err = read_events_from(csv.as_bytes(), &CovariateSchema::empty()).unwrap_err();
        let PipelineError::MissingColumns { table, columns } = err else {
            panic!("expected MissingColumns, got {err}");
        };
        assert_eq!(table, "events");
        assert_eq!(columns, vec!["longitude", "occurred_at"]);
    }

    #[test]
    fn reads_configured_covariate_columns() {
        let schema = CovariateSchema::new(vec!["fmax".to_owned()]);
        let csv = "latitude,longitude,occurred_at,fmax\n\
                   38.6,-121.6,2023-06-01T10:30:00,71.5\n";
        let events = read_events_from(csv.as_bytes(), &schema).unwrap();
        assert_eq!(events[0].covariates, Some(vec![71.5]));
    }

    #[test]
    fn missing_covariate_column_fails_validation() {
        let schema = CovariateSchema::new(vec!["fmax".to_owned()]);
        let csv = "latitude,longitude,occurred_at\n38.6,-121.6,2023-06-01T10:30:00\n";
        assert!(matches!(
            read_events_from(csv.as_bytes(), &schema),
            Err(PipelineError::MissingColumns { .. })
        ));
    }

    #[test]
    fn reads_weather_readings() {
        let csv = "date,latitude,longitude,fmax,fmin,prcp_in,snow_in,snwd_in\n\
                   2023-06-01,37.7705,-122.4269,70.0,55.0,0.0,0.0,0.0\n";
        let readings = read_weather_from(csv.as_bytes()).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].date.to_string(), "2023-06-01");
        assert!((readings[0].fmax - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_weather_columns_are_named() {
        let csv = "date,latitude,longitude,fmax\n2023-06-01,37.0,-122.0,70.0\n";
        let err = read_weather_from(csv.as_bytes()).unwrap_err();
        let PipelineError::MissingColumns { table, columns } = err else {
            panic!("expected MissingColumns, got {err}");
        };
        assert_eq!(table, "weather");
        assert_eq!(columns, vec!["fmin", "prcp_in", "snow_in", "snwd_in"]);
    }

    #[test]
    fn blank_measurement_is_a_parse_error() {
        let csv = "date,latitude,longitude,fmax,fmin,prcp_in,snow_in,snwd_in\n\
                   2023-06-01,37.7705,-122.4269,70.0,,0.0,0.0,0.0\n";
        assert!(matches!(
            read_weather_from(csv.as_bytes()),
            Err(PipelineError::Parse(_))
        ));
    }

    #[test]
    fn invalid_timestamp_is_a_parse_error() {
        let csv = "latitude,longitude,occurred_at\n38.6,-121.6,not-a-time\n";
        assert!(matches!(
            read_events_from(csv.as_bytes(), &CovariateSchema::empty()),
            Err(PipelineError::Parse(_))
        ));
    }
}
