//! `GeoJSON` export of the grid geometry.
//!
//! Emits one four-corner rectangle per cell, tagged with its cell id, for
//! downstream map rendering. Purely presentational: the binning logic never
//! consults these polygons.

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};

use crate::GridAxes;

/// Builds a polygon-per-cell [`FeatureCollection`] for the grid.
///
/// Each feature is a closed rectangular ring in `[longitude, latitude]`
/// order with a `cell` property holding the 1-based cell id. Features are
/// emitted in ascending cell-id order.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn grid_geometry(axes: &GridAxes) -> FeatureCollection {
    let lats = axes.lats();
    let lons = axes.lons();

    let mut features = Vec::with_capacity(axes.n_cells() as usize);

    for row in 0..axes.n_lat_cells() as usize {
        for col in 0..axes.n_lon_cells() as usize {
            let cell = row as u32 * axes.n_lon_cells() + col as u32 + 1;

            let (lat_lo, lat_hi) = (lats[row], lats[row + 1]);
            let (lon_lo, lon_hi) = (lons[col], lons[col + 1]);

            // Exterior ring, counter-clockwise, closed.
            let ring = vec![
                vec![lon_lo, lat_lo],
                vec![lon_hi, lat_lo],
                vec![lon_hi, lat_hi],
                vec![lon_lo, lat_hi],
                vec![lon_lo, lat_lo],
            ];

            let mut properties = JsonObject::new();
            properties.insert("cell".to_owned(), serde_json::Value::from(cell));

            features.push(Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            });
        }
    }

    log::debug!("Exported grid geometry with {} cells", features.len());

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GridConfig;

    fn axes() -> GridAxes {
        GridAxes::build(&GridConfig {
            min_lat: 38.0,
            max_lat: 39.0,
            min_lon: -122.0,
            max_lon: -121.0,
            n_lat_cells: 2,
            n_lon_cells: 2,
        })
        .unwrap()
    }

    #[test]
    fn exports_one_polygon_per_cell() {
        let collection = grid_geometry(&axes());
        assert_eq!(collection.features.len(), 4);
    }

    #[test]
    fn features_are_tagged_with_ascending_cell_ids() {
        let collection = grid_geometry(&axes());
        let ids: Vec<u64> = collection
            .features
            .iter()
            .map(|f| {
                f.properties
                    .as_ref()
                    .and_then(|p| p.get("cell"))
                    .and_then(serde_json::Value::as_u64)
                    .unwrap()
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn polygon_ring_is_closed_and_matches_cell_bounds() {
        let grid = axes();
        let collection = grid_geometry(&grid);
        let Some(Geometry {
            value: Value::Polygon(rings),
            ..
        }) = &collection.features[0].geometry
        else {
            panic!("expected polygon geometry");
        };
        let ring = &rings[0];
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
        // Cell 1 spans the lower-left quadrant: lon [-122.0, -121.5],
        // lat [38.0, 38.5].
        assert_eq!(ring[0], vec![-122.0, 38.0]);
        assert_eq!(ring[2], vec![-121.5, 38.5]);
    }
}
