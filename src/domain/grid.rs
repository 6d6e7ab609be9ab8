//! Spatial reference shared by fields, requests and results.
//!
//! Cells are enumerated in a fixed order:
//!
//! - `Regular`: row-major, latitude outer and longitude inner
//! - `Points` / `Basins`: declaration order

use serde::{Deserialize, Serialize};

/// One irregular site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SpatialGrid {
    Regular { lat: Vec<f64>, lon: Vec<f64> },
    Points { cells: Vec<Site> },
    Basins { ids: Vec<String> },
}

/// A resolved reference to one cell of a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRef {
    pub index: usize,
    pub id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl SpatialGrid {
    pub fn cell_count(&self) -> usize {
        match self {
            SpatialGrid::Regular { lat, lon } => lat.len() * lon.len(),
            SpatialGrid::Points { cells } => cells.len(),
            SpatialGrid::Basins { ids } => ids.len(),
        }
    }

    /// Frame shape `(rows, cols)` used to store one timestep of values.
    pub fn frame_shape(&self) -> (usize, usize) {
        match self {
            SpatialGrid::Regular { lat, lon } => (lat.len(), lon.len()),
            _ => (1, self.cell_count()),
        }
    }

    /// Map a cell index to its `(row, col)` position in a frame.
    pub fn frame_position(&self, index: usize) -> (usize, usize) {
        match self {
            SpatialGrid::Regular { lon, .. } => (index / lon.len(), index % lon.len()),
            _ => (0, index),
        }
    }

    pub fn has_coordinates(&self) -> bool {
        !matches!(self, SpatialGrid::Basins { .. })
    }

    pub fn cell(&self, index: usize) -> CellRef {
        match self {
            SpatialGrid::Regular { lat, lon } => {
                let (i, j) = self.frame_position(index);
                CellRef {
                    index,
                    id: format!("{:.4}N_{:.4}E", lat[i], lon[j]),
                    lat: Some(lat[i]),
                    lon: Some(lon[j]),
                }
            }
            SpatialGrid::Points { cells } => {
                let site = &cells[index];
                CellRef {
                    index,
                    id: site.id.clone(),
                    lat: Some(site.lat),
                    lon: Some(site.lon),
                }
            }
            SpatialGrid::Basins { ids } => CellRef {
                index,
                id: ids[index].clone(),
                lat: None,
                lon: None,
            },
        }
    }

    pub fn cells(&self) -> Vec<CellRef> {
        (0..self.cell_count()).map(|i| self.cell(i)).collect()
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SpatialGrid::Regular { .. } => "regular",
            SpatialGrid::Points { .. } => "points",
            SpatialGrid::Basins { .. } => "basins",
        }
    }
}

/// Difference between two longitudes folded into `[-180, 180)`.
pub fn lon_delta(a: f64, b: f64) -> f64 {
    (a - b + 180.0).rem_euclid(360.0) - 180.0
}

/// Great-circle-free "degree distance" used for nearest-neighbour radius checks.
///
/// Grids are compared in degrees, so the radius is in degrees too.
pub fn degree_distance(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let dlat = lat_a - lat_b;
    let dlon = lon_delta(lon_a, lon_b);
    (dlat * dlat + dlon * dlon).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_cells_are_row_major() {
        let grid = SpatialGrid::Regular {
            lat: vec![1.0, 0.0],
            lon: vec![30.0, 31.0, 32.0],
        };
        assert_eq!(grid.cell_count(), 6);
        let c = grid.cell(4);
        assert_eq!(c.lat, Some(0.0));
        assert_eq!(c.lon, Some(31.0));
        assert_eq!(grid.frame_position(4), (1, 1));
    }

    #[test]
    fn longitude_delta_wraps() {
        assert!((lon_delta(359.0, 1.0) + 2.0).abs() < 1e-12);
        assert!((lon_delta(-179.0, 179.0) - 2.0).abs() < 1e-12);
        assert!((degree_distance(0.0, 359.5, 0.0, -0.5)).abs() < 1e-12);
    }
}
