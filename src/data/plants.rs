//! Renewable power plant registry (RePP GeoJSON).
//!
//! Each feature is a point with properties such as:
//!
//! ```json
//! { "country": "Kenya", "RE_source": "Wind power", "g_cap_mw": 310.0,
//!   "stat_ele": "O", "stat_inf": "Lake Turkana", "HPP_name": null }
//! ```
//!
//! Only solar, wind and hydro plants are kept. Features that fail to parse are
//! skipped and counted rather than failing the whole load.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::align::spatial::{CellSampler, nearest_site};
use crate::domain::{GenerationType, SpatialGrid};
use crate::error::{PipelineError, PipelineResult};
use crate::power::CapacityMap;

/// IGAD Climate Prediction and Applications Centre member countries.
pub const ICPAC_COUNTRIES: [&str; 11] = [
    "Burundi",
    "Djibouti",
    "Eritrea",
    "Ethiopia",
    "Kenya",
    "Rwanda",
    "Somalia",
    "South Sudan",
    "Sudan",
    "Tanzania",
    "Uganda",
];

/// Electrical status (`stat_ele`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantStatus {
    Operating,
    NotOperating,
    UnderConstruction,
    Proposed,
    Unknown,
}

impl PlantStatus {
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some("O") => PlantStatus::Operating,
            Some("NO") => PlantStatus::NotOperating,
            Some("U") => PlantStatus::UnderConstruction,
            Some("P") => PlantStatus::Proposed,
            _ => PlantStatus::Unknown,
        }
    }

    pub fn is_planned(self) -> bool {
        matches!(self, PlantStatus::UnderConstruction | PlantStatus::Proposed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plant {
    pub name: Option<String>,
    pub country: String,
    pub generation: GenerationType,
    pub capacity_mw: f64,
    pub status: PlantStatus,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlantRegistry {
    pub plants: Vec<Plant>,
    /// Features that could not be parsed.
    pub skipped_malformed: usize,
    /// Valid features for technologies other than solar, wind and hydro.
    pub skipped_other_source: usize,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct Properties {
    country: String,
    #[serde(rename = "RE_source")]
    re_source: String,
    g_cap_mw: Option<f64>,
    stat_ele: Option<String>,
    stat_inf: Option<String>,
    #[serde(rename = "HPP_name")]
    hpp_name: Option<String>,
}

fn generation_for(source: &str) -> Option<GenerationType> {
    match source.trim() {
        "Solar power" => Some(GenerationType::Solar),
        "Wind power" => Some(GenerationType::Wind),
        "Hydro power" => Some(GenerationType::Hydro),
        _ => None,
    }
}

/// Load a RePP-style GeoJSON FeatureCollection.
pub fn load_registry(path: &Path) -> PipelineResult<PlantRegistry> {
    let name = path.display().to_string();
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let collection: FeatureCollection = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PipelineError::schema(&name, format!("invalid GeoJSON: {e}")))?;

    let mut registry = PlantRegistry::default();
    for value in collection.features {
        let feature: Feature = match serde_json::from_value(value) {
            Ok(f) => f,
            Err(e) => {
                debug!(file = %name, "skipping malformed feature: {e}");
                registry.skipped_malformed += 1;
                continue;
            }
        };
        let [lon, lat, ..] = feature.geometry.coordinates[..] else {
            registry.skipped_malformed += 1;
            continue;
        };
        if feature.geometry.kind != "Point" || !lat.is_finite() || !lon.is_finite() {
            registry.skipped_malformed += 1;
            continue;
        }
        let Some(generation) = generation_for(&feature.properties.re_source) else {
            registry.skipped_other_source += 1;
            continue;
        };
        let p = feature.properties;
        registry.plants.push(Plant {
            name: p.hpp_name.or(p.stat_inf),
            country: p.country,
            generation,
            capacity_mw: p.g_cap_mw.filter(|c| c.is_finite() && *c >= 0.0).unwrap_or(0.0),
            status: PlantStatus::from_code(p.stat_ele.as_deref()),
            lat,
            lon,
        });
    }

    if registry.skipped_malformed > 0 {
        warn!(
            file = %name,
            skipped = registry.skipped_malformed,
            "skipped malformed plant features"
        );
    }
    debug!(file = %name, plants = registry.plants.len(), "loaded plant registry");
    Ok(registry)
}

impl PlantRegistry {
    /// Keep plants located in `countries` (exact names).
    pub fn filter_countries(&self, countries: &[String]) -> PlantRegistry {
        PlantRegistry {
            plants: self
                .plants
                .iter()
                .filter(|p| countries.iter().any(|c| *c == p.country))
                .cloned()
                .collect(),
            ..*self
        }
    }

    /// Operating and planned capacity per `(country, generation)`.
    pub fn capacity_by_country(&self) -> Vec<CountryCapacity> {
        let mut table: BTreeMap<(String, GenerationType), CountryCapacity> = BTreeMap::new();
        for p in &self.plants {
            let row = table
                .entry((p.country.clone(), p.generation))
                .or_insert_with(|| CountryCapacity {
                    country: p.country.clone(),
                    generation: p.generation,
                    plants: 0,
                    total_mw: 0.0,
                    operating_mw: 0.0,
                    planned_mw: 0.0,
                });
            row.plants += 1;
            row.total_mw += p.capacity_mw;
            if p.status == PlantStatus::Operating {
                row.operating_mw += p.capacity_mw;
            } else if p.status.is_planned() {
                row.planned_mw += p.capacity_mw;
            }
        }
        table.into_values().collect()
    }

    /// Operating vs planned totals per generation type.
    pub fn status_totals(&self) -> Vec<StatusTotals> {
        GenerationType::ALL
            .iter()
            .map(|&g| {
                let of_type = self.plants.iter().filter(|p| p.generation == g);
                let mut totals = StatusTotals {
                    generation: g,
                    operating_mw: 0.0,
                    planned_mw: 0.0,
                };
                for p in of_type {
                    if p.status == PlantStatus::Operating {
                        totals.operating_mw += p.capacity_mw;
                    } else if p.status.is_planned() {
                        totals.planned_mw += p.capacity_mw;
                    }
                }
                totals
            })
            .collect()
    }

    /// Installed operating capacity of one generation type per target cell.
    ///
    /// Each plant goes to its nearest cell within `radius_deg`; plants with no
    /// cell in range are left out. Basin grids have no coordinates and are
    /// rejected.
    pub fn capacity_map(
        &self,
        generation: GenerationType,
        grid: &SpatialGrid,
        radius_deg: f64,
    ) -> PipelineResult<CapacityMap> {
        if !grid.has_coordinates() {
            return Err(PipelineError::schema(
                "plant registry",
                "plants can only be placed on grids with coordinates",
            ));
        }
        let cells = grid.cells();
        let coords: Vec<(f64, f64)> = cells
            .iter()
            .filter_map(|c| Some((c.lat?, c.lon?)))
            .collect();

        let mut map = CapacityMap::default();
        let mut unplaced = 0usize;
        for p in self
            .plants
            .iter()
            .filter(|p| p.generation == generation && p.status == PlantStatus::Operating)
        {
            match nearest_site(coords.iter().copied(), p.lat, p.lon, radius_deg) {
                CellSampler::Node(i) => {
                    *map.by_cell.entry(cells[i].id.clone()).or_insert(0.0) += p.capacity_mw;
                }
                _ => unplaced += 1,
            }
        }
        debug!(
            generation = generation.display_name(),
            cells = map.by_cell.len(),
            unplaced,
            total_mw = map.total_mw(),
            "built capacity map"
        );
        Ok(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryCapacity {
    pub country: String,
    pub generation: GenerationType,
    pub plants: usize,
    pub total_mw: f64,
    pub operating_mw: f64,
    pub planned_mw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusTotals {
    pub generation: GenerationType,
    pub operating_mw: f64,
    pub planned_mw: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Site;

    const GEOJSON: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [36.8, 2.5]},
         "properties": {"country": "Kenya", "RE_source": "Wind power", "g_cap_mw": 310.0, "stat_ele": "O", "stat_inf": "Lake Turkana"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [37.0, -0.8]},
         "properties": {"country": "Kenya", "RE_source": "Hydro power", "g_cap_mw": 225.0, "stat_ele": "O", "HPP_name": "Gitaru"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [38.0, 9.0]},
         "properties": {"country": "Ethiopia", "RE_source": "Solar power", "g_cap_mw": 100.0, "stat_ele": "P"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [36.3, -0.9]},
         "properties": {"country": "Kenya", "RE_source": "Geothermal power", "g_cap_mw": 280.0, "stat_ele": "O"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.0, 50.0]},
         "properties": {"country": "Germany", "RE_source": "Wind power", "g_cap_mw": 50.0, "stat_ele": "O"}},
        {"type": "Feature", "geometry": null, "properties": {"country": "Kenya"}}
      ]
    }"#;

    fn registry() -> PlantRegistry {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repp.geojson");
        std::fs::write(&path, GEOJSON).unwrap();
        load_registry(&path).unwrap()
    }

    #[test]
    fn loads_and_counts_skips() {
        let r = registry();
        assert_eq!(r.plants.len(), 4);
        assert_eq!(r.skipped_malformed, 1);
        assert_eq!(r.skipped_other_source, 1);
        assert_eq!(r.plants[1].name.as_deref(), Some("Gitaru"));
    }

    #[test]
    fn icpac_filter_and_summaries() {
        let countries: Vec<String> = ICPAC_COUNTRIES.iter().map(|c| c.to_string()).collect();
        let r = registry().filter_countries(&countries);
        assert_eq!(r.plants.len(), 3);

        let by_country = r.capacity_by_country();
        assert_eq!(by_country.len(), 3);
        assert_eq!(by_country[0].country, "Ethiopia");
        assert_eq!(by_country[0].planned_mw, 100.0);

        let totals = r.status_totals();
        let wind = totals.iter().find(|t| t.generation == GenerationType::Wind).unwrap();
        assert_eq!(wind.operating_mw, 310.0);
        let solar = totals.iter().find(|t| t.generation == GenerationType::Solar).unwrap();
        assert_eq!((solar.operating_mw, solar.planned_mw), (0.0, 100.0));
    }

    #[test]
    fn capacity_map_assigns_nearest_cell() {
        let grid = SpatialGrid::Points {
            cells: vec![
                Site { id: "turkana".into(), lat: 2.4, lon: 36.9 },
                Site { id: "nairobi".into(), lat: -1.3, lon: 36.8 },
            ],
        };
        let map = registry().capacity_map(GenerationType::Wind, &grid, 1.0).unwrap();
        assert_eq!(map.get("turkana"), Some(310.0));
        assert_eq!(map.get("nairobi"), None);

        let basins = SpatialGrid::Basins { ids: vec!["tana".into()] };
        assert!(registry().capacity_map(GenerationType::Hydro, &basins, 1.0).is_err());
    }
}
