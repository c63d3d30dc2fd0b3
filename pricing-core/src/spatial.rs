// Spatial queries: which units lie within a radius of a given unit

use std::collections::{BTreeMap, HashMap};

use crate::registry::EntityRegistry;
use crate::types::{Location, UnitId};

/// Grid queries whose radius spans more cells than this fall back to a full scan.
const MAX_GRID_REACH: i64 = 32;
/// Scaled coordinates beyond this magnitude get no cell.
const MAX_CELL_COORD: f64 = (i64::MAX / 4) as f64;

/// Planar distance in degrees. Only meaningful over short distances.
pub fn planar_distance(a: Location, b: Location) -> f64 {
    let d_lat = a.latitude - b.latitude;
    let d_lon = a.longitude - b.longitude;
    (d_lat * d_lat + d_lon * d_lon).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub unit_id: UnitId,
    pub distance: f64,
}

/// "Nearest units within radius".
///
/// Results exclude the queried unit, are sorted ascending by distance and
/// break ties by unit id. An unknown unit has no neighbors.
pub trait SpatialQuery {
    fn location(&self, unit: UnitId) -> Option<Location>;

    fn within_radius(&self, unit: UnitId, radius: f64) -> Vec<Neighbor>;
}

/// Candidates arrive in unit-id order, so a stable sort by distance keeps id order on ties.
fn collect_sorted(
    origin: UnitId,
    center: Location,
    radius: f64,
    candidates: impl Iterator<Item = (UnitId, Location)>,
) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = candidates
        .filter(|(id, _)| *id != origin)
        .filter_map(|(unit_id, loc)| {
            let distance = planar_distance(center, loc);
            (distance <= radius).then_some(Neighbor { unit_id, distance })
        })
        .collect();
    neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    neighbors
}

// === BRUTE FORCE ===

impl SpatialQuery for EntityRegistry {
    fn location(&self, unit: UnitId) -> Option<Location> {
        self.location_of(unit)
    }

    fn within_radius(&self, unit: UnitId, radius: f64) -> Vec<Neighbor> {
        let Some(center) = self.location_of(unit) else {
            return Vec::new();
        };
        collect_sorted(
            unit,
            center,
            radius,
            self.iter().map(|u| (u.id, u.location)),
        )
    }
}

// === GRID INDEX ===

type Cell = (i64, i64);

/// Uniform lat/lon grid. Returns exactly what the brute-force scan returns.
///
/// Units whose location cannot be bucketed (non-finite, or too far out for
/// the cell size) live in `unbucketed` and are checked on every query.
#[derive(Debug, Clone)]
pub struct GridIndex {
    cell_size: f64,
    locations: BTreeMap<UnitId, Location>,
    cells: HashMap<Cell, Vec<UnitId>>,
    unbucketed: Vec<UnitId>,
}

impl GridIndex {
    /// Build from a registry. `cell_size` is usually the competition radius;
    /// non-positive sizes are raised to a small minimum.
    pub fn build(registry: &EntityRegistry, cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1e-6
        };
        let mut index = Self {
            cell_size,
            locations: BTreeMap::new(),
            cells: HashMap::new(),
            unbucketed: Vec::new(),
        };
        for unit in registry.iter() {
            index.locations.insert(unit.id, unit.location);
            match index.cell_of(unit.location) {
                Some(cell) => index.cells.entry(cell).or_default().push(unit.id),
                None => index.unbucketed.push(unit.id),
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    fn cell_of(&self, loc: Location) -> Option<Cell> {
        let row = (loc.latitude / self.cell_size).floor();
        let col = (loc.longitude / self.cell_size).floor();
        let fits = |v: f64| v.is_finite() && v.abs() <= MAX_CELL_COORD;
        (fits(row) && fits(col)).then_some((row as i64, col as i64))
    }

    fn scan_all(&self, unit: UnitId, center: Location, radius: f64) -> Vec<Neighbor> {
        let all = self.locations.iter().map(|(id, loc)| (*id, *loc));
        collect_sorted(unit, center, radius, all)
    }
}

impl SpatialQuery for GridIndex {
    fn location(&self, unit: UnitId) -> Option<Location> {
        self.locations.get(&unit).copied()
    }

    fn within_radius(&self, unit: UnitId, radius: f64) -> Vec<Neighbor> {
        let Some(center) = self.location(unit) else {
            return Vec::new();
        };
        let reach = (radius / self.cell_size).ceil();
        if !(reach <= MAX_GRID_REACH as f64) {
            return self.scan_all(unit, center, radius);
        }
        let Some((row, col)) = self.cell_of(center) else {
            return self.scan_all(unit, center, radius);
        };

        // One extra ring absorbs rounding in the cell assignment.
        let reach = reach as i64 + 1;
        let mut ids: Vec<UnitId> = self.unbucketed.clone();
        for r in row.saturating_sub(reach)..=row.saturating_add(reach) {
            for c in col.saturating_sub(reach)..=col.saturating_add(reach) {
                if let Some(bucket) = self.cells.get(&(r, c)) {
                    ids.extend_from_slice(bucket);
                }
            }
        }
        ids.sort_unstable();

        let candidates = ids
            .into_iter()
            .filter_map(|id| self.locations.get(&id).map(|loc| (id, *loc)));
        collect_sorted(unit, center, radius, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Unit;

    fn registry(points: &[(u32, f64, f64)]) -> EntityRegistry {
        points
            .iter()
            .map(|&(id, lat, lon)| Unit::new(UnitId::new(id), Location::new(lat, lon), 100))
            .collect()
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Location::new(26.1445, 91.7362);
        let b = Location::new(26.1502, 91.7311);
        assert_eq!(planar_distance(a, b), planar_distance(b, a));
        assert_eq!(planar_distance(a, a), 0.0);
    }

    #[test]
    fn test_scan_sorted_and_excludes_self() {
        let reg = registry(&[
            (0, 0.0, 0.0),
            (1, 0.003, 0.0),
            (2, 0.001, 0.0),
            (3, 0.02, 0.0),
        ]);

        let found = reg.within_radius(UnitId::new(0), 0.005);
        let ids: Vec<u32> = found.iter().map(|n| n.unit_id.0).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!((found[0].distance - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_ties_broken_by_unit_id() {
        let reg = registry(&[(5, 0.0, 0.0), (9, 0.0, 0.002), (2, 0.0, -0.002), (4, 0.002, 0.0)]);

        let ids: Vec<u32> = reg
            .within_radius(UnitId::new(5), 0.005)
            .iter()
            .map(|n| n.unit_id.0)
            .collect();
        assert_eq!(ids, vec![2, 4, 9]);
    }

    #[test]
    fn test_unknown_unit_has_no_neighbors() {
        let reg = registry(&[(0, 0.0, 0.0), (1, 0.001, 0.0)]);
        assert!(reg.within_radius(UnitId::new(42), 1.0).is_empty());

        let grid = GridIndex::build(&reg, 0.005);
        assert!(grid.within_radius(UnitId::new(42), 1.0).is_empty());
    }

    #[test]
    fn test_tiny_cells_fall_back_to_scan() {
        let reg = registry(&[(0, 26.0, 91.0), (1, 26.0, 91.0), (2, 26.001, 91.0)]);
        let grid = GridIndex::build(&reg, 1e-300);

        for radius in [1e-300, 0.005] {
            for id in reg.ids() {
                assert_eq!(grid.within_radius(id, radius), reg.within_radius(id, radius));
            }
        }
        assert_eq!(grid.within_radius(UnitId::new(0), 1e-300).len(), 1);
    }

    #[test]
    fn test_unbucketed_locations_still_scanned() {
        let reg = registry(&[
            (0, 0.0, 0.0),
            (1, 0.001, 0.0),
            (2, f64::MAX, 0.0),
            (3, f64::INFINITY, 0.0),
        ]);
        let grid = GridIndex::build(&reg, 0.005);

        for radius in [0.005, f64::MAX] {
            for id in reg.ids() {
                assert_eq!(grid.within_radius(id, radius), reg.within_radius(id, radius));
            }
        }
    }

    #[test]
    fn test_grid_matches_scan() {
        let mut points = Vec::new();
        for i in 0..60u32 {
            let lat = 26.14 + 0.0013 * (i % 8) as f64;
            let lon = 91.73 - 0.0017 * (i / 8) as f64;
            points.push((i * 3, lat, lon));
        }
        let reg = registry(&points);
        let grid = GridIndex::build(&reg, 0.005);
        assert_eq!(grid.len(), 60);

        for radius in [0.0, 0.002, 0.005, 0.011, 1.0] {
            for id in reg.ids() {
                assert_eq!(
                    grid.within_radius(id, radius),
                    reg.within_radius(id, radius),
                    "unit {id} radius {radius}"
                );
            }
        }
    }
}
