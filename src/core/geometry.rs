//! Turning an open coastline into closed land (or sea) polygons.
//!
//! A coastline clipped to the area of interest is an open line. Three closing
//! lines run from its north-most vertex out to one side of the AOI, down that
//! side, and back to its south-most vertex. The polygonizer then keeps only
//! what forms a closed ring.

use crate::domain::model::{Aoi, MaskTarget};
use crate::utils::error::{EtlError, Result};
use geo::{BooleanOps, BoundingRect, Centroid, Coord, LineString, MultiLineString, Polygon};
use geojson::{GeoJson, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Center longitude of Saudi Arabia; AOIs east of it face the Persian Gulf.
pub const DEFAULT_REFERENCE_LONGITUDE: f64 = 45.0792;

/// Vertices closer than this (in CRS units) are treated as the same node.
const NODE_PRECISION: f64 = 1e-9;

/// Polygon of the first feature. MultiPolygons contribute their first member.
pub fn load_aoi(text: &str) -> Result<Aoi> {
    let geojson: GeoJson = text.parse()?;
    let geometry = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features.into_iter().next().and_then(|f| f.geometry),
        GeoJson::Feature(feature) => feature.geometry,
        GeoJson::Geometry(geometry) => Some(geometry),
    };

    let polygon = match geometry.map(|g| g.value) {
        Some(Value::Polygon(rings)) => polygon_from_rings(&rings),
        Some(Value::MultiPolygon(polygons)) => polygons.first().and_then(|r| polygon_from_rings(r)),
        _ => None,
    }
    .ok_or_else(|| EtlError::ValidationError {
        message: "area of interest must contain a Polygon or MultiPolygon".to_string(),
    })?;

    let bounds = polygon
        .bounding_rect()
        .ok_or_else(|| EtlError::ValidationError {
            message: "area of interest polygon is empty".to_string(),
        })?;

    Ok(Aoi { polygon, bounds })
}

fn line_from_positions(positions: &[Vec<f64>]) -> LineString<f64> {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect::<Vec<_>>()
        .into()
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let mut rings = rings.iter().map(|r| line_from_positions(r));
    let exterior = rings.next()?;
    if exterior.0.len() < 4 {
        return None;
    }
    Some(Polygon::new(exterior, rings.collect()))
}

/// LineString and MultiLineString geometries from any GeoJSON document.
pub fn lines_from_geojson(text: &str) -> Result<Vec<LineString<f64>>> {
    let geojson: GeoJson = text.parse()?;
    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::FeatureCollection(fc) => {
            fc.features.into_iter().filter_map(|f| f.geometry).collect()
        }
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::Geometry(geometry) => vec![geometry],
    };

    let mut lines = Vec::new();
    for geometry in geometries {
        match geometry.value {
            Value::LineString(positions) => lines.push(line_from_positions(&positions)),
            Value::MultiLineString(parts) => {
                lines.extend(parts.iter().map(|p| line_from_positions(p)))
            }
            _ => {}
        }
    }
    lines.retain(|l| l.0.len() >= 2);
    Ok(lines)
}

pub fn is_east_coast(aoi: &Aoi, reference_longitude: f64) -> bool {
    aoi.polygon
        .centroid()
        .map(|c| c.x() > reference_longitude)
        .unwrap_or(false)
}

pub fn clip_coastline(lines: Vec<LineString<f64>>, aoi: &Aoi) -> Vec<LineString<f64>> {
    let clipped = aoi.polygon.clip(&MultiLineString::new(lines), false);
    clipped
        .0
        .into_iter()
        .filter(|l| l.0.len() >= 2)
        .collect()
}

/// North → edge, down the edge, edge → south.
///
/// On an east coast the land lies west, so masking land closes against the
/// AOI's west side; masking the sea closes against the east side. West coasts
/// mirror this.
pub fn closing_lines(
    coastline: &[LineString<f64>],
    aoi: &Aoi,
    east_coast: bool,
    target: MaskTarget,
) -> Result<Vec<LineString<f64>>> {
    let coords = coastline.iter().flat_map(|l| l.coords());
    let mut north: Option<Coord<f64>> = None;
    let mut south: Option<Coord<f64>> = None;
    for c in coords {
        if north.map_or(true, |n| c.y > n.y) {
            north = Some(*c);
        }
        if south.map_or(true, |s| c.y < s.y) {
            south = Some(*c);
        }
    }
    let (Some(north), Some(south)) = (north, south) else {
        return Err(EtlError::CoastlineNotFound);
    };

    let land = target == MaskTarget::Land;
    let edge_x = if east_coast == land {
        aoi.bounds.min().x
    } else {
        aoi.bounds.max().x
    };

    Ok(vec![
        LineString::from(vec![(north.x, north.y), (edge_x, north.y)]),
        LineString::from(vec![(edge_x, north.y), (edge_x, south.y)]),
        LineString::from(vec![(edge_x, south.y), (south.x, south.y)]),
    ])
}

type NodeKey = (i64, i64);

fn node_key(c: Coord<f64>) -> NodeKey {
    (
        (c.x / NODE_PRECISION).round() as i64,
        (c.y / NODE_PRECISION).round() as i64,
    )
}

/// Closed rings formed by the input lines.
///
/// Lines are split into segments and joined where vertices coincide. Dangling
/// branches are pruned away. Every remaining component in which each node has
/// exactly two neighbours becomes one polygon. Components with junctions are
/// ambiguous and are skipped with a warning.
pub fn polygonize(lines: &[LineString<f64>]) -> Vec<Polygon<f64>> {
    let mut coords: BTreeMap<NodeKey, Coord<f64>> = BTreeMap::new();
    let mut adjacency: BTreeMap<NodeKey, BTreeSet<NodeKey>> = BTreeMap::new();

    for line in lines {
        for segment in line.0.windows(2) {
            let (a, b) = (node_key(segment[0]), node_key(segment[1]));
            if a == b {
                continue;
            }
            coords.entry(a).or_insert(segment[0]);
            coords.entry(b).or_insert(segment[1]);
            adjacency.entry(a).or_default().insert(b);
            adjacency.entry(b).or_default().insert(a);
        }
    }

    // prune dangles
    let mut queue: VecDeque<NodeKey> = adjacency
        .iter()
        .filter(|(_, n)| n.len() <= 1)
        .map(|(k, _)| *k)
        .collect();
    while let Some(node) = queue.pop_front() {
        let Some(neighbours) = adjacency.remove(&node) else {
            continue;
        };
        for neighbour in neighbours {
            if let Some(set) = adjacency.get_mut(&neighbour) {
                set.remove(&node);
                if set.len() <= 1 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    let mut visited: BTreeSet<NodeKey> = BTreeSet::new();
    let mut polygons = Vec::new();
    let starts: Vec<NodeKey> = adjacency.keys().copied().collect();
    for start in starts {
        if visited.contains(&start) {
            continue;
        }

        let component = collect_component(&adjacency, start);
        visited.extend(component.iter().copied());

        if component.iter().any(|k| adjacency[k].len() != 2) {
            tracing::warn!(
                nodes = component.len(),
                "Skipping coastline component with junctions"
            );
            continue;
        }

        if let Some(ring) = trace_ring(&adjacency, &coords, start) {
            polygons.push(Polygon::new(ring, vec![]));
        }
    }
    polygons
}

fn collect_component(
    adjacency: &BTreeMap<NodeKey, BTreeSet<NodeKey>>,
    start: NodeKey,
) -> BTreeSet<NodeKey> {
    let mut seen = BTreeSet::from([start]);
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        for next in &adjacency[&node] {
            if seen.insert(*next) {
                stack.push(*next);
            }
        }
    }
    seen
}

fn trace_ring(
    adjacency: &BTreeMap<NodeKey, BTreeSet<NodeKey>>,
    coords: &BTreeMap<NodeKey, Coord<f64>>,
    start: NodeKey,
) -> Option<LineString<f64>> {
    let mut ring = vec![coords[&start]];
    let mut prev = start;
    let mut current = *adjacency[&start].iter().next()?;
    while current != start {
        ring.push(coords[&current]);
        let next = adjacency[&current].iter().find(|n| **n != prev).copied()?;
        prev = current;
        current = next;
        if ring.len() > adjacency.len() + 1 {
            return None;
        }
    }
    ring.push(coords[&start]);
    (ring.len() >= 4).then(|| LineString::from(ring))
}

/// Clip, close and polygonize in one go.
pub fn surface_polygons(
    coastline: Vec<LineString<f64>>,
    aoi: &Aoi,
    east_coast: bool,
    target: MaskTarget,
) -> Result<(Vec<LineString<f64>>, Vec<Polygon<f64>>)> {
    let clipped = clip_coastline(coastline, aoi);
    if clipped.is_empty() {
        return Err(EtlError::CoastlineNotFound);
    }

    let mut lines = clipped.clone();
    lines.extend(closing_lines(&clipped, aoi, east_coast, target)?);
    let polygons = polygonize(&lines);
    if polygons.is_empty() {
        return Err(EtlError::ProcessingError {
            message: format!(
                "{} clipped coastline segments do not close into a polygon inside the area of interest",
                clipped.len()
            ),
        });
    }
    Ok((clipped, polygons))
}
