//! Tile coverage for arbitrary polygonal regions.

use geo::{BoundingRect, Geometry, Intersects, Polygon};
use geojson::GeoJson;
use std::collections::HashSet;
use tracing::debug;

use crate::bounding_box::BoundingBox;
use crate::error::RegionError;
use crate::tile::Tile;

/// Candidate rectangles with more tiles than this are accepted whole instead
/// of being tested tile by tile.
pub const DEFAULT_LARGE_REGION_THRESHOLD: usize = 10_000;

/// One polygonal feature of a [`GeoRegion`].
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub name: Option<String>,
    /// Always a `Polygon` or `MultiPolygon`.
    pub geometry: Geometry<f64>,
}

/// A region made of one or more polygonal features, in input order.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoRegion {
    features: Vec<Feature>,
}

impl GeoRegion {
    /// Wraps a single geometry. Geometry collections are flattened into one
    /// feature per member.
    pub fn from_geometry(geometry: Geometry<f64>) -> Result<Self, RegionError> {
        let mut features = Vec::new();
        push_geometry(&mut features, None, geometry)?;
        Self::from_features(features)
    }

    /// Drops features without any coordinates. Fails if a feature reaches
    /// outside [-180, 180] x [-90, 90].
    pub fn from_features(features: Vec<Feature>) -> Result<Self, RegionError> {
        let mut kept = Vec::with_capacity(features.len());
        for feature in features {
            let rect = match feature.geometry.bounding_rect() {
                Some(rect) => rect,
                None => continue,
            };

            for corner in [rect.min(), rect.max()] {
                if !(-180_f64..=180_f64).contains(&corner.x)
                    || !(-90_f64..=90_f64).contains(&corner.y)
                {
                    return Err(RegionError::CoordinateOutOfRange {
                        lon: corner.x,
                        lat: corner.y,
                    });
                }
            }

            kept.push(feature);
        }

        if kept.is_empty() {
            return Err(RegionError::EmptyGeometry);
        }

        Ok(Self { features: kept })
    }

    /// Parses a GeoJSON document: a bare geometry, a feature or a feature
    /// collection. The `name` property of a feature is kept for logging.
    pub fn from_geojson_str(s: &str) -> Result<Self, RegionError> {
        let geojson = s
            .parse::<GeoJson>()
            .map_err(|e| RegionError::InvalidGeoJson(e.to_string()))?;

        let mut features = Vec::new();
        match geojson {
            GeoJson::Geometry(g) => push_geojson_geometry(&mut features, None, g)?,
            GeoJson::Feature(f) => push_geojson_feature(&mut features, f)?,
            GeoJson::FeatureCollection(fc) => {
                for f in fc.features {
                    push_geojson_feature(&mut features, f)?;
                }
            }
        }

        Self::from_features(features)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }
}

fn push_geojson_feature(
    out: &mut Vec<Feature>,
    feature: geojson::Feature,
) -> Result<(), RegionError> {
    let name = feature
        .property("name")
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    match feature.geometry {
        Some(g) => push_geojson_geometry(out, name, g),
        None => Ok(()),
    }
}

fn push_geojson_geometry(
    out: &mut Vec<Feature>,
    name: Option<String>,
    geometry: geojson::Geometry,
) -> Result<(), RegionError> {
    let geometry = Geometry::<f64>::try_from(geometry)
        .map_err(|e| RegionError::InvalidGeoJson(e.to_string()))?;
    push_geometry(out, name, geometry)
}

fn push_geometry(
    out: &mut Vec<Feature>,
    name: Option<String>,
    geometry: Geometry<f64>,
) -> Result<(), RegionError> {
    match geometry {
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
            out.push(Feature { name, geometry });
        }
        Geometry::GeometryCollection(collection) => {
            for member in collection {
                push_geometry(out, name.clone(), member)?;
            }
        }
        other => {
            return Err(RegionError::UnsupportedGeometry(
                geometry_type(&other).to_owned(),
            ))
        }
    }

    Ok(())
}

fn geometry_type(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Decides whether a feature touches a tile.
pub trait IntersectionTest {
    fn intersects(&self, feature: &Geometry<f64>, tile: &Polygon<f64>) -> bool;
}

/// Exact intersection via the `geo` predicates.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeoIntersects;

impl IntersectionTest for GeoIntersects {
    fn intersects(&self, feature: &Geometry<f64>, tile: &Polygon<f64>) -> bool {
        feature.intersects(tile)
    }
}

/// Computes the tiles intersecting a [`GeoRegion`].
#[derive(Clone, Debug)]
pub struct GeometryFilter<T = GeoIntersects> {
    large_region_threshold: usize,
    test: T,
}

impl Default for GeometryFilter {
    fn default() -> Self {
        Self::new(DEFAULT_LARGE_REGION_THRESHOLD)
    }
}

impl GeometryFilter {
    pub fn new(large_region_threshold: usize) -> Self {
        Self::with_test(large_region_threshold, GeoIntersects)
    }
}

impl<T: IntersectionTest> GeometryFilter<T> {
    pub fn with_test(large_region_threshold: usize, test: T) -> Self {
        Self {
            large_region_threshold,
            test,
        }
    }

    /// All tiles from `min_zoom` to `max_zoom` touching any feature of
    /// `region`, without duplicates.
    ///
    /// Zoom levels are visited in ascending order and features in input
    /// order; the first feature to claim a tile keeps it and later features
    /// never test it again. A feature whose candidate rectangle exceeds the
    /// large-region threshold contributes its whole rectangle untested, so
    /// the result may over-include tiles but never misses one.
    pub fn tiles(&self, region: &GeoRegion, min_zoom: u8, max_zoom: u8) -> Vec<Tile> {
        let mut seen = HashSet::new();
        let mut tiles = Vec::new();

        for zoom in min_zoom..=max_zoom {
            for feature in region.features() {
                let rect = match feature.geometry.bounding_rect() {
                    Some(rect) => rect,
                    None => continue,
                };

                let bbox = BoundingBox {
                    min_lon: rect.min().x,
                    min_lat: rect.min().y,
                    max_lon: rect.max().x,
                    max_lat: rect.max().y,
                };
                let (x_min, x_max, y_min, y_max) = bbox.tile_range(zoom);
                let potential = (x_max - x_min + 1) * (y_max - y_min + 1);
                let accept_all = potential > self.large_region_threshold;

                if accept_all {
                    debug!(
                        zoom,
                        potential,
                        feature = ?feature.name,
                        "large region, accepting bounding box without intersection tests"
                    );
                }

                for x in x_min..=x_max {
                    for y in y_min..=y_max {
                        let tile = Tile::new(x, y, zoom);
                        if seen.contains(&tile) {
                            continue;
                        }

                        if accept_all
                            || self
                                .test
                                .intersects(&feature.geometry, &tile.bounds().to_polygon())
                        {
                            seen.insert(tile);
                            tiles.push(tile);
                        }
                    }
                }
            }
        }

        tiles
    }
}
