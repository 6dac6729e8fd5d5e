use crate::bounding_box::{check_zoom_range, BoundingBox};
use crate::error::RegionError;
use crate::geometry::{GeoRegion, GeometryFilter, IntersectionTest};
use crate::tile::Tile;

/// The area to download.
#[derive(Clone, Debug, PartialEq)]
pub enum Region {
    BoundingBox(BoundingBox),
    Geometry(GeoRegion),
}

impl Region {
    /// All tiles covering the region from `min_zoom` to `max_zoom`.
    pub fn tiles<T: IntersectionTest>(
        &self,
        min_zoom: u8,
        max_zoom: u8,
        filter: &GeometryFilter<T>,
    ) -> Result<Vec<Tile>, RegionError> {
        check_zoom_range(min_zoom, max_zoom)?;

        let tiles = match self {
            Region::BoundingBox(bbox) => bbox.tiles(min_zoom, max_zoom).collect(),
            Region::Geometry(geometry) => filter.tiles(geometry, min_zoom, max_zoom),
        };

        Ok(tiles)
    }
}

impl From<BoundingBox> for Region {
    fn from(bbox: BoundingBox) -> Self {
        Region::BoundingBox(bbox)
    }
}

impl From<GeoRegion> for Region {
    fn from(geometry: GeoRegion) -> Self {
        Region::Geometry(geometry)
    }
}
