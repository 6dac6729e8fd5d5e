use std::fmt::Debug;

use crate::error::RegionError;
use crate::tile::{Tile, MAX_ZOOM};

/// A bounding box given in degrees as `[min_lon, min_lat, max_lon, max_lat]`.
///
/// # Example
/// ```rust
/// # use tile_cache_downloader::BoundingBox;
/// let aachen_germany = BoundingBox::new(6.031, 50.7492, 6.1649, 50.811).unwrap();
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box from coordinates in degrees.
    ///
    /// Fails unless `min_lon < max_lon`, `min_lat < max_lat`, longitudes lie
    /// in [-180, 180] and latitudes in [-90, 90].
    pub fn new(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Self, RegionError> {
        let lon_ok = |v: f64| (-180_f64..=180_f64).contains(&v);
        let lat_ok = |v: f64| (-90_f64..=90_f64).contains(&v);

        if !(lon_ok(min_lon)
            && lon_ok(max_lon)
            && lat_ok(min_lat)
            && lat_ok(max_lat)
            && min_lon < max_lon
            && min_lat < max_lat)
        {
            return Err(RegionError::InvalidBoundingBox {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            });
        }

        Ok(BoundingBox {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Inclusive tile index ranges `(x_min, x_max, y_min, y_max)` covering
    /// the box at `zoom`.
    ///
    /// The north-west and south-east corners are projected independently and
    /// the result is clamped to the valid index range of the zoom level.
    /// Both ranges are ordered, even for boxes built by hand from
    /// unvalidated coordinates.
    pub fn tile_range(&self, zoom: u8) -> (usize, usize, usize, usize) {
        let last = Tile::axis_len(zoom) - 1;
        let nw = Tile::from_coords_and_zoom(self.max_lat, self.min_lon, zoom);
        let se = Tile::from_coords_and_zoom(self.min_lat, self.max_lon, zoom);

        let (x_min, x_max) = (nw.x.min(se.x), nw.x.max(se.x));
        let (y_min, y_max) = (nw.y.min(se.y), nw.y.max(se.y));

        (x_min.min(last), x_max.min(last), y_min.min(last), y_max.min(last))
    }

    /// Creates an iterator iterating over all tiles in the bounding box.
    ///
    /// Call [`check_zoom_range`] first; an inverted range simply yields
    /// nothing.
    pub fn tiles(
        &self,
        min_zoom: u8,
        max_zoom: u8,
    ) -> impl Iterator<Item = Tile> + Debug {
        let bbox = *self;

        (min_zoom..=max_zoom).flat_map(move |zoom| {
            let (x_min, x_max, y_min, y_max) = bbox.tile_range(zoom);

            (x_min..=x_max).flat_map(move |x| {
                (y_min..=y_max).map(move |y| Tile::new(x, y, zoom))
            })
        })
    }
}

/// Rejects inverted zoom ranges and zooms the index math cannot represent.
pub fn check_zoom_range(min_zoom: u8, max_zoom: u8) -> Result<(), RegionError> {
    if min_zoom > max_zoom || max_zoom > MAX_ZOOM {
        return Err(RegionError::ZoomRange {
            min: min_zoom,
            max: max_zoom,
        });
    }

    Ok(())
}

/// A bounding box fixture containing preset coordinates for a known geographic
/// region (a continent, country, city, etc).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Fixture {
    USA,
    AachenGermany,
    LowerManhattan,
}

impl std::str::FromStr for Fixture {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Fixture::*;

        let s = s.to_lowercase();

        if s.starts_with("us") {
            return Ok(USA);
        }

        if s.starts_with("aachen") {
            return Ok(AachenGermany);
        }

        if s.starts_with("manhattan") || s.starts_with("nyc") {
            return Ok(LowerManhattan);
        }

        Err("unrecognized fixture")
    }
}

impl std::convert::From<Fixture> for BoundingBox {
    fn from(fixture: Fixture) -> Self {
        use Fixture::*;

        let (min_lon, min_lat, max_lon, max_lat) = match fixture {
            USA => (-125.3321, 23.8991, -65.7421, 49.4325),
            AachenGermany => (6.031, 50.7492, 6.1649, 50.811),
            LowerManhattan => (-74.01, 40.70, -73.96, 40.75),
        };

        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }
}
