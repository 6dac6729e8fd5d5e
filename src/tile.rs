use geo::{polygon, Polygon};
use std::{f64::consts::PI, fmt};

/// Highest zoom level whose tile indices still fit the enumeration code.
pub const MAX_ZOOM: u8 = 30;

/// An OSM slippy-map tile with x, y and z-coordinate.
/// ref: https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
    pub z: u8,
}

/// The area covered by a tile, in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl TileBounds {
    pub fn center(&self) -> (f64, f64) {
        ((self.south + self.north) / 2_f64, (self.west + self.east) / 2_f64)
    }

    /// The closed ring through the four corners of the tile.
    pub fn to_polygon(&self) -> Polygon<f64> {
        polygon![
            (x: self.west, y: self.south),
            (x: self.east, y: self.south),
            (x: self.east, y: self.north),
            (x: self.west, y: self.north),
            (x: self.west, y: self.south),
        ]
    }
}

impl Tile {
    pub fn new(x: usize, y: usize, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Projects a coordinate in degrees onto the tile containing it.
    ///
    /// No clamping happens here. Latitudes outside roughly ±85.0511° have no
    /// Web-Mercator tile; the float-to-index cast saturates them to the first
    /// or last representable index.
    pub fn from_coords_and_zoom(lat_deg: f64, lon_deg: f64, zoom: u8) -> Self {
        let (x, y) = fractional_index(lat_deg, lon_deg, zoom);
        Self::new(x.floor() as usize, y.floor() as usize, zoom)
    }

    /// Inverse projection of the tile's corners.
    pub fn bounds(&self) -> TileBounds {
        let (west, north) = corner_coords(self.x as f64, self.y as f64, self.z);
        let (east, south) = corner_coords((self.x + 1) as f64, (self.y + 1) as f64, self.z);

        TileBounds {
            west,
            south,
            east,
            north,
        }
    }

    /// Number of tiles along one axis at `zoom`.
    pub fn axis_len(zoom: u8) -> usize {
        1_usize << zoom
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

fn fractional_index(lat_deg: f64, lon_deg: f64, zoom: u8) -> (f64, f64) {
    // scale factor
    let n = 2_f64.powi(zoom as i32);
    let lat_rad = lat_deg.to_radians();

    let x = (lon_deg + 180_f64) / 360_f64 * n;
    let y = (1_f64 - (lat_rad.tan() + 1_f64 / lat_rad.cos()).ln() / PI) / 2_f64 * n;

    (x, y)
}

/// Longitude and latitude of the north-west corner of tile `(x, y)`.
fn corner_coords(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let n = 2_f64.powi(zoom as i32);
    let lon = x / n * 360_f64 - 180_f64;
    let lat = (PI * (1_f64 - 2_f64 * y / n)).sinh().atan().to_degrees();

    (lon, lat)
}
