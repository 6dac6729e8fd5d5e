use std::path::PathBuf;

use thiserror::Error;

/// A specialized [`Result`] type for downloader operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that abort a whole operation before or instead of any tile work.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown tile map `{0}`")]
    UnknownTileMap(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid URL template `{template}`: {reason}")]
    InvalidUrlTemplate { template: String, reason: String },
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error("failed reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed creating HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tile planning did not complete: {0}")]
    Planning(#[from] tokio::task::JoinError),
}

/// Problems with the region or zoom range handed to an operation.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("invalid bounding box [{min_lon}, {min_lat}, {max_lon}, {max_lat}]")]
    InvalidBoundingBox {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },
    #[error("invalid zoom range {min}..={max}")]
    ZoomRange { min: u8, max: u8 },
    #[error("geometry contains no polygons")]
    EmptyGeometry,
    #[error("unsupported geometry type `{0}`, expected Polygon or MultiPolygon")]
    UnsupportedGeometry(String),
    #[error("invalid GeoJSON: {0}")]
    InvalidGeoJson(String),
    #[error("coordinate ({lon}, {lat}) outside [-180, 180] x [-90, 90]")]
    CoordinateOutOfRange { lon: f64, lat: f64 },
}

/// Failure of a single tile. Never escapes the tile's own task.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("failed writing {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
