//! Download map tiles covering a region into a deterministic on-disk cache.
//!
//! **Use with absolute caution.** Downloading tiles en-masse can hog
//! down a tile server easily. Check the usage policy of the server
//! you're downloading from first.
//!
//! # Usage
//!
//! The crate ships a CLI you can access via `-h` / `--help`. It is also
//! available as a library.
//!
//! Regions are either a bounding box or a GeoJSON polygon / multi-polygon.
//! Tiles are stored as
//! `{cache}/{tile map}/{quadrant digits...}/{tile map}_{zz}_{xxxxxxxx}_{yyyyyyyy}.{format}`
//! with one directory per zoom level, so no directory ever holds more than
//! four subdirectories. Tiles already present in the cache are skipped,
//! which makes every download safe to re-run.
//!
//! # CLI Example
//!
//! ```bash
//! tile-cache-downloader \
//!   --url "https://{s}.tile.openstreetmap.de/{z}/{x}/{y}.png" \
//!   --subdomains a,b,c \
//!   --north 50.811 \
//!   --east 6.1649 \
//!   --south 50.7492 \
//!   --west 6.031 \
//!   --output ./tiles \
//!   --rate 10
//! ```
//!
//! # Library Example
//! ```rust,no_run
//! use tile_cache_downloader::{BoundingBox, Config, Downloader, Region, TileMapConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     cache_dir: "./tiles".into(),
//!     tile_maps: vec![TileMapConfig {
//!         name: "osm".into(),
//!         url: "https://{s}.tile.openstreetmap.de/{z}/{x}/{y}.png".into(),
//!         subdomains: vec!["a".into(), "b".into(), "c".into()],
//!         format: "png".into(),
//!     }],
//!     concurrency: 10,
//!     ..Config::default()
//! };
//!
//! let downloader = Downloader::new(config)?
//!     .on_progress(|stats, percent| eprintln!("{}% ({} failed)", percent, stats.failed_tiles));
//!
//! let region = Region::from(BoundingBox::new(6.031, 50.7492, 6.1649, 50.811)?);
//! let stats = downloader.download_region("osm", &region, 1, 12).await?;
//! println!("downloaded {} tiles", stats.downloaded_tiles);
//! # Ok(())
//! # }
//! ```

mod bounding_box;
mod config;
mod error;
mod fetch;
mod geometry;
mod path;
mod region;
mod source;
mod stats;
mod tile;
mod url;

pub use bounding_box::{check_zoom_range, BoundingBox, Fixture};
pub use config::{Config, TileMapConfig};
pub use error::{Error, FetchError, RegionError, Result};
pub use fetch::{DownloadTask, Downloader, ProgressSink};
pub use geometry::{
    Feature, GeoIntersects, GeoRegion, GeometryFilter, IntersectionTest,
    DEFAULT_LARGE_REGION_THRESHOLD,
};
pub use path::{file_name, level_path, tile_path, CacheLayout};
pub use region::Region;
pub use source::{HttpSource, TileSource};
pub use stats::{Outcome, Statistics};
pub use tile::{Tile, TileBounds, MAX_ZOOM};
pub use url::UrlFormat;
