use serde::Deserialize;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{Error, Result};
use crate::geometry::DEFAULT_LARGE_REGION_THRESHOLD;
use crate::path::CacheLayout;
use crate::url::UrlFormat;

/// A remote tile source.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TileMapConfig {
    /// Unique key, also the name of the tile map's cache directory.
    pub name: String,

    /// The URL to download individual tiles from including the replacement
    /// specifiers `{x}`, `{y}`, `{z}` and optionally `{s}`.
    pub url: String,

    /// Candidates for `{s}`, one is picked at random per request.
    #[serde(default)]
    pub subdomains: Vec<String>,

    /// File extension of the cached tiles.
    #[serde(default = "default_format")]
    pub format: String,
}

impl TileMapConfig {
    pub fn url_format(&self) -> Result<UrlFormat> {
        UrlFormat::new(self.url.clone(), self.subdomains.clone())
    }
}

/// Tile fetching configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// The folder the cache lives in.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default)]
    pub tile_maps: Vec<TileMapConfig>,

    /// Maximum number of parallel downloads.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout for fetching a single tile in seconds, 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Feature rectangles with more candidate tiles than this skip the
    /// per-tile intersection test.
    #[serde(default = "default_large_region_threshold")]
    pub large_region_threshold: usize,

    /// Whether to download tiles that are already cached.
    #[serde(default)]
    pub fetch_existing: bool,

    #[serde(default)]
    pub layout: CacheLayout,
}

fn default_format() -> String {
    "png".to_owned()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_concurrency() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_large_region_threshold() -> usize {
    DEFAULT_LARGE_REGION_THRESHOLD
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            tile_maps: Vec::new(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            large_region_threshold: default_large_region_threshold(),
            fetch_existing: false,
            layout: CacheLayout::default(),
        }
    }
}

impl Config {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;

        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig("concurrency must be > 0".to_owned()));
        }

        let mut names = HashSet::new();
        for tile_map in &self.tile_maps {
            if tile_map.name.is_empty() {
                return Err(Error::InvalidConfig("tile map without a name".to_owned()));
            }

            if !names.insert(tile_map.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate tile map `{}`",
                    tile_map.name
                )));
            }

            tile_map.url_format()?;
        }

        Ok(())
    }

    /// Looks up a tile map by its name.
    pub fn tile_map(&self, name: &str) -> Result<&TileMapConfig> {
        self.tile_maps
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| Error::UnknownTileMap(name.to_owned()))
    }

    /// Per-request timeout, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "cacheDir": "/var/cache/tiles",
        "concurrency": 8,
        "tileMaps": [
            {
                "name": "osm",
                "url": "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
                "subdomains": ["a", "b", "c"]
            },
            {
                "name": "sat",
                "url": "https://sat.example/{z}/{y}/{x}",
                "format": "jpg"
            }
        ]
    }"#;

    #[test]
    fn parses_with_defaults() {
        let config = Config::from_json(SAMPLE).unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/tiles"));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.large_region_threshold, 10_000);
        assert_eq!(config.layout, CacheLayout::Quadtree);
        assert!(!config.fetch_existing);
        assert_eq!(config.tile_map("osm").unwrap().format, "png");
        assert_eq!(config.tile_map("sat").unwrap().format, "jpg");
    }

    #[test]
    fn unknown_tile_map() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert!(matches!(
            config.tile_map("nope"),
            Err(Error::UnknownTileMap(name)) if name == "nope"
        ));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let config = Config::from_json(r#"{ "timeoutSecs": 0, "layout": "flat" }"#).unwrap();
        assert_eq!(config.timeout(), None);
        assert_eq!(config.layout, CacheLayout::Flat);
    }

    #[test]
    fn rejects_invalid_configs() {
        assert!(Config::from_json(r#"{ "concurrency": 0 }"#).is_err());
        assert!(Config::from_json(
            r#"{ "tileMaps": [
                { "name": "a", "url": "http://x/{z}/{x}/{y}" },
                { "name": "a", "url": "http://y/{z}/{x}/{y}" }
            ] }"#
        )
        .is_err());
        assert!(Config::from_json(
            r#"{ "tileMaps": [{ "name": "a", "url": "http://{s}/{z}/{x}/{y}" }] }"#
        )
        .is_err());
    }
}
