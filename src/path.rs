use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::tile::Tile;

/// How tile files are arranged below `{cache_root}/{tile_map}`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CacheLayout {
    /// One directory level per zoom level, named by the quadrant digit (0-3)
    /// of the tile's ancestor at that level.
    Quadtree,
    /// All files directly in the tile map directory.
    Flat,
}

impl Default for CacheLayout {
    fn default() -> Self {
        CacheLayout::Quadtree
    }
}

/// Quadrant digits of `tile` from zoom level 1 down to `tile.z`.
///
/// Each digit is `x_bit + 2 * y_bit` for the bit of the index belonging to
/// that level. Zoom 0 has no digits.
pub fn level_path(tile: &Tile) -> Vec<u8> {
    (1..=tile.z)
        .rev()
        .map(|level| {
            let shift = u32::from(level - 1);
            let x_bit = (tile.x.checked_shr(shift).unwrap_or(0) & 1) as u8;
            let y_bit = (tile.y.checked_shr(shift).unwrap_or(0) & 1) as u8;
            x_bit + 2 * y_bit
        })
        .collect()
}

/// `{tile_map}_{zz}_{xxxxxxxx}_{yyyyyyyy}.{format}`, fixed width so listings
/// sort by zoom and then by coordinate. Out-of-range values are clamped to
/// all nines.
pub fn file_name(tile_map: &str, tile: &Tile, format: &str) -> String {
    const MAX_INDEX: usize = 99_999_999;

    format!(
        "{}_{:02}_{:08}_{:08}.{}",
        tile_map,
        tile.z.min(99),
        tile.x.min(MAX_INDEX),
        tile.y.min(MAX_INDEX),
        format
    )
}

/// Location of `tile` inside the cache.
pub fn tile_path(
    cache_root: &Path,
    tile_map: &str,
    tile: &Tile,
    format: &str,
    layout: CacheLayout,
) -> PathBuf {
    let mut path = cache_root.join(tile_map);

    if layout == CacheLayout::Quadtree {
        for digit in level_path(tile) {
            path.push(digit.to_string());
        }
    }

    path.push(file_name(tile_map, tile, format));
    path
}
