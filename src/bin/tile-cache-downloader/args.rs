use anyhow::{anyhow, bail, Context, Result};
use clap::{
    app_from_crate, crate_authors, crate_description, crate_name, crate_version,
    AppSettings, Arg, ArgMatches,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::validators::*;
use tile_cache_downloader::{
    BoundingBox, CacheLayout, Config, Fixture, GeoRegion, Region, TileMapConfig,
};

const CONFIG_ARG: &str = "config";
const TILE_MAP_ARG: &str = "tile_map";
const URL_ARG: &str = "url";
const NAME_ARG: &str = "name";
const FORMAT_ARG: &str = "format";
const SUBDOMAINS_ARG: &str = "subdomains";
const ZOOM_ARG: &str = "zoom";
const OUTPUT_DIR_ARG: &str = "output_dir";
const BBOX_FIXTURE_ARG: &str = "fixture";
const GEOJSON_ARG: &str = "geojson";
const BBOX_NORTH_ARG: &str = "north";
const BBOX_SOUTH_ARG: &str = "south";
const BBOX_WEST_ARG: &str = "west";
const BBOX_EAST_ARG: &str = "east";
const MIN_ZOOM_ARG: &str = "min_zoom";
const MAX_ZOOM_ARG: &str = "max_zoom";
const TIMEOUT_ARG: &str = "timeout";
const DRY_RUN_ARG: &str = "dry_run";
const RETRIES_ARG: &str = "num_retries";
const PARALLEL_FETCHES_ARG: &str = "num_parallel";
const FETCH_EXISTING_ARG: &str = "should_fetch_existing";
const FLAT_ARG: &str = "flat";

/// Everything the binary needs to run one download.
pub struct Args {
    pub config: Config,
    pub tile_map: String,
    pub region: Region,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub retries: u8,
    pub dry_run: bool,
}

impl Args {
    pub fn parse() -> Result<Self> {
        let matches = get_matches();

        let (min_zoom, max_zoom) = match matches.value_of(ZOOM_ARG) {
            // if `zoom` is set, use it for both min/max
            Some(val) => {
                let zoom = val.parse()?;
                (zoom, zoom)
            }
            // otherwise, parse min/max separately
            None => (
                parse_value(&matches, MIN_ZOOM_ARG)?,
                parse_value(&matches, MAX_ZOOM_ARG)?,
            ),
        };

        let mut config = match matches.value_of(CONFIG_ARG) {
            Some(path) => Config::load(Path::new(path))
                .with_context(|| format!("failed loading config from {}", path))?,
            None => Config::default(),
        };

        if let Some(url) = matches.value_of(URL_ARG) {
            config.tile_maps.push(TileMapConfig {
                name: parse_value(&matches, NAME_ARG)?,
                url: url.to_owned(),
                subdomains: matches
                    .values_of(SUBDOMAINS_ARG)
                    .map(|v| v.map(str::to_owned).collect())
                    .unwrap_or_default(),
                format: parse_value(&matches, FORMAT_ARG)?,
            });
        }

        if let Some(output_dir) = matches.value_of(OUTPUT_DIR_ARG) {
            config.cache_dir = PathBuf::from(output_dir);
        }
        if let Some(rate) = matches.value_of(PARALLEL_FETCHES_ARG) {
            config.concurrency = rate.parse()?;
        }
        if let Some(timeout) = matches.value_of(TIMEOUT_ARG) {
            config.timeout_secs = timeout.parse()?;
        }
        if matches.is_present(FETCH_EXISTING_ARG) {
            config.fetch_existing = true;
        }
        if matches.is_present(FLAT_ARG) {
            config.layout = CacheLayout::Flat;
        }

        config.validate().context("invalid configuration")?;

        let tile_map = match matches.value_of(TILE_MAP_ARG) {
            Some(name) => name.to_owned(),
            // an ad-hoc URL always wins over the config file
            None if matches.is_present(URL_ARG) => parse_value(&matches, NAME_ARG)?,
            None => match config.tile_maps.as_slice() {
                [only] => only.name.clone(),
                _ => bail!("--tile-map is required unless exactly one tile map is configured"),
            },
        };

        Ok(Self {
            region: parse_region(&matches)?,
            tile_map,
            config,
            min_zoom,
            max_zoom,
            retries: parse_value(&matches, RETRIES_ARG)?,
            dry_run: matches.is_present(DRY_RUN_ARG),
        })
    }
}

fn parse_region(matches: &ArgMatches<'_>) -> Result<Region> {
    if let Some(path) = matches.value_of(GEOJSON_ARG) {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading GeoJSON from {}", path))?;
        let geometry = GeoRegion::from_geojson_str(&raw)
            .with_context(|| format!("failed parsing GeoJSON from {}", path))?;
        return Ok(geometry.into());
    }

    let bbox = match matches.value_of(BBOX_FIXTURE_ARG) {
        // if a fixture is specified, construct the bounding box from that
        Some(f) => BoundingBox::from(f.parse::<Fixture>().map_err(|e| anyhow!(e))?),
        // otherwise, parse the 4 coords separately
        None => BoundingBox::new(
            parse_value(matches, BBOX_WEST_ARG)?,
            parse_value(matches, BBOX_SOUTH_ARG)?,
            parse_value(matches, BBOX_EAST_ARG)?,
            parse_value(matches, BBOX_NORTH_ARG)?,
        )?,
    };

    Ok(bbox.into())
}

fn parse_value<T>(matches: &ArgMatches<'_>, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = matches
        .value_of(name)
        .ok_or_else(|| anyhow!("missing argument {}", name))?;

    raw.parse()
        .with_context(|| format!("invalid value `{}` for {}", raw, name))
}

fn get_matches() -> ArgMatches<'static> {
    app_from_crate!()
        .setting(AppSettings::GlobalVersion)
        .setting(AppSettings::VersionlessSubcommands)
        .arg(
            Arg::with_name(CONFIG_ARG)
                .help("JSON file listing the tile maps and downloader settings")
                .takes_value(true)
                .short("c")
                .long("config"),
        )
        .arg(
            Arg::with_name(TILE_MAP_ARG)
                .help("Name of the tile map to download")
                .takes_value(true)
                .short("m")
                .long("tile-map"),
        )
        .arg(
            Arg::with_name(URL_ARG)
                .help("The URL with format specifiers `{x}`, `{y}`, `{z}` to fetch the tiles from. Also supports the format specifier `{s}` which is replaced with one of --subdomains at random to spread the load between different servers.")
                .required_unless(CONFIG_ARG)
                .takes_value(true)
                .short("u")
                .long("url"),
        )
        .arg(
            Arg::with_name(NAME_ARG)
                .help("Name of the tile map given via --url, also its cache folder")
                .default_value("tiles")
                .takes_value(true)
                .long("name"),
        )
        .arg(
            Arg::with_name(FORMAT_ARG)
                .help("File extension of the tiles given via --url")
                .default_value("png")
                .takes_value(true)
                .long("format"),
        )
        .arg(
            Arg::with_name(SUBDOMAINS_ARG)
                .help("Comma separated values for `{s}` in --url")
                .takes_value(true)
                .use_delimiter(true)
                .long("subdomains"),
        )
        .arg(
            Arg::with_name(BBOX_NORTH_ARG)
                .help("Latitude of north bounding box boundary (in degrees)")
                .required_unless_one(&[BBOX_FIXTURE_ARG, GEOJSON_ARG])
                .validator(is_geo_coord)
                .takes_value(true)
                .allow_hyphen_values(true)
                .short("n")
                .long("north"),
        )
        .arg(
            Arg::with_name(BBOX_SOUTH_ARG)
                .help("Latitude of south bounding box boundary (in degrees)")
                .required_unless_one(&[BBOX_FIXTURE_ARG, GEOJSON_ARG])
                .validator(is_geo_coord)
                .takes_value(true)
                .allow_hyphen_values(true)
                .short("s")
                .long("south"),
        )
        .arg(
            Arg::with_name(BBOX_EAST_ARG)
                .help("Longitude of east bounding box boundary (in degrees)")
                .required_unless_one(&[BBOX_FIXTURE_ARG, GEOJSON_ARG])
                .validator(is_geo_coord)
                .takes_value(true)
                .allow_hyphen_values(true)
                .short("e")
                .long("east"),
        )
        .arg(
            Arg::with_name(BBOX_WEST_ARG)
                .help("Longitude of west bounding box boundary (in degrees)")
                .required_unless_one(&[BBOX_FIXTURE_ARG, GEOJSON_ARG])
                .validator(is_geo_coord)
                .takes_value(true)
                .allow_hyphen_values(true)
                .short("w")
                .long("west"),
        )
        .arg(
            Arg::with_name(BBOX_FIXTURE_ARG)
                .help("Use a known, named bounding box (USA, Aachen, NYC)")
                .validator(is_bb_fixture)
                .conflicts_with(GEOJSON_ARG)
                .takes_value(true)
                .short("f")
                .long("fixture"),
        )
        .arg(
            Arg::with_name(GEOJSON_ARG)
                .help("GeoJSON file with the Polygon / MultiPolygon features to download")
                .takes_value(true)
                .short("g")
                .long("geojson"),
        )
        .arg(
            Arg::with_name(PARALLEL_FETCHES_ARG)
                .help("The amount of tiles fetched in parallel. Defaults to the config value (5).")
                .validator(is_numeric_min(1))
                .takes_value(true)
                .short("r")
                .long("rate"),
        )
        .arg(
            Arg::with_name(RETRIES_ARG)
                .help("How many times to download the failed tiles again after the first pass.")
                .validator(is_numeric_min(0))
                .default_value("0")
                .takes_value(true)
                .long("retries"),
        )
        .arg(
            Arg::with_name(TIMEOUT_ARG)
                .help("The timeout (in seconds) for fetching a single tile. Pass 0 for no timeout. Defaults to the config value (30).")
                .validator(is_numeric_min(0))
                .takes_value(true)
                .short("t")
                .long("timeout"),
        )
        .arg(
            Arg::with_name(MIN_ZOOM_ARG)
                .help("The minimum zoom level to fetch")
                .validator(is_zoom)
                .default_value("1")
                .takes_value(true)
                .long("min-zoom"),
        )
        .arg(
            Arg::with_name(MAX_ZOOM_ARG)
                .help("The maximum zoom level to fetch")
                .validator(is_zoom)
                .default_value("18")
                .takes_value(true)
                .long("max-zoom"),
        )
        .arg(
            Arg::with_name(ZOOM_ARG)
                .help("Only fetch a single zoom level (implies min=x/max=x)")
                .validator(is_zoom)
                .takes_value(true)
                .long("zoom")
                .short("z"),
        )
        .arg(
            Arg::with_name(OUTPUT_DIR_ARG)
                .help("The cache folder, overrides the config value.")
                .takes_value(true)
                .short("o")
                .long("output"),
        )
        .arg(
            Arg::with_name(FETCH_EXISTING_ARG)
                .help("Fetch tiles that we've already downloaded (this usually isn't required)")
                .required(false)
                .takes_value(false)
                .long("fetch-existing"),
        )
        .arg(
            Arg::with_name(FLAT_ARG)
                .help("Put all tiles of a tile map into one folder instead of one folder per zoom level")
                .required(false)
                .takes_value(false)
                .long("flat"),
        )
        .arg(
            Arg::with_name(DRY_RUN_ARG)
                .help("Don't actually fetch anything, just determine how many tiles would be fetched.")
                .required(false)
                .takes_value(false)
                .long("dry-run"),
        )
        .get_matches()
}
