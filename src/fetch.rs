use futures::{future, prelude::*, stream};
use std::{
    collections::HashMap,
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, TileMapConfig};
use crate::error::{FetchError, Result};
use crate::geometry::GeometryFilter;
use crate::path::tile_path;
use crate::region::Region;
use crate::source::{HttpSource, TileSource};
use crate::stats::{Outcome, Statistics, StatsTracker};
use crate::tile::Tile;
use crate::url::UrlFormat;

/// Callback receiving a statistics snapshot and the rounded completion
/// percentage after every finished tile.
///
/// It runs inline on the task that finished the tile and must not block.
pub type ProgressSink = Box<dyn Fn(&Statistics, u8) + Send + Sync>;

/// One tile of one tile map.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DownloadTask {
    pub tile_map: String,
    pub tile: Tile,
}

struct Target<'a> {
    tile_map: &'a TileMapConfig,
    url: UrlFormat,
}

/// Downloads tiles into the cache and remembers the ones that failed.
///
/// Operations take `&self`, but running two of them at the same time on
/// one downloader mixes their statistics.
///
/// # Example
/// ```rust,no_run
/// use tile_cache_downloader::{BoundingBox, Config, Downloader, Region};
/// # use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::load(Path::new("tile-maps.json"))?;
/// let downloader = Downloader::new(config)?;
///
/// let aachen = Region::from(BoundingBox::new(6.031, 50.7492, 6.1649, 50.811)?);
/// let stats = downloader.download_region("osm", &aachen, 10, 14).await?;
///
/// if stats.failed_tiles > 0 {
///     downloader.retry_failed().await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Downloader<S = HttpSource> {
    config: Config,
    source: S,
    filter: GeometryFilter,
    stats: StatsTracker,
    failed: Mutex<Vec<DownloadTask>>,
    progress: Option<ProgressSink>,
    cancel: CancellationToken,
}

impl Downloader<HttpSource> {
    /// Creates a downloader fetching over HTTP with the configured timeout.
    pub fn new(config: Config) -> Result<Self> {
        let source = HttpSource::new(config.timeout())?;
        Self::with_source(config, source)
    }
}

impl<S: TileSource> Downloader<S> {
    pub fn with_source(config: Config, source: S) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            filter: GeometryFilter::new(config.large_region_threshold),
            config,
            source,
            stats: StatsTracker::default(),
            failed: Mutex::new(Vec::new()),
            progress: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Registers the progress callback.
    pub fn on_progress<F>(mut self, sink: F) -> Self
    where
        F: Fn(&Statistics, u8) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(sink));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cancelling the token stops the current and every later operation
    /// from starting new tiles. Tiles already in flight still finish.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn statistics(&self) -> Statistics {
        self.stats.snapshot()
    }

    /// Tiles that failed during the most recent operation.
    pub fn failed_tasks(&self) -> Vec<DownloadTask> {
        self.failed_set().clone()
    }

    /// Computes the tiles `download_region` would fetch, without fetching.
    ///
    /// CPU-bound for geometry regions; `download_region` runs it on the
    /// blocking pool.
    pub fn plan(&self, region: &Region, min_zoom: u8, max_zoom: u8) -> Result<Vec<Tile>> {
        Ok(region.tiles(min_zoom, max_zoom, &self.filter)?)
    }

    /// Downloads every tile of `region` between the two zoom levels and
    /// waits until all of them finished.
    ///
    /// Tiles that fail do not make this return an error; inspect
    /// [`Statistics::failed_tiles`] and use [`Downloader::retry_failed`].
    pub async fn download_region(
        &self,
        tile_map: &str,
        region: &Region,
        min_zoom: u8,
        max_zoom: u8,
    ) -> Result<Statistics> {
        let target = self.target(tile_map)?;

        let region = region.clone();
        let filter = self.filter.clone();
        let tiles =
            tokio::task::spawn_blocking(move || region.tiles(min_zoom, max_zoom, &filter))
                .await??;

        let tasks = tiles
            .into_iter()
            .map(|tile| DownloadTask {
                tile_map: tile_map.to_owned(),
                tile,
            })
            .collect();

        let mut targets = HashMap::new();
        targets.insert(tile_map.to_owned(), target);

        info!(tile_map, min_zoom, max_zoom, "starting download");
        self.failed_set().clear();
        Ok(self.run(&targets, tasks).await)
    }

    /// Downloads the tiles that failed during the most recent operation
    /// again. When there are none, nothing is fetched and the statistics
    /// are reset to zero.
    pub async fn retry_failed(&self) -> Result<Statistics> {
        let (targets, tasks) = {
            let mut failed = self.failed_set();
            if failed.is_empty() {
                self.stats.reset(0);
                return Ok(self.stats.snapshot());
            }

            let mut targets = HashMap::new();
            for task in failed.iter() {
                if !targets.contains_key(&task.tile_map) {
                    targets.insert(task.tile_map.clone(), self.target(&task.tile_map)?);
                }
            }

            (targets, std::mem::take(&mut *failed))
        };

        info!(tiles = tasks.len(), "retrying failed tiles");
        Ok(self.run(&targets, tasks).await)
    }

    fn target(&self, name: &str) -> Result<Target<'_>> {
        let tile_map = self.config.tile_map(name)?;

        Ok(Target {
            url: tile_map.url_format()?,
            tile_map,
        })
    }

    fn failed_set(&self) -> MutexGuard<'_, Vec<DownloadTask>> {
        self.failed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(
        &self,
        targets: &HashMap<String, Target<'_>>,
        tasks: Vec<DownloadTask>,
    ) -> Statistics {
        self.stats.reset(tasks.len());

        let cancel = &self.cancel;
        stream::iter(tasks)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .for_each_concurrent(self.config.concurrency, |task| async move {
                // every task's tile map was resolved by the caller
                if let Some(target) = targets.get(&task.tile_map) {
                    self.fetch_tile(target, task).await;
                }
            })
            .await;

        let stats = self.stats.snapshot();
        if cancel.is_cancelled() {
            warn!(?stats, "download cancelled");
        } else {
            info!(
                downloaded = stats.downloaded_tiles,
                skipped = stats.skipped_tiles,
                failed = stats.failed_tiles,
                "download finished"
            );
        }

        stats
    }

    async fn fetch_tile(&self, target: &Target<'_>, task: DownloadTask) {
        let path = tile_path(
            &self.config.cache_dir,
            &target.tile_map.name,
            &task.tile,
            &target.tile_map.format,
            self.config.layout,
        );

        self.stats.begin();

        let outcome = match self.store_tile(target, &task.tile, &path).await {
            Ok(outcome) => {
                debug!(tile = %task.tile, ?outcome, "tile done");
                outcome
            }
            Err(e) => {
                warn!(tile = %task.tile, "failed fetching tile: {}", e);
                self.failed_set().push(task);
                Outcome::Failed
            }
        };

        let stats = self.stats.finish(outcome);
        if let Some(progress) = &self.progress {
            progress(&stats, stats.percent());
        }
    }

    async fn store_tile(
        &self,
        target: &Target<'_>,
        tile: &Tile,
        path: &Path,
    ) -> Result<Outcome, FetchError> {
        // if the tile's already been downloaded, skip it
        if !self.config.fetch_existing && fs::metadata(path).await.is_ok() {
            return Ok(Outcome::Skipped);
        }

        let storage = |source: std::io::Error| FetchError::Storage {
            path: path.to_owned(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(storage)?;
        }

        let body = self.source.fetch(&target.url.tile_url(tile)).await?;

        let partial = partial_path(path);
        fs::write(&partial, &body).await.map_err(storage)?;
        fs::rename(&partial, path).await.map_err(storage)?;

        Ok(Outcome::Downloaded)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::bounding_box::{BoundingBox, Fixture};
    use crate::error::{Error, RegionError};
    use crate::geometry::GeoRegion;

    const TILE_BODY: &[u8] = b"not really a png";

    #[derive(Default)]
    struct MockState {
        calls: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
        failing: Mutex<HashSet<String>>,
        delay: Option<Duration>,
    }

    #[derive(Clone, Default)]
    struct MockSource(Arc<MockState>);

    impl MockSource {
        fn slow(delay: Duration) -> Self {
            MockSource(Arc::new(MockState {
                delay: Some(delay),
                ..MockState::default()
            }))
        }

        fn fail(&self, url: &str) {
            self.0.failing.lock().unwrap().insert(url.to_owned());
        }

        fn heal(&self) {
            self.0.failing.lock().unwrap().clear();
        }

        fn calls(&self) -> usize {
            self.0.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TileSource for MockSource {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            let state = &self.0;
            state.calls.fetch_add(1, Ordering::SeqCst);
            let running = state.running.fetch_add(1, Ordering::SeqCst) + 1;
            state.max_running.fetch_max(running, Ordering::SeqCst);

            if let Some(delay) = state.delay {
                tokio::time::sleep(delay).await;
            }

            state.running.fetch_sub(1, Ordering::SeqCst);

            if state.failing.lock().unwrap().contains(url) {
                return Err(FetchError::Status(500));
            }

            Ok(Bytes::from_static(TILE_BODY))
        }
    }

    fn config(cache_dir: &Path) -> Config {
        Config {
            cache_dir: cache_dir.to_owned(),
            tile_maps: vec![TileMapConfig {
                name: "osm".to_owned(),
                url: "mock://tiles/{z}/{x}/{y}.png".to_owned(),
                subdomains: vec![],
                format: "png".to_owned(),
            }],
            ..Config::default()
        }
    }

    fn manhattan() -> Region {
        Region::from(BoundingBox::from(Fixture::LowerManhattan))
    }

    #[tokio::test]
    async fn downloads_bounding_box() {
        let cache = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        let downloader = Downloader::with_source(config(cache.path()), source.clone()).unwrap();

        let stats = downloader
            .download_region("osm", &manhattan(), 10, 10)
            .await
            .unwrap();

        assert_eq!(stats.calculated_tiles, 2);
        assert_eq!(stats.total_tiles, 2);
        assert_eq!(stats.downloaded_tiles, 2);
        assert_eq!(stats.failed_tiles, 0);
        assert_eq!(stats.in_progress, 0);
        assert_eq!(source.calls(), 2);

        for y in [384, 385] {
            let path = tile_path(
                cache.path(),
                "osm",
                &Tile::new(301, y, 10),
                "png",
                Default::default(),
            );
            assert_eq!(std::fs::read(&path).unwrap(), TILE_BODY);
            assert!(!partial_path(&path).exists());
        }
    }

    #[tokio::test]
    async fn second_run_skips_cached_tiles() {
        let cache = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        let downloader = Downloader::with_source(config(cache.path()), source.clone()).unwrap();
        let region = Region::from(BoundingBox::from(Fixture::AachenGermany));

        let first = downloader.download_region("osm", &region, 12, 14).await.unwrap();
        let calls = source.calls();
        let second = downloader.download_region("osm", &region, 12, 14).await.unwrap();

        assert_eq!(first.downloaded_tiles, first.total_tiles);
        assert_eq!(second.downloaded_tiles, 0);
        assert_eq!(second.skipped_tiles, second.total_tiles);
        assert_eq!(source.calls(), calls);
    }

    #[tokio::test]
    async fn fetch_existing_downloads_again() {
        let cache = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        let mut cfg = config(cache.path());
        cfg.fetch_existing = true;
        let downloader = Downloader::with_source(cfg, source.clone()).unwrap();

        downloader.download_region("osm", &manhattan(), 10, 10).await.unwrap();
        let stats = downloader.download_region("osm", &manhattan(), 10, 10).await.unwrap();

        assert_eq!(stats.downloaded_tiles, 2);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn failed_tile_is_retried() {
        let cache = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        source.fail("mock://tiles/10/301/385.png");
        let downloader = Downloader::with_source(config(cache.path()), source.clone()).unwrap();

        let stats = downloader
            .download_region("osm", &manhattan(), 10, 10)
            .await
            .unwrap();

        assert_eq!(stats.downloaded_tiles, 1);
        assert_eq!(stats.failed_tiles, 1);
        assert_eq!(
            downloader.failed_tasks(),
            vec![DownloadTask {
                tile_map: "osm".to_owned(),
                tile: Tile::new(301, 385, 10),
            }]
        );

        source.heal();
        let retry = downloader.retry_failed().await.unwrap();

        assert_eq!(retry.total_tiles, 1);
        assert_eq!(retry.calculated_tiles, 1);
        assert_eq!(retry.downloaded_tiles, 1);
        assert_eq!(retry.failed_tiles, 0);
        assert!(downloader.failed_tasks().is_empty());
    }

    #[tokio::test]
    async fn retry_without_failures_does_nothing() {
        let cache = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        let downloader = Downloader::with_source(config(cache.path()), source.clone()).unwrap();

        assert_eq!(downloader.retry_failed().await.unwrap(), Statistics::default());

        downloader.download_region("osm", &manhattan(), 10, 10).await.unwrap();
        let calls = source.calls();

        assert_eq!(downloader.retry_failed().await.unwrap(), Statistics::default());
        assert_eq!(downloader.statistics(), Statistics::default());
        assert_eq!(source.calls(), calls);
    }

    #[tokio::test]
    async fn failures_are_replaced_by_the_next_operation() {
        let cache = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        source.fail("mock://tiles/10/301/384.png");
        let downloader = Downloader::with_source(config(cache.path()), source.clone()).unwrap();

        downloader.download_region("osm", &manhattan(), 10, 10).await.unwrap();
        assert_eq!(downloader.failed_tasks().len(), 1);

        source.heal();
        let stats = downloader.download_region("osm", &manhattan(), 10, 10).await.unwrap();

        assert_eq!(stats.downloaded_tiles, 1);
        assert_eq!(stats.skipped_tiles, 1);
        assert!(downloader.failed_tasks().is_empty());
    }

    #[tokio::test]
    async fn unknown_tile_map_keeps_previous_statistics() {
        let cache = tempfile::tempdir().unwrap();
        let downloader =
            Downloader::with_source(config(cache.path()), MockSource::default()).unwrap();

        let before = downloader.download_region("osm", &manhattan(), 10, 10).await.unwrap();
        let err = downloader
            .download_region("satellite", &manhattan(), 10, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownTileMap(name) if name == "satellite"));
        assert_eq!(downloader.statistics(), before);
    }

    #[tokio::test]
    async fn invalid_zoom_range_schedules_nothing() {
        let cache = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        let downloader = Downloader::with_source(config(cache.path()), source.clone()).unwrap();

        let err = downloader
            .download_region("osm", &manhattan(), 12, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Region(RegionError::ZoomRange { .. })));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn progress_snapshots_hold_the_invariant() {
        let cache = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let downloader = Downloader::with_source(config(cache.path()), MockSource::default())
            .unwrap()
            .on_progress(move |stats, percent| sink.lock().unwrap().push((*stats, percent)));

        let region = Region::from(BoundingBox::from(Fixture::AachenGermany));
        let stats = downloader.download_region("osm", &region, 13, 14).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), stats.total_tiles);
        for (snapshot, percent) in seen.iter() {
            assert!(snapshot.finished() + snapshot.in_progress <= snapshot.total_tiles);
            assert_eq!(*percent, snapshot.percent());
        }
        assert_eq!(seen.last().map(|(_, p)| *p), Some(100));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let cache = tempfile::tempdir().unwrap();
        let source = MockSource::slow(Duration::from_millis(5));
        let mut cfg = config(cache.path());
        cfg.concurrency = 3;
        let downloader = Downloader::with_source(cfg, source.clone()).unwrap();

        let region = Region::from(BoundingBox::from(Fixture::AachenGermany));
        let stats = downloader.download_region("osm", &region, 14, 14).await.unwrap();

        assert!(stats.total_tiles > 3);
        assert!(source.0.max_running.load(Ordering::SeqCst) <= 3);
        assert_eq!(stats.downloaded_tiles, stats.total_tiles);
    }

    #[tokio::test]
    async fn downloads_geometry() {
        let cache = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        let downloader = Downloader::with_source(config(cache.path()), source.clone()).unwrap();

        let region = Region::from(
            GeoRegion::from_geojson_str(
                r#"{
                    "type": "Polygon",
                    "coordinates": [[[0,0],[10,0],[0,10],[0,0]]]
                }"#,
            )
            .unwrap(),
        );

        let planned = downloader.plan(&region, 6, 7).unwrap();
        let stats = downloader.download_region("osm", &region, 6, 7).await.unwrap();

        assert_eq!(stats.total_tiles, planned.len());
        assert_eq!(stats.downloaded_tiles, planned.len());
        assert_eq!(source.calls(), planned.len());
    }

    #[tokio::test]
    async fn cancelled_downloader_starts_nothing() {
        let cache = tempfile::tempdir().unwrap();
        let source = MockSource::default();
        let downloader = Downloader::with_source(config(cache.path()), source.clone()).unwrap();

        downloader.cancellation_token().cancel();
        let stats = downloader.download_region("osm", &manhattan(), 10, 10).await.unwrap();

        assert_eq!(stats.total_tiles, 2);
        assert_eq!(stats.finished(), 0);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn storage_errors_count_as_failures() {
        let cache = tempfile::tempdir().unwrap();
        // a file where the tile map directory should go
        std::fs::write(cache.path().join("osm"), b"").unwrap();
        let downloader =
            Downloader::with_source(config(cache.path()), MockSource::default()).unwrap();

        let stats = downloader.download_region("osm", &manhattan(), 10, 10).await.unwrap();

        assert_eq!(stats.failed_tiles, 2);
        assert_eq!(downloader.failed_tasks().len(), 2);
    }
}
