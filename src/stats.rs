use std::sync::{Mutex, MutexGuard, PoisonError};

/// Counters of one download operation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    pub calculated_tiles: usize,
    pub total_tiles: usize,
    pub downloaded_tiles: usize,
    pub skipped_tiles: usize,
    pub failed_tiles: usize,
    pub in_progress: usize,
}

impl Statistics {
    /// Tiles that reached a terminal state.
    pub fn finished(&self) -> usize {
        self.downloaded_tiles + self.skipped_tiles + self.failed_tiles
    }

    /// Rounded share of finished tiles, 0 for an empty operation.
    pub fn percent(&self) -> u8 {
        if self.total_tiles == 0 {
            return 0;
        }

        let percent = (100 * self.finished() as u64 + self.total_tiles as u64 / 2)
            / self.total_tiles as u64;
        percent.min(100) as u8
    }
}

/// How a single tile ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Skipped,
    Downloaded,
    Failed,
}

/// Statistics shared between concurrently running tile tasks.
///
/// Every transition happens under one lock so snapshots always satisfy
/// `finished + in_progress <= total`.
#[derive(Debug, Default)]
pub(crate) struct StatsTracker {
    inner: Mutex<Statistics>,
}

impl StatsTracker {
    fn lock(&self) -> MutexGuard<'_, Statistics> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Statistics {
        *self.lock()
    }

    /// Zeroes all counters and records the size of the new operation.
    pub fn reset(&self, total: usize) {
        *self.lock() = Statistics {
            calculated_tiles: total,
            total_tiles: total,
            ..Statistics::default()
        };
    }

    pub fn begin(&self) {
        self.lock().in_progress += 1;
    }

    pub fn finish(&self, outcome: Outcome) -> Statistics {
        let mut stats = self.lock();
        stats.in_progress = stats.in_progress.saturating_sub(1);

        match outcome {
            Outcome::Skipped => stats.skipped_tiles += 1,
            Outcome::Downloaded => stats.downloaded_tiles += 1,
            Outcome::Failed => stats.failed_tiles += 1,
        }

        *stats
    }
}
