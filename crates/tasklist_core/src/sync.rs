use crate::config::SyncSettings;
use crate::model::Task;
use std::time::Duration;

const DISABLE_SYNC_ENV_VAR: &str = "TASKLIST_DISABLE_SYNC";
pub const DEFAULT_SYNC_DELAY: Duration = Duration::from_millis(500);

/// Placeholder for a remote sync. Called after every successful save; the
/// outcome is never reported back.
pub trait Syncer {
    fn sync(&self, tasks: &[Task]);
}

pub struct NoopSyncer;

impl Syncer for NoopSyncer {
    fn sync(&self, _tasks: &[Task]) {}
}

/// Logs the start, then logs completion from a detached thread after a fixed
/// delay. The thread is never joined.
pub struct DelayedLogSyncer {
    delay: Duration,
}

impl DelayedLogSyncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Syncer for DelayedLogSyncer {
    fn sync(&self, tasks: &[Task]) {
        let count = tasks.len();
        let delay = self.delay;
        tracing::info!(count, "syncing to cloud");
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            tracing::info!(count, "sync complete");
        });
    }
}

pub fn syncer_from_settings(settings: &SyncSettings) -> Box<dyn Syncer> {
    if std::env::var(DISABLE_SYNC_ENV_VAR).is_ok() || !settings.enabled {
        return Box::new(NoopSyncer);
    }

    Box::new(DelayedLogSyncer::new(Duration::from_millis(settings.delay_ms)))
}
