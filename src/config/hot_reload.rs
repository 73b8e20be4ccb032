use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;

use super::Config;

/// Settings shared by every generation.
///
/// Each session starts from [`ConfigHandle::snapshot`], which re-reads the
/// backing file first. Edits on disk therefore reach the next generation
/// while a running one keeps the `Arc<Config>` it started with.
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<ArcSwap<Config>>,
    source: Option<PathBuf>,
}

impl ConfigHandle {
    /// Seed the handle. A config without a file path is never refreshed.
    pub fn new(config: Config) -> Self {
        let source = Some(config.config_path.clone()).filter(|path| !path.as_os_str().is_empty());
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            source,
        }
    }

    /// Refresh from disk and return the settings for one generation.
    ///
    /// A file that no longer parses or validates leaves the last good
    /// snapshot in place.
    pub fn snapshot(&self) -> Arc<Config> {
        if let Some(path) = &self.source {
            match Config::load_effective(path) {
                Ok(fresh) => {
                    tracing::debug!(path = %path.display(), "settings refreshed");
                    self.current.store(Arc::new(fresh));
                }
                Err(error) => tracing::warn!(
                    path = %path.display(),
                    "keeping previous settings: {error:#}"
                ),
            }
        }
        self.current.load_full()
    }
}
