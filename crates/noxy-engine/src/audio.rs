use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use noxy_core::devices::{AudioDriver, PlaybackHandle};
use noxy_core::BridgeError;

/// Number of volume steps in a fade.
pub const FADE_STEPS: u32 = 100;

type Playing = DashMap<String, Arc<dyn PlaybackHandle>>;

/// A running fade and the playback it ramps.
struct Fade {
    handle: Arc<dyn PlaybackHandle>,
    task: JoinHandle<()>,
}

/// `.wav` files in `dir`, sorted by file name. A missing directory is empty.
pub fn index_presets(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read presets directory");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        })
        .collect();
    files.sort();
    files
}

fn same_handle(a: &Arc<dyn PlaybackHandle>, b: &Arc<dyn PlaybackHandle>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Active sound-effect playbacks, at most one per prefix.
pub struct AudioDeck {
    driver: Arc<dyn AudioDriver>,
    presets_dir: PathBuf,
    fade: Duration,
    playing: Arc<Playing>,
    fades: Mutex<HashMap<String, Fade>>,
}

impl AudioDeck {
    pub fn new(driver: Arc<dyn AudioDriver>, presets_dir: impl Into<PathBuf>, fade: Duration) -> Self {
        Self {
            driver,
            presets_dir: presets_dir.into(),
            fade,
            playing: Arc::new(DashMap::new()),
            fades: Mutex::new(HashMap::new()),
        }
    }

    pub fn presets_dir(&self) -> &Path {
        &self.presets_dir
    }

    /// First preset (by name) whose file name starts with `prefix`.
    pub fn resolve(&self, prefix: &str) -> Result<PathBuf, BridgeError> {
        index_presets(&self.presets_dir)
            .into_iter()
            .find(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
            })
            .ok_or_else(|| BridgeError::NotFound(format!("no preset matching {prefix}*.wav")))
    }

    /// Start the preset for `prefix`. A playback already under the same
    /// prefix is stopped and replaced.
    pub fn play(&self, prefix: &str) -> Result<(), BridgeError> {
        self.prune();
        let path = self.resolve(prefix)?;
        let handle = self.driver.play_file(&path)?;
        info!(prefix, file = %path.display(), "playing preset");
        if let Some(previous) = self.playing.insert(prefix.to_string(), handle) {
            previous.stop();
        }
        Ok(())
    }

    pub fn stop(&self, prefix: &str) -> Result<(), BridgeError> {
        let (_, handle) = self
            .playing
            .remove(prefix)
            .ok_or_else(|| BridgeError::NotFound(format!("no active playback for {prefix}")))?;
        handle.stop();
        info!(prefix, "playback stopped");
        Ok(())
    }

    /// Ramp the volume linearly to zero over the fade duration, then stop.
    /// A playback already fading keeps its running ramp.
    pub fn fade(&self, prefix: &str) -> Result<(), BridgeError> {
        let handle = self
            .playing
            .get(prefix)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| BridgeError::NotFound(format!("no active playback for {prefix}")))?;

        let mut fades = self.fades.lock();
        fades.retain(|_, f| !f.task.is_finished());
        if let Some(running) = fades.get(prefix) {
            if same_handle(&running.handle, &handle) {
                debug!(prefix, "already fading");
                return Ok(());
            }
        }

        let step = self.fade / FADE_STEPS;
        let playing = Arc::clone(&self.playing);
        let key = prefix.to_string();
        info!(prefix, fade_ms = self.fade.as_millis() as u64, "fading out");

        let ramped = Arc::clone(&handle);
        let task = tokio::spawn(async move {
            let start = ramped.volume();
            for i in 1..=FADE_STEPS {
                tokio::time::sleep(step).await;
                if !ramped.is_active() {
                    debug!(prefix = %key, "playback ended during fade");
                    return;
                }
                ramped.set_volume(start * (1.0 - i as f32 / FADE_STEPS as f32));
            }
            ramped.stop();
            let _ = playing.remove_if(&key, |_, current| same_handle(current, &ramped));
            debug!(prefix = %key, "fade complete");
        });

        if let Some(previous) = fades.insert(prefix.to_string(), Fade { handle, task }) {
            previous.task.abort();
        }
        Ok(())
    }

    /// Forget playbacks that finished on their own.
    pub fn prune(&self) {
        self.playing.retain(|_, handle| handle.is_active());
    }

    /// Prefixes with a live playback, sorted.
    pub fn active(&self) -> Vec<String> {
        self.prune();
        let mut prefixes: Vec<String> = self.playing.iter().map(|e| e.key().clone()).collect();
        prefixes.sort();
        prefixes
    }

    /// Stop everything, including playbacks that are fading.
    pub fn release_all(&self) {
        for (_, fade) in self.fades.lock().drain() {
            fade.task.abort();
        }
        let prefixes: Vec<String> = self.playing.iter().map(|e| e.key().clone()).collect();
        for prefix in prefixes {
            if let Some((_, handle)) = self.playing.remove(&prefix) {
                handle.stop();
            }
        }
    }
}
