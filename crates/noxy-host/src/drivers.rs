//! Local drivers shipped with the host binary.
//!
//! Keyboard, joystick and audio output only log what they would do; the
//! launcher really spawns processes.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use url::Url;

use noxy_core::devices::{
    AppLauncher, AudioDriver, DeviceError, JoystickDriver, KeyboardDriver, PlaybackHandle,
};

/// The driver set handed to the supervisor.
#[derive(Clone)]
pub struct Drivers {
    pub keyboard: Arc<dyn KeyboardDriver>,
    pub joystick: Arc<dyn JoystickDriver>,
    pub audio: Arc<dyn AudioDriver>,
    pub launcher: Arc<dyn AppLauncher>,
}

impl Drivers {
    /// Logging device drivers plus a process-spawning launcher.
    pub fn logging(vjoy_device: u32) -> Self {
        Self {
            keyboard: Arc::new(LoggingKeyboard),
            joystick: Arc::new(LoggingJoystick::new(vjoy_device)),
            audio: Arc::new(LoggingAudio),
            launcher: Arc::new(ProcessLauncher),
        }
    }
}

pub struct LoggingKeyboard;

impl KeyboardDriver for LoggingKeyboard {
    fn press_key(&self, code: u32) -> Result<(), DeviceError> {
        debug!(code, "key down");
        Ok(())
    }

    fn release_key(&self, code: u32) -> Result<(), DeviceError> {
        debug!(code, "key up");
        Ok(())
    }
}

pub struct LoggingJoystick {
    device: u32,
    acquired: AtomicBool,
}

impl LoggingJoystick {
    pub fn new(device: u32) -> Self {
        Self {
            device,
            acquired: AtomicBool::new(false),
        }
    }

    fn acquire(&self) {
        if !self.acquired.swap(true, Ordering::SeqCst) {
            info!(device = self.device, "joystick device acquired");
        }
    }
}

impl JoystickDriver for LoggingJoystick {
    fn press_button(&self, button: u32) -> Result<(), DeviceError> {
        self.acquire();
        debug!(device = self.device, button, "button down");
        Ok(())
    }

    fn release_button(&self, button: u32) -> Result<(), DeviceError> {
        debug!(device = self.device, button, "button up");
        Ok(())
    }

    fn release(&self) {
        if self.acquired.swap(false, Ordering::SeqCst) {
            info!(device = self.device, "joystick device released");
        }
    }
}

pub struct LoggingAudio;

impl AudioDriver for LoggingAudio {
    fn play_file(&self, path: &Path) -> Result<Arc<dyn PlaybackHandle>, DeviceError> {
        if !path.is_file() {
            return Err(DeviceError(format!("no such file: {}", path.display())));
        }
        info!(file = %path.display(), "playing");
        Ok(Arc::new(NullPlayback::new(path)))
    }
}

/// Playback that never produces sound but honours volume and stop.
pub struct NullPlayback {
    name: String,
    volume: Mutex<f32>,
    active: AtomicBool,
}

impl NullPlayback {
    pub fn new(path: &Path) -> Self {
        Self {
            name: path.display().to_string(),
            volume: Mutex::new(1.0),
            active: AtomicBool::new(true),
        }
    }
}

impl PlaybackHandle for NullPlayback {
    fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!(file = %self.name, "stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Opens URLs with the desktop opener and launches executables directly.
pub struct ProcessLauncher;

impl AppLauncher for ProcessLauncher {
    fn open_url(&self, url: &Url) -> Result<(), DeviceError> {
        let (program, args) = opener_command();
        let mut cmd = tokio::process::Command::new(program);
        let _ = cmd.args(args).arg(url.as_str());
        spawn_detached(cmd, program)?;
        info!(url = %url, "opened url");
        Ok(())
    }

    fn launch(&self, path: &Path) -> Result<(), DeviceError> {
        let mut cmd = tokio::process::Command::new(path);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            let _ = cmd.current_dir(dir);
        }
        spawn_detached(cmd, &path.display().to_string())?;
        info!(path = %path.display(), "launched application");
        Ok(())
    }
}

fn spawn_detached(mut cmd: tokio::process::Command, what: &str) -> Result<(), DeviceError> {
    let _ = cmd
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    let child = cmd
        .spawn()
        .map_err(|e| DeviceError(format!("failed to start {what}: {e}")))?;
    debug!(pid = ?child.id(), "process started");
    Ok(())
}

/// Platform command that opens a URL in the default handler.
pub fn opener_command() -> (&'static str, &'static [&'static str]) {
    const WINDOWS_ARGS: &[&str] = &["/C", "start", ""];
    if cfg!(target_os = "windows") {
        ("cmd", WINDOWS_ARGS)
    } else if cfg!(target_os = "macos") {
        ("open", &[])
    } else {
        ("xdg-open", &[])
    }
}
