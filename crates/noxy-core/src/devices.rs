//! Driver interfaces for the local side effects a bridge can trigger.
//!
//! The bridge engine decides *what* to press, play or open and in which
//! order; the drivers behind these traits own the platform specifics.

use std::path::Path;
use std::sync::Arc;

use url::Url;

/// Error reported by a device, audio or launcher driver.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DeviceError(pub String);

impl From<DeviceError> for crate::errors::BridgeError {
    fn from(e: DeviceError) -> Self {
        Self::Device(e.0)
    }
}

pub trait KeyboardDriver: Send + Sync {
    fn press_key(&self, code: u32) -> Result<(), DeviceError>;
    fn release_key(&self, code: u32) -> Result<(), DeviceError>;
}

pub trait JoystickDriver: Send + Sync {
    /// Buttons are 1-based.
    fn press_button(&self, button: u32) -> Result<(), DeviceError>;
    fn release_button(&self, button: u32) -> Result<(), DeviceError>;
    /// Relinquish the device on shutdown.
    fn release(&self) {}
}

/// A clip that is currently (or was) playing.
pub trait PlaybackHandle: Send + Sync {
    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);
    fn stop(&self);
    /// False once playback finished on its own or was stopped.
    fn is_active(&self) -> bool;
}

pub trait AudioDriver: Send + Sync {
    fn play_file(&self, path: &Path) -> Result<Arc<dyn PlaybackHandle>, DeviceError>;
}

pub trait AppLauncher: Send + Sync {
    fn open_url(&self, url: &Url) -> Result<(), DeviceError>;
    fn launch(&self, path: &Path) -> Result<(), DeviceError>;
}
