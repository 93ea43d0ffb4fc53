//! Recording doubles for the session host and device drivers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::devices::{
    AppLauncher, AudioDriver, DeviceError, JoystickDriver, KeyboardDriver, PlaybackHandle,
};
use crate::ids::SessionId;
use crate::session::{ClientMessage, SessionHost};

/// How a message reached the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Immediate,
    WhenIdle,
}

/// Session host that records everything sent to it.
pub struct RecordingSession {
    session_id: SessionId,
    sent: Mutex<Vec<(Delivery, ClientMessage)>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            session_id: SessionId::from_raw("sess_test"),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(Delivery, ClientMessage)> {
        self.sent.lock().clone()
    }

    pub fn messages(&self) -> Vec<ClientMessage> {
        self.sent.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHost for RecordingSession {
    fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn send(&self, message: ClientMessage) {
        self.sent.lock().push((Delivery::Immediate, message));
    }

    fn send_when_idle(&self, message: ClientMessage) {
        self.sent.lock().push((Delivery::WhenIdle, message));
    }
}

/// A single driver call, in the order it happened.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceOp {
    KeyDown(u32),
    KeyUp(u32),
    ButtonDown(u32),
    ButtonUp(u32),
    JoystickReleased,
    Play(PathBuf),
    OpenUrl(String),
    Launch(PathBuf),
}

/// Keyboard, joystick and launcher double sharing one ordered log.
#[derive(Clone, Default)]
pub struct RecordingDevices {
    ops: Arc<Mutex<Vec<DeviceOp>>>,
}

impl RecordingDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<DeviceOp> {
        self.ops.lock().clone()
    }

    fn record(&self, op: DeviceOp) {
        self.ops.lock().push(op);
    }
}

impl KeyboardDriver for RecordingDevices {
    fn press_key(&self, code: u32) -> Result<(), DeviceError> {
        self.record(DeviceOp::KeyDown(code));
        Ok(())
    }

    fn release_key(&self, code: u32) -> Result<(), DeviceError> {
        self.record(DeviceOp::KeyUp(code));
        Ok(())
    }
}

impl JoystickDriver for RecordingDevices {
    fn press_button(&self, button: u32) -> Result<(), DeviceError> {
        self.record(DeviceOp::ButtonDown(button));
        Ok(())
    }

    fn release_button(&self, button: u32) -> Result<(), DeviceError> {
        self.record(DeviceOp::ButtonUp(button));
        Ok(())
    }

    fn release(&self) {
        self.record(DeviceOp::JoystickReleased);
    }
}

impl AppLauncher for RecordingDevices {
    fn open_url(&self, url: &Url) -> Result<(), DeviceError> {
        self.record(DeviceOp::OpenUrl(url.to_string()));
        Ok(())
    }

    fn launch(&self, path: &Path) -> Result<(), DeviceError> {
        self.record(DeviceOp::Launch(path.to_path_buf()));
        Ok(())
    }
}

/// Playback handle that only tracks volume and liveness.
pub struct FakePlayback {
    volume: Mutex<f32>,
    active: AtomicBool,
    volume_history: Mutex<Vec<f32>>,
}

impl FakePlayback {
    pub fn new() -> Self {
        Self {
            volume: Mutex::new(1.0),
            active: AtomicBool::new(true),
            volume_history: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the clip reaching its end.
    pub fn finish(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn volume_history(&self) -> Vec<f32> {
        self.volume_history.lock().clone()
    }
}

impl Default for FakePlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackHandle for FakePlayback {
    fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume;
        self.volume_history.lock().push(volume);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Audio driver handing out [`FakePlayback`]s.
#[derive(Default)]
pub struct FakeAudio {
    played: Mutex<Vec<(PathBuf, Arc<FakePlayback>)>>,
}

impl FakeAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<PathBuf> {
        self.played.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn handle(&self, index: usize) -> Option<Arc<FakePlayback>> {
        self.played.lock().get(index).map(|(_, h)| Arc::clone(h))
    }
}

impl AudioDriver for FakeAudio {
    fn play_file(&self, path: &Path) -> Result<Arc<dyn PlaybackHandle>, DeviceError> {
        let handle = Arc::new(FakePlayback::new());
        self.played
            .lock()
            .push((path.to_path_buf(), Arc::clone(&handle)));
        Ok(handle)
    }
}
