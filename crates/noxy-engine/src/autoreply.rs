use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use noxy_core::{ClientMessage, SessionHost};

use crate::dispatch::AUTO_REPLY_TEXT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TimerState {
    delay: Duration,
    enabled: bool,
}

struct Shared {
    session: Arc<dyn SessionHost>,
    state: Mutex<TimerState>,
    fired: AtomicU64,
}

impl Shared {
    fn fire(&self) {
        let state = *self.state.lock();
        if !state.enabled {
            debug!("auto-reply disabled, skipping");
            return;
        }
        info!(delay_ms = state.delay.as_millis() as u64, "auto-replying after idle delay");
        self.fired.fetch_add(1, Ordering::SeqCst);
        self.session.send(ClientMessage::Send {
            session_id: self.session.session_id().clone(),
            text: AUTO_REPLY_TEXT.to_string(),
        });
    }
}

/// The single idle timer of an auto-reply bridge.
///
/// Every reconfiguration or bit of session activity replaces the pending
/// timer; timers never stack. After firing, the timer waits for the next
/// activity before it arms again, so it produces at most one reply per idle
/// window.
pub struct AutoReplyTimer {
    shared: Arc<Shared>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AutoReplyTimer {
    pub fn new(session: Arc<dyn SessionHost>) -> Self {
        Self {
            shared: Arc::new(Shared {
                session,
                state: Mutex::new(TimerState {
                    delay: Duration::ZERO,
                    enabled: false,
                }),
                fired: AtomicU64::new(0),
            }),
            pending: Mutex::new(None),
        }
    }

    /// Enable with a new delay and restart the idle window.
    pub fn configure(&self, delay: Duration) {
        *self.shared.state.lock() = TimerState {
            delay,
            enabled: true,
        };
        info!(delay_ms = delay.as_millis() as u64, "auto-reply delay updated");
        self.arm();
    }

    pub fn disable(&self) {
        self.shared.state.lock().enabled = false;
        self.cancel_pending();
        info!("auto-reply disabled");
    }

    /// Session activity: restart the idle window if enabled.
    pub fn restart(&self) {
        if self.is_enabled() {
            self.arm();
        }
    }

    /// A turn is in progress: nothing fires until the next restart.
    pub fn pause(&self) {
        self.cancel_pending();
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.state.lock().enabled
    }

    pub fn delay(&self) -> Duration {
        self.shared.state.lock().delay
    }

    pub fn is_armed(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Number of replies sent so far.
    pub fn fired(&self) -> u64 {
        self.shared.fired.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shared.state.lock().enabled = false;
        self.cancel_pending();
    }

    fn arm(&self) {
        let delay = self.delay();
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire();
        });
        if let Some(previous) = self.pending.lock().replace(task) {
            previous.abort();
        }
    }

    fn cancel_pending(&self) {
        if let Some(task) = self.pending.lock().take() {
            task.abort();
        }
    }
}

impl Drop for AutoReplyTimer {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
