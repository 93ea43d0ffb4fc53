//! JSON-lines session host over stdin/stdout.
//!
//! Every outbound [`ClientMessage`] is one line of JSON. Inbound lines are
//! [`SessionEvent`]s, fanned out to every bridge through a broadcast channel.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use noxy_core::{ClientMessage, SessionEvent, SessionHost, SessionId};

const EVENT_CAPACITY: usize = 256;

#[derive(Default)]
struct TurnState {
    in_turn: bool,
    deferred: VecDeque<ClientMessage>,
}

pub struct StdioSession {
    session_id: SessionId,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    turn: Mutex<TurnState>,
    events: broadcast::Sender<SessionEvent>,
}

impl StdioSession {
    /// A session writing to the process stdout.
    pub fn stdout(session_id: SessionId) -> (Arc<Self>, JoinHandle<()>) {
        Self::with_writer(session_id, tokio::io::stdout())
    }

    /// A session writing its lines to `writer`. The returned task ends once
    /// the session is dropped or the writer fails.
    pub fn with_writer<W>(session_id: SessionId, writer: W) -> (Arc<Self>, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = Arc::new(Self {
            session_id,
            outbound,
            turn: Mutex::new(TurnState::default()),
            events,
        });
        let writer_task = tokio::spawn(write_lines(rx, writer));
        (session, writer_task)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &broadcast::Sender<SessionEvent> {
        &self.events
    }

    /// True between `TurnStarted` and `TurnCompleted`.
    pub fn in_turn(&self) -> bool {
        self.turn.lock().in_turn
    }

    pub fn deferred_len(&self) -> usize {
        self.turn.lock().deferred.len()
    }

    /// Apply one inbound event: track the turn, flush deferred messages once
    /// idle, then fan the event out.
    pub fn deliver(&self, event: SessionEvent) {
        match &event {
            SessionEvent::TurnStarted => self.turn.lock().in_turn = true,
            SessionEvent::TurnCompleted => {
                let mut turn = self.turn.lock();
                turn.in_turn = false;
                if !turn.deferred.is_empty() {
                    debug!(count = turn.deferred.len(), "flushing deferred messages");
                }
                while let Some(message) = turn.deferred.pop_front() {
                    self.write(message);
                }
            }
            _ => {}
        }
        // Nobody listening yet is fine.
        let _ = self.events.send(event);
    }

    /// Read events until EOF. Malformed lines are logged and skipped.
    pub async fn read_events<R>(&self, reader: R) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionEvent>(line) {
                Ok(event) => {
                    debug!(event = event.event_type(), "session event");
                    self.deliver(event);
                }
                Err(e) => warn!(error = %e, "malformed session event, skipping"),
            }
        }
        debug!("session input closed");
        Ok(())
    }

    fn write(&self, message: ClientMessage) {
        if self.outbound.send(message).is_err() {
            error!("session output closed, message dropped");
        }
    }
}

impl SessionHost for StdioSession {
    fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn send(&self, message: ClientMessage) {
        self.write(message);
    }

    fn send_when_idle(&self, message: ClientMessage) {
        // Written under the lock so a concurrent flush cannot overtake it.
        let mut turn = self.turn.lock();
        if turn.in_turn {
            turn.deferred.push_back(message);
        } else {
            self.write(message);
        }
    }
}

async fn write_lines<W>(mut rx: mpsc::UnboundedReceiver<ClientMessage>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = match serde_json::to_vec(&message) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to encode session message");
                continue;
            }
        };
        line.push(b'\n');

        let written = async {
            writer.write_all(&line).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            error!(error = %e, "failed to write session message");
            break;
        }
    }
}
