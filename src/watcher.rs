//! Debounced edge detection on a single input.
//!
//! Raw transitions arrive from the backend's notification context through an
//! [`EdgeHandler`] queue. A settle task owns that queue: each transition
//! (re)starts the debounce timer, and once the line has been quiet for the
//! whole window the task reads the settled level and emits at most one
//! [`EdgeEvent`] for the net change. A burst that returns to the previously
//! reported level emits nothing.
//!
//! Snapshots taken by [`EdgeWatcher::watch`] read the line independently of
//! the settle task, so a snapshot may briefly disagree with a pending edge.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::device::{Device, InputDevice};
use crate::error::AppError;
use crate::events::{EventSink, Outcome, StatusEvent};
use crate::gpio::{EdgeHandler, EdgeKind, RawEdge};
use crate::polarity::{InputState, Level};
use crate::shutdown::Shutdown;

#[derive(Debug, Clone)]
pub struct EdgeEvent {
    pub device: String,
    pub pin_id: u32,
    pub edge: EdgeKind,
    pub raw_level: Level,
    pub logical_state: InputState,
    /// Time of the last raw transition in the settled burst.
    pub timestamp_ms: u64,
}

impl fmt::Display for EdgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edge = match self.edge {
            EdgeKind::Rising => "RISING",
            EdgeKind::Falling => "FALLING",
            EdgeKind::Both => "BOTH",
        };
        write!(
            f,
            "{} (GPIO {}) {edge} -> {} = {} ({})",
            self.device, self.pin_id, self.device, self.raw_level, self.logical_state
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchState {
    Idle = 0,
    Armed = 1,
    Settling = 2,
    Stable = 3,
    Stopped = 4,
}

impl WatchState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WatchState::Idle,
            1 => WatchState::Armed,
            2 => WatchState::Settling,
            3 => WatchState::Stable,
            _ => WatchState::Stopped,
        }
    }
}

/// Moves to `next` unless the watcher has already been stopped.
fn transition(state: &AtomicU8, next: WatchState) -> bool {
    state
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
            (cur != WatchState::Stopped as u8).then_some(next as u8)
        })
        .is_ok()
}

#[derive(Debug)]
pub struct EdgeWatcher {
    input: InputDevice,
    state: Arc<AtomicU8>,
    events: Option<mpsc::UnboundedReceiver<EdgeEvent>>,
    task: Option<JoinHandle<()>>,
}

impl EdgeWatcher {
    pub fn new(input: InputDevice) -> Self {
        Self {
            input,
            state: Arc::new(AtomicU8::new(WatchState::Idle as u8)),
            events: None,
            task: None,
        }
    }

    /// Fails with `WrongDirection` for outputs.
    pub fn for_device(device: Device) -> Result<Self, AppError> {
        Ok(Self::new(device.into_input()?))
    }

    pub fn state(&self) -> WatchState {
        WatchState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Subscribes to both edges and arms the watcher. Must run inside a tokio
    /// runtime.
    pub fn start(&mut self, debounce: Duration) -> Result<(), AppError> {
        if self.state() != WatchState::Idle {
            return Err(AppError::InvalidValue(format!(
                "watcher for {} can only be started once",
                self.input.name()
            )));
        }

        let pin_id = self.input.pin_id();
        let (handler, raw_rx) = EdgeHandler::channel();
        self.input.backend().on_edge(
            pin_id,
            EdgeKind::Both,
            debounce.as_millis() as u64,
            handler,
        )?;
        // sampled after subscribing so no transition falls between the two
        let (initial, _) = match self.input.sample() {
            Ok(sample) => sample,
            Err(e) => {
                self.input.backend().clear_edge(pin_id)?;
                return Err(e);
            }
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.state
            .store(WatchState::Armed as u8, Ordering::Release);
        self.task = Some(tokio::spawn(settle(
            self.input.clone(),
            raw_rx,
            debounce,
            initial,
            self.state.clone(),
            event_tx,
        )));
        self.events = Some(event_rx);
        debug!(
            "armed {} (GPIO {pin_id}) with {}ms debounce",
            self.input.name(),
            debounce.as_millis()
        );
        Ok(())
    }

    /// Next settled edge; `None` once the watcher is stopped.
    pub async fn next_event(&mut self) -> Option<EdgeEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    pub fn stop(&mut self) -> Result<(), AppError> {
        let previous = self
            .state
            .swap(WatchState::Stopped as u8, Ordering::AcqRel);
        if previous == WatchState::Stopped as u8 {
            return Ok(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events = None;

        if previous != WatchState::Idle as u8 {
            self.input.backend().clear_edge(self.input.pin_id())?;
            debug!("stopped watching {}", self.input.name());
        }
        Ok(())
    }

    /// Runs a watch session: initial snapshot, then edges and periodic
    /// snapshots until `duration` expires or shutdown is requested. The
    /// watcher is stopped on every exit path.
    pub async fn watch(
        &mut self,
        duration: Duration,
        debounce: Duration,
        snapshot_every: Duration,
        shutdown: &mut Shutdown,
        sink: &dyn EventSink,
    ) -> Result<Outcome, AppError> {
        let result = self
            .run_session(duration, debounce, snapshot_every, shutdown, sink)
            .await;
        let stopped = self.stop();
        let outcome = result?;
        stopped?;
        Ok(outcome)
    }

    async fn run_session(
        &mut self,
        duration: Duration,
        debounce: Duration,
        snapshot_every: Duration,
        shutdown: &mut Shutdown,
        sink: &dyn EventSink,
    ) -> Result<Outcome, AppError> {
        self.emit_snapshot(sink, true)?;
        self.start(debounce)?;

        let deadline = time::sleep(duration);
        tokio::pin!(deadline);
        let mut ticker = time::interval(snapshot_every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately and the initial snapshot covers it
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    info!("watch on {} expired", self.input.name());
                    return Ok(Outcome::Expired);
                }
                _ = shutdown.cancelled() => return Ok(Outcome::Cancelled),
                Some(event) = self.next_event() => sink.emit(StatusEvent::Edge(event)),
                _ = ticker.tick() => self.emit_snapshot(sink, false)?,
            }
        }
    }

    fn emit_snapshot(&self, sink: &dyn EventSink, initial: bool) -> Result<(), AppError> {
        let (level, state) = self.input.sample()?;
        sink.emit(StatusEvent::Snapshot {
            device: self.input.name().to_string(),
            level,
            state,
            initial,
        });
        Ok(())
    }
}

impl Drop for EdgeWatcher {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop watcher for {}: {e}", self.input.name());
        }
    }
}

async fn settle(
    input: InputDevice,
    mut raw: mpsc::UnboundedReceiver<RawEdge>,
    debounce: Duration,
    mut reported: Level,
    state: Arc<AtomicU8>,
    events: mpsc::UnboundedSender<EdgeEvent>,
) {
    while let Some(mut last) = raw.recv().await {
        if !transition(&state, WatchState::Settling) {
            return;
        }
        loop {
            match time::timeout(debounce, raw.recv()).await {
                Ok(Some(edge)) => last = edge,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if !transition(&state, WatchState::Stable) {
            return;
        }
        match input.sample() {
            Ok((level, logical_state)) if level != reported => {
                reported = level;
                let event = EdgeEvent {
                    device: input.name().to_string(),
                    pin_id: input.pin_id(),
                    edge: match level {
                        Level::High => EdgeKind::Rising,
                        Level::Low => EdgeKind::Falling,
                    },
                    raw_level: level,
                    logical_state,
                    timestamp_ms: last.timestamp_ms,
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Ok(_) => debug!("{} bounced back to {reported}", input.name()),
            Err(e) => warn!("settled read failed for {}: {e}", input.name()),
        }

        if !transition(&state, WatchState::Armed) {
            return;
        }
    }
}
