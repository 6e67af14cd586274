//! Deterministic source replaying a fixed event script.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::{ContractError, SensorDataCallback, SensorPacket, SensorSource, SourceEvent};
use tracing::{debug, trace, warn};

/// One scripted step: wait `delay`, then deliver `event`
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub delay: Duration,
    pub event: SourceEvent,
}

/// Replays a script on a single callback thread after `listen`.
///
/// Steps are delivered in script order, so timestamps may be out of order or
/// duplicated on purpose.
pub struct ScriptedSource {
    name: String,
    script: Vec<ScriptStep>,
    pending_delay: Duration,
    listening: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptedSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Vec::new(),
            pending_delay: Duration::ZERO,
            listening: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Append a packet delivered right after the previous step
    pub fn packet(self, packet: SensorPacket) -> Self {
        self.step(Duration::ZERO, SourceEvent::Packet(packet))
    }

    /// Append several packets at once
    pub fn packets(self, packets: impl IntoIterator<Item = SensorPacket>) -> Self {
        packets.into_iter().fold(self, Self::packet)
    }

    /// Delay the next step by `delay`
    pub fn pause(mut self, delay: Duration) -> Self {
        self.pending_delay += delay;
        self
    }

    pub fn step(mut self, delay: Duration, event: SourceEvent) -> Self {
        let delay = delay + std::mem::take(&mut self.pending_delay);
        self.script.push(ScriptStep { delay, event });
        self
    }

    pub fn disconnect(self, reason: impl Into<String>) -> Self {
        self.step(
            Duration::ZERO,
            SourceEvent::Disconnected {
                reason: reason.into(),
            },
        )
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    /// Every step has been delivered
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ScriptedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSource")
            .field("name", &self.name)
            .field("steps", &self.script.len())
            .field("listening", &self.is_listening())
            .finish()
    }
}

impl SensorSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, callback: SensorDataCallback) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        let script = self.script.clone();
        let listening = self.listening.clone();
        let finished = self.finished.clone();
        let name = self.name.clone();

        let handle = thread::spawn(move || {
            debug!(source = %name, steps = script.len(), "script replay started");
            for (i, step) in script.into_iter().enumerate() {
                if !step.delay.is_zero() {
                    thread::sleep(step.delay);
                }
                if !listening.load(Ordering::Relaxed) {
                    debug!(source = %name, delivered = i, "script replay interrupted");
                    return;
                }
                trace!(source = %name, step = i, "script step");
                callback(step.event);
            }
            finished.store(true, Ordering::Release);
            debug!(source = %name, "script replay finished");
        });
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn stop(&self) -> Result<(), ContractError> {
        self.listening.store(false, Ordering::SeqCst);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!(source = %self.name, "script thread panicked");
                return Err(ContractError::source(&self.name, "script thread panicked"));
            }
        }
        Ok(())
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}
