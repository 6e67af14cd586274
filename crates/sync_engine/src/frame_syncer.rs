//! In-core multiplexed frame wait primitive.
//!
//! Image callbacks push frames through a bounded channel (never blocking);
//! the capture thread groups them by timestamp proximity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use contracts::{AssemblyConfig, ImageFrame, SourceError, StreamKind};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, trace};

use crate::assembler::FrameSource;

/// Physical stream slot
type Slot = (StreamKind, u8);

enum SyncerMessage {
    Frame(ImageFrame),
    Wake,
}

#[derive(Debug, Default)]
struct SyncerShared {
    disconnected: Mutex<Option<String>>,
    dropped: AtomicU64,
}

/// Producer half handed to image callbacks.
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<SyncerMessage>,
    shared: Arc<SyncerShared>,
}

impl std::fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender")
            .field("queued", &self.tx.len())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

impl FrameSender {
    /// Queue a frame; drops it when the queue is full
    pub fn push(&self, frame: ImageFrame) {
        match self.tx.try_send(SyncerMessage::Frame(frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("capture_frames_dropped_total").increment(1);
                trace!("frame queue full, dropping frame");
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!("frame syncer gone, dropping frame");
            }
        }
    }

    /// Make the next wait fail with [`SourceError::Disconnected`]
    pub fn notify_disconnected(&self, reason: impl Into<String>) {
        *self
            .shared
            .disconnected
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
        let _ = self.tx.try_send(SyncerMessage::Wake);
    }

    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Groups frames whose timestamps lie within a tolerance of each other.
///
/// A group is returned as soon as it covers the required streams, or
/// incomplete once a newer frame shows it can no longer grow. On timeout
/// the incomplete group is reported but kept pending.
pub struct FrameSyncer {
    tx: Sender<SyncerMessage>,
    rx: Receiver<SyncerMessage>,
    shared: Arc<SyncerShared>,
    required: Vec<StreamKind>,
    tolerance: f64,
    max_pending: usize,
    /// Ascending by timestamp
    pending: Vec<ImageFrame>,
    last_taken: HashMap<Slot, f64>,
}

impl std::fmt::Debug for FrameSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSyncer")
            .field("required", &self.required)
            .field("tolerance", &self.tolerance)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl FrameSyncer {
    pub fn new(required: Vec<StreamKind>, config: &AssemblyConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            shared: Arc::default(),
            required,
            tolerance: config.frameset_tolerance,
            max_pending: capacity,
            pending: Vec::new(),
            last_taken: HashMap::new(),
        }
    }

    pub fn sender(&self) -> FrameSender {
        FrameSender {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Forget pending frames and the disconnect flag
    pub fn reset(&mut self) {
        while self.rx.try_recv().is_ok() {}
        self.pending.clear();
        self.last_taken.clear();
        *self
            .shared
            .disconnected
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn disconnect_reason(&self) -> Option<String> {
        self.shared
            .disconnected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn accept(&mut self, message: SyncerMessage) {
        let SyncerMessage::Frame(frame) = message else {
            return;
        };

        if !self.required.contains(&frame.stream_kind) {
            trace!(kind = %frame.stream_kind, "ignoring frame of unrequested stream");
            return;
        }
        let slot = (frame.stream_kind, frame.stream_index);
        if self
            .last_taken
            .get(&slot)
            .is_some_and(|&taken| frame.timestamp <= taken)
        {
            debug!(
                kind = %frame.stream_kind,
                timestamp = frame.timestamp,
                "dropping late frame"
            );
            return;
        }

        let position = self
            .pending
            .partition_point(|f| f.timestamp <= frame.timestamp);
        self.pending.insert(position, frame);
        if self.pending.len() > self.max_pending {
            self.pending.remove(0);
        }
    }

    fn drain(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.accept(message);
        }
    }

    /// Indices into `pending` of the group anchored at the earliest frame
    fn candidate(&self) -> Vec<usize> {
        let Some(anchor) = self.pending.first().map(|f| f.timestamp) else {
            return Vec::new();
        };

        let mut picked: Vec<usize> = Vec::new();
        for (i, frame) in self.pending.iter().enumerate() {
            if frame.timestamp - anchor > self.tolerance {
                break;
            }
            let slot_taken = picked.iter().any(|&j| {
                let other = &self.pending[j];
                other.stream_kind == frame.stream_kind && other.stream_index == frame.stream_index
            });
            let kind_needed = self
                .required
                .iter()
                .filter(|&&k| k == frame.stream_kind)
                .count();
            let kind_picked = picked
                .iter()
                .filter(|&&j| self.pending[j].stream_kind == frame.stream_kind)
                .count();
            if !slot_taken && kind_picked < kind_needed {
                picked.push(i);
            }
        }
        picked
    }

    /// Whether a pending frame lies past the anchored group's window
    fn group_closed(&self) -> bool {
        match (self.pending.first(), self.pending.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp > self.tolerance,
            _ => false,
        }
    }

    fn take(&mut self, indices: &[usize]) -> Vec<ImageFrame> {
        let mut group = Vec::with_capacity(indices.len());
        for &i in indices.iter().rev() {
            group.push(self.pending.remove(i));
        }
        // The anchor window is spent; anything left inside it is surplus.
        if let Some(anchor) = group.last().map(|f| f.timestamp) {
            let tolerance = self.tolerance;
            self.pending.retain(|f| f.timestamp - anchor > tolerance);
        }
        for frame in &group {
            self.last_taken
                .insert((frame.stream_kind, frame.stream_index), frame.timestamp);
        }
        group.sort_by_key(|f| (f.stream_kind, f.stream_index));
        group
    }

    fn ready_group(&mut self) -> Option<Vec<ImageFrame>> {
        let candidate = self.candidate();
        if candidate.is_empty() {
            return None;
        }
        if candidate.len() == self.required.len() || self.group_closed() {
            return Some(self.take(&candidate));
        }
        None
    }
}

impl FrameSource for FrameSyncer {
    fn wait_for_frames(&mut self, timeout: Duration) -> Result<Vec<ImageFrame>, SourceError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.drain();
            if let Some(reason) = self.disconnect_reason() {
                return Err(SourceError::Disconnected { reason });
            }
            if let Some(group) = self.ready_group() {
                return Ok(group);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(message) => self.accept(message),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return Err(SourceError::Closed),
            }
        }

        if let Some(reason) = self.disconnect_reason() {
            return Err(SourceError::Disconnected { reason });
        }
        let mut partial: Vec<ImageFrame> = self
            .candidate()
            .into_iter()
            .map(|i| self.pending[i].clone())
            .collect();
        partial.sort_by_key(|f| (f.stream_kind, f.stream_index));
        Ok(partial)
    }
}
