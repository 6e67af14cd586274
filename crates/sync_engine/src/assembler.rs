//! Frameset assembly with bounded retry and deterministic role routing.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use contracts::{CaptureMode, FrameRole, FrameSet, ImageFrame, SourceError, StreamKind};
use tracing::{debug, instrument, trace, warn};

use crate::error::AssemblyError;

/// Multiplexed wait over all image streams.
pub trait FrameSource: Send {
    /// Block for at most `timeout` and return the next group of frames.
    ///
    /// The group may be empty or incomplete.
    ///
    /// # Errors
    /// Hardware failures; these are not retried by the assembler.
    fn wait_for_frames(&mut self, timeout: Duration) -> Result<Vec<ImageFrame>, SourceError>;
}

/// (mode, kind, order among same-kind frames) -> role
const ROUTES: &[(CaptureMode, StreamKind, usize, FrameRole)] = &[
    (CaptureMode::RgbDepth, StreamKind::Color, 0, FrameRole::Color),
    (CaptureMode::RgbDepth, StreamKind::Depth, 0, FrameRole::Depth),
    (CaptureMode::IrDepth, StreamKind::Infrared, 0, FrameRole::Color),
    (CaptureMode::IrDepth, StreamKind::Depth, 0, FrameRole::Depth),
    (CaptureMode::StereoIr, StreamKind::Infrared, 0, FrameRole::Right),
    (CaptureMode::StereoIr, StreamKind::Infrared, 1, FrameRole::Left),
    (CaptureMode::Fisheye, StreamKind::Fisheye, 0, FrameRole::Right),
    (CaptureMode::Fisheye, StreamKind::Fisheye, 1, FrameRole::Left),
    (CaptureMode::RgbDepthIr, StreamKind::Color, 0, FrameRole::Color),
    (CaptureMode::RgbDepthIr, StreamKind::Depth, 0, FrameRole::Depth),
    (CaptureMode::RgbDepthIr, StreamKind::Infrared, 0, FrameRole::Auxiliary),
];

/// Role of the `order`-th frame of `kind` in `mode`
pub fn route(mode: CaptureMode, kind: StreamKind, order: usize) -> Option<FrameRole> {
    ROUTES
        .iter()
        .find(|(m, k, o, _)| *m == mode && *k == kind && *o == order)
        .map(|&(_, _, _, role)| role)
}

/// Assign each frame its role. Frames are taken in the order given.
pub fn route_frames(mode: CaptureMode, frames: Vec<ImageFrame>) -> Result<FrameSet, AssemblyError> {
    let received = frames.len();
    let timestamp = frames
        .iter()
        .map(|f| f.timestamp)
        .fold(f64::INFINITY, f64::min);

    let mut seen: BTreeMap<StreamKind, usize> = BTreeMap::new();
    let mut routed = BTreeMap::new();
    for frame in frames {
        let order = seen.entry(frame.stream_kind).or_insert(0);
        let role = route(mode, frame.stream_kind, *order).ok_or_else(|| {
            AssemblyError::Unroutable {
                reason: format!(
                    "no role for {} frame #{} in {:?} mode",
                    frame.stream_kind,
                    *order + 1,
                    mode
                ),
            }
        })?;
        *order += 1;
        routed.insert(role, frame);
    }

    Ok(FrameSet {
        mode,
        timestamp,
        frames: routed,
        received,
    })
}

/// Drives a [`FrameSource`] until a complete frameset is available or the
/// retry deadline passes.
#[derive(Debug)]
pub struct FrameSetAssembler<S> {
    source: S,
    mode: CaptureMode,
}

impl<S: FrameSource> FrameSetAssembler<S> {
    pub fn new(source: S, mode: CaptureMode) -> Self {
        Self { source, mode }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Collect one frameset holding exactly `required.len()` frames
    ///
    /// Waits `initial_timeout` first, then retries in `retry_timeout` steps
    /// until `deadline` has passed since the first wait returned. Worst-case
    /// wall time is `initial_timeout + deadline + retry_timeout`; a source that
    /// keeps delivering partial groups ends the first wait early, so the bound
    /// becomes `deadline + retry_timeout` plus one delivery period.
    #[instrument(
        name = "assembler_assemble",
        skip(self, required),
        fields(mode = ?self.mode, required = required.len())
    )]
    pub fn assemble(
        &mut self,
        required: &[StreamKind],
        initial_timeout: Duration,
        retry_timeout: Duration,
        deadline: Duration,
    ) -> Result<FrameSet, AssemblyError> {
        let required_count = required.len();
        let started = Instant::now();
        let mut frames = self.source.wait_for_frames(initial_timeout)?;
        let first_returned = Instant::now();
        let mut retries = 0u32;
        while frames.len() != required_count && first_returned.elapsed() < deadline {
            trace!(
                received = frames.len(),
                required = required_count,
                "incomplete frameset, waiting again"
            );
            frames = self.source.wait_for_frames(retry_timeout)?;
            retries += 1;
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if frames.len() == required_count {
            debug!(retries, elapsed_ms, "frameset assembled");
            return route_frames(self.mode, frames);
        }

        if frames.is_empty() {
            warn!(retries, elapsed_ms, "no frames received");
            Err(AssemblyError::Timeout {
                required: required_count,
                elapsed_ms,
            })
        } else {
            warn!(
                retries,
                received = frames.len(),
                required = required_count,
                elapsed_ms,
                "frameset incomplete at deadline"
            );
            Err(AssemblyError::PartialData {
                received: frames.len(),
                required: required_count,
            })
        }
    }
}
