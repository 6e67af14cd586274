//! Temporal interpolation over buffered motion and pose series.

use std::thread;
use std::time::Duration;

use contracts::{InterpolationConfig, MotionSample, PoseSample, Sample};
use nalgebra::Vector3;
use tracing::{debug, instrument, warn};

use crate::buffer::{BracketResult, SharedSeries};
use crate::error::InterpolationError;

/// Value that can be blended between two bracketing samples.
pub trait Interpolate: Clone {
    /// `t` is in `[0, 1]`, 0 yielding `lower`.
    fn interpolate(lower: &Self, upper: &Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn interpolate(lower: &Self, upper: &Self, t: f64) -> Self {
        lower + t * (upper - lower)
    }
}

impl Interpolate for Vector3<f64> {
    fn interpolate(lower: &Self, upper: &Self, t: f64) -> Self {
        lower + (upper - lower) * t
    }
}

impl Interpolate for MotionSample {
    fn interpolate(lower: &Self, upper: &Self, t: f64) -> Self {
        Self {
            kind: lower.kind,
            vector: Vector3::interpolate(&lower.vector, &upper.vector, t),
        }
    }
}

impl Interpolate for PoseSample {
    /// Translation is lerped, rotation slerped. Confidence is not
    /// interpolated; it comes from the lower sample.
    fn interpolate(lower: &Self, upper: &Self, t: f64) -> Self {
        let transform = lower
            .transform
            .try_lerp_slerp(&upper.transform, t, 1.0e-9)
            .unwrap_or_else(|| {
                // Opposite rotations have no unique slerp path
                let mut transform = lower.transform;
                transform.translation.vector = Vector3::interpolate(
                    &lower.transform.translation.vector,
                    &upper.transform.translation.vector,
                    t,
                );
                transform
            });
        Self {
            transform,
            confidence: lower.confidence,
        }
    }
}

/// Blend two bracketing samples at `target`.
///
/// A degenerate bracket (equal timestamps) returns `lower` unchanged.
pub fn interpolate_between<V: Interpolate>(
    lower: &Sample<V>,
    upper: &Sample<V>,
    target: f64,
) -> Sample<V> {
    let span = upper.timestamp - lower.timestamp;
    if span == 0.0 {
        return lower.clone();
    }
    let t = (target - lower.timestamp) / span;
    Sample::new(target, V::interpolate(&lower.value, &upper.value, t))
}

/// Resolves series values at arbitrary timestamps with a bounded wait for
/// late samples.
///
/// Holds one-time warning state; call [`reset`](Self::reset) when the
/// capture pipeline is restarted.
#[derive(Debug)]
pub struct TemporalInterpolator {
    poll_interval_ms: u64,
    global_time_sync: bool,
    too_old_warned: bool,
    stale_warned: bool,
    extrapolation_warned: bool,
}

impl TemporalInterpolator {
    pub fn new(config: &InterpolationConfig) -> Self {
        Self {
            poll_interval_ms: config.poll_interval_ms.max(1),
            global_time_sync: config.global_time_sync,
            too_old_warned: false,
            stale_warned: false,
            extrapolation_warned: false,
        }
    }

    /// Resolve the value of `series` at `timestamp`
    ///
    /// While the target lies past the newest sample, polls every
    /// `poll_interval_ms` for at most `max_wait_ms`. The series lock is only
    /// taken for each lookup, never across the sleep.
    #[instrument(
        name = "interpolator_resolve",
        level = "trace",
        skip(self, series)
    )]
    pub fn resolve<V: Interpolate>(
        &mut self,
        series: &SharedSeries<V>,
        timestamp: f64,
        max_wait_ms: u64,
    ) -> Result<Sample<V>, InterpolationError> {
        let mut bracket = series.bracket(timestamp);
        let mut polls_left = max_wait_ms / self.poll_interval_ms;
        while matches!(bracket, BracketResult::AfterLatest(_)) && polls_left > 0 {
            thread::sleep(Duration::from_millis(self.poll_interval_ms));
            polls_left -= 1;
            bracket = series.bracket(timestamp);
        }

        let result = match bracket {
            BracketResult::ExactMatch(sample) => Ok(sample),
            BracketResult::Interpolated(lower, upper) => {
                Ok(interpolate_between(&lower, &upper, timestamp))
            }
            BracketResult::BeforeEarliest(earliest) => {
                if !self.too_old_warned {
                    self.too_old_warned = true;
                    warn!(
                        timestamp,
                        earliest = earliest.timestamp,
                        "target timestamp precedes buffered samples"
                    );
                }
                Err(InterpolationError::TooOld {
                    target: timestamp,
                    earliest: earliest.timestamp,
                })
            }
            BracketResult::AfterLatest(latest) if self.global_time_sync => {
                if !self.stale_warned {
                    self.stale_warned = true;
                    warn!(
                        timestamp,
                        latest = latest.timestamp,
                        max_wait_ms,
                        "no sample arrived past target within wait budget"
                    );
                }
                Err(InterpolationError::Stale {
                    target: timestamp,
                    latest: latest.timestamp,
                })
            }
            BracketResult::AfterLatest(latest) => {
                if !self.extrapolation_warned {
                    self.extrapolation_warned = true;
                    warn!(
                        timestamp,
                        latest = latest.timestamp,
                        "streams are not globally time synced, using latest sample \
                         instead of interpolating"
                    );
                }
                Ok(Sample::new(timestamp, latest.value))
            }
            BracketResult::Empty => Err(InterpolationError::Empty),
        };

        if let Err(err) = &result {
            debug!(timestamp, reason = err.reason(), "interpolation failed");
            metrics::counter!("capture_interpolation_failures_total", "reason" => err.reason())
                .increment(1);
        }
        result
    }

    /// Clear one-time warning state
    pub fn reset(&mut self) {
        self.too_old_warned = false;
        self.stale_warned = false;
        self.extrapolation_warned = false;
    }

    pub fn extrapolation_warned(&self) -> bool {
        self.extrapolation_warned
    }

    pub fn stale_warned(&self) -> bool {
        self.stale_warned
    }

    pub fn too_old_warned(&self) -> bool {
        self.too_old_warned
    }
}
