//! Device/host clock divergence guard.

use contracts::ClockConfig;
use tracing::{trace, warn};

/// Timestamp chosen by [`ClockSkewGuard::correct`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockCorrection {
    /// Device units
    pub timestamp: f64,
    /// Host time was substituted
    pub corrected: bool,
}

/// Substitutes host time for device timestamps that look uninitialized.
///
/// Devices without hardware time sync may report timestamps that are off by
/// decades. Those are replaced by the host clock instead of failing.
#[derive(Debug)]
pub struct ClockSkewGuard {
    units_per_second: f64,
    threshold_s: f64,
    warned: bool,
    corrections: u64,
}

impl ClockSkewGuard {
    pub fn new(config: &ClockConfig) -> Self {
        Self {
            units_per_second: config.device_units_per_second,
            threshold_s: config.skew_threshold_s,
            warned: false,
            corrections: 0,
        }
    }

    /// Pick the timestamp to use for a frameset
    ///
    /// `raw` is in device units, `host_now_s` in seconds.
    pub fn correct(&mut self, raw: f64, host_now_s: f64) -> ClockCorrection {
        let raw_s = self.to_seconds(raw);
        let skew_s = raw_s - host_now_s;
        if skew_s.abs() <= self.threshold_s {
            return ClockCorrection {
                timestamp: raw,
                corrected: false,
            };
        }

        self.corrections += 1;
        metrics::counter!("capture_clock_skew_corrections_total").increment(1);
        if self.warned {
            trace!(raw, host_now_s, "device clock skew corrected");
        } else {
            self.warned = true;
            warn!(
                raw_s,
                host_now_s,
                skew_s,
                "device clock diverges from host clock, using host time; \
                 enable global time sync on the device to avoid this"
            );
        }

        ClockCorrection {
            timestamp: self.to_device_units(host_now_s),
            corrected: true,
        }
    }

    #[inline]
    pub fn to_seconds(&self, device: f64) -> f64 {
        device / self.units_per_second
    }

    #[inline]
    pub fn to_device_units(&self, seconds: f64) -> f64 {
        seconds * self.units_per_second
    }

    pub fn warned(&self) -> bool {
        self.warned
    }

    /// Number of substitutions so far
    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    pub fn reset(&mut self) {
        self.warned = false;
        self.corrections = 0;
    }
}
