//! Per-stream time series buffer with timestamp-based ordering.
//!
//! Uses index-based separation:
//! - HeapRb stores lightweight metadata (timestamp + slab key), kept sorted
//! - Slab stores the actual sample values
//!
//! Lookups walk the sorted index; values are only cloned out when a sample
//! is returned to the caller.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::Sample;
use ringbuf::{traits::*, HeapRb};
use slab::Slab;

/// Lightweight metadata stored in ring buffer
#[derive(Debug, Clone, Copy)]
struct SampleMeta {
    /// Timestamp for ordering
    timestamp: f64,
    /// Key into the slab storage
    slab_key: usize,
}

/// Outcome of locating a target timestamp in a series.
#[derive(Debug, Clone, PartialEq)]
pub enum BracketResult<V> {
    /// A stored sample has exactly the target timestamp
    ExactMatch(Sample<V>),
    /// Nearest samples strictly below and above the target
    Interpolated(Sample<V>, Sample<V>),
    /// Target precedes every stored sample; carries the earliest one
    BeforeEarliest(Sample<V>),
    /// Target follows every stored sample; carries the latest one
    AfterLatest(Sample<V>),
    /// Nothing stored yet
    Empty,
}

/// Bounded, timestamp-ordered store for one sample stream
///
/// Invariant: `len() <= capacity()` and the index is strictly increasing by
/// timestamp. On overflow the single earliest sample is evicted.
pub struct TimeSeriesBuffer<V> {
    /// Ring buffer of metadata, ascending by timestamp
    index: HeapRb<SampleMeta>,
    /// Actual value storage
    storage: Slab<V>,
    capacity: usize,
    latest: Option<f64>,
    dropped_count: u64,
    out_of_order_count: u64,
    duplicate_count: u64,
}

impl<V> fmt::Debug for TimeSeriesBuffer<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSeriesBuffer")
            .field("len", &self.index.occupied_len())
            .field("capacity", &self.capacity)
            .field("latest", &self.latest)
            .field("dropped", &self.dropped_count)
            .finish()
    }
}

impl<V: Clone> TimeSeriesBuffer<V> {
    /// Create a new buffer holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            index: HeapRb::new(capacity),
            storage: Slab::with_capacity(capacity),
            capacity,
            latest: None,
            dropped_count: 0,
            out_of_order_count: 0,
            duplicate_count: 0,
        }
    }

    /// Insert a sample in timestamp order
    ///
    /// Never fails. Duplicate timestamps are ignored, late samples are
    /// inserted at their sorted position.
    pub fn push(&mut self, timestamp: f64, value: V) {
        if !timestamp.is_finite() {
            self.dropped_count += 1;
            return;
        }

        match self.latest {
            Some(latest) if timestamp == latest => {
                self.duplicate_count += 1;
            }
            Some(latest) if timestamp < latest => {
                self.out_of_order_count += 1;
                self.insert_sorted(timestamp, value);
            }
            _ => {
                self.evict_if_full();
                self.append(timestamp, value);
                self.latest = Some(timestamp);
            }
        }
    }

    fn append(&mut self, timestamp: f64, value: V) {
        let slab_key = self.storage.insert(value);
        let _ = self.index.try_push(SampleMeta {
            timestamp,
            slab_key,
        });
    }

    fn evict_if_full(&mut self) {
        if self.index.is_full() {
            if let Some(oldest) = self.index.try_pop() {
                self.storage.remove(oldest.slab_key);
            }
            self.dropped_count += 1;
        }
    }

    fn insert_sorted(&mut self, timestamp: f64, value: V) {
        if self.index.iter().any(|m| m.timestamp == timestamp) {
            self.duplicate_count += 1;
            return;
        }

        if self.index.is_full() {
            // Would be evicted straight away
            if self
                .earliest_timestamp()
                .is_some_and(|earliest| timestamp < earliest)
            {
                self.dropped_count += 1;
                return;
            }
            self.evict_if_full();
        }

        // Rebuild index (only moves small metadata, not values)
        let mut metas: Vec<SampleMeta> = self.index.pop_iter().collect();
        let position = metas.partition_point(|m| m.timestamp < timestamp);
        let slab_key = self.storage.insert(value);
        metas.insert(
            position,
            SampleMeta {
                timestamp,
                slab_key,
            },
        );
        for meta in metas {
            let _ = self.index.try_push(meta);
        }
    }

    fn sample(&self, meta: &SampleMeta) -> Sample<V> {
        Sample::new(meta.timestamp, self.storage[meta.slab_key].clone())
    }

    /// Locate `target` among stored samples
    ///
    /// Pure read: repeated calls on unchanged state return equal results.
    pub fn bracket(&self, target: f64) -> BracketResult<V> {
        let mut lower: Option<&SampleMeta> = None;
        for meta in self.index.iter() {
            if meta.timestamp == target {
                return BracketResult::ExactMatch(self.sample(meta));
            }
            if meta.timestamp > target {
                return match lower {
                    Some(lower) => {
                        BracketResult::Interpolated(self.sample(lower), self.sample(meta))
                    }
                    None => BracketResult::BeforeEarliest(self.sample(meta)),
                };
            }
            lower = Some(meta);
        }

        match lower {
            Some(latest) => BracketResult::AfterLatest(self.sample(latest)),
            None => BracketResult::Empty,
        }
    }

    /// Samples with timestamps strictly inside `(lower, upper)`, ascending
    pub fn samples_between(&self, lower: f64, upper: f64) -> Vec<Sample<V>> {
        self.index
            .iter()
            .filter(|m| m.timestamp > lower && m.timestamp < upper)
            .map(|m| self.sample(m))
            .collect()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<Sample<V>> {
        let latest = self.latest?;
        self.index
            .iter()
            .find(|m| m.timestamp == latest)
            .map(|m| self.sample(m))
    }
}

impl<V> TimeSeriesBuffer<V> {
    #[inline]
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.latest
    }

    #[inline]
    pub fn earliest_timestamp(&self) -> Option<f64> {
        self.index.iter().next().map(|m| m.timestamp)
    }

    /// Get the number of samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.index.occupied_len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples evicted on overflow or rejected as unusable
    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// Samples that arrived with a timestamp older than the latest one
    #[inline]
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count
    }

    /// Samples ignored because their timestamp was already stored
    #[inline]
    pub fn duplicate_count(&self) -> u64 {
        self.duplicate_count
    }
}

/// Series shared between producer callbacks and the capture thread
///
/// Every method takes the lock for exactly one operation. Nothing here
/// sleeps, so the lock is never held across a wait.
pub struct SharedSeries<V> {
    inner: Arc<Mutex<TimeSeriesBuffer<V>>>,
}

impl<V> Clone for SharedSeries<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for SharedSeries<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.lock(), f)
    }
}

impl<V> SharedSeries<V> {
    // A panicking producer cannot leave the index half-written in a way
    // readers care about, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, TimeSeriesBuffer<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn latest_timestamp(&self) -> Option<f64> {
        self.lock().latest_timestamp()
    }

    pub fn earliest_timestamp(&self) -> Option<f64> {
        self.lock().earliest_timestamp()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn dropped_count(&self) -> u64 {
        self.lock().dropped_count()
    }

    pub fn out_of_order_count(&self) -> u64 {
        self.lock().out_of_order_count()
    }

    pub fn duplicate_count(&self) -> u64 {
        self.lock().duplicate_count()
    }
}

impl<V: Clone> SharedSeries<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimeSeriesBuffer::new(capacity))),
        }
    }

    pub fn push(&self, timestamp: f64, value: V) {
        self.lock().push(timestamp, value);
    }

    pub fn bracket(&self, target: f64) -> BracketResult<V> {
        self.lock().bracket(target)
    }

    pub fn samples_between(&self, lower: f64, upper: f64) -> Vec<Sample<V>> {
        self.lock().samples_between(lower, upper)
    }

    pub fn latest(&self) -> Option<Sample<V>> {
        self.lock().latest()
    }
}
