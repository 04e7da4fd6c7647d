//! Calibration state and its torn-read-free publication.
//!
//! The sampler (or the one-shot init path) republishes [`CalibrationState`]
//! while any number of threads read it on the query path. All three fields
//! must be observed as one consistent snapshot, so publication goes through
//! a sequence lock: the writer makes the sequence odd, stores the fields,
//! then makes it even again; a reader retries whenever it saw an odd
//! sequence or the sequence changed across its read.
//!
//! The write side is additionally serialized with an internal mutex, so a
//! misuse of the two calibration entry points degrades into blocking rather
//! than a corrupted snapshot. Readers never take that mutex.

use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// The published cycles-per-nanosecond estimate with its running sums.
///
/// `samples == 0` means uncalibrated; `cycles_per_ns > 0` holds whenever
/// `samples > 0`. The estimate is the unweighted cumulative mean of all
/// ratio observations since construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationState {
    /// Current cycles-per-nanosecond estimate.
    pub cycles_per_ns: f64,
    /// Sum of all ratio observations so far.
    pub ratio_sum: f64,
    /// Number of ratio observations so far.
    pub samples: u32,
}

impl CalibrationState {
    /// The pre-calibration state.
    pub(crate) const UNCALIBRATED: Self = Self {
        cycles_per_ns: 0.0,
        ratio_sum: 0.0,
        samples: 0,
    };

    /// Whether at least one ratio observation has been folded in.
    pub fn is_calibrated(&self) -> bool {
        self.samples > 0
    }

    /// Fold one instantaneous ratio observation into the cumulative mean.
    pub(crate) fn observe(&self, ratio: f64) -> Self {
        let ratio_sum = self.ratio_sum + ratio;
        let samples = self.samples + 1;
        Self {
            cycles_per_ns: ratio_sum / f64::from(samples),
            ratio_sum,
            samples,
        }
    }
}

/// Seqlock-guarded calibration state shared between the single calibration
/// writer and any number of query-path readers.
pub(crate) struct SharedCalibration {
    seq: AtomicU64,
    state: UnsafeCell<CalibrationState>,
    writer: Mutex<()>,
}

// SAFETY: `state` is only written under `writer` with the sequence odd, and
// readers validate the sequence around their read, discarding torn values.
unsafe impl Sync for SharedCalibration {}

impl SharedCalibration {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            state: UnsafeCell::new(CalibrationState::UNCALIBRATED),
            writer: Mutex::new(()),
        }
    }

    /// Publish a new snapshot. Single logical writer; concurrent callers
    /// serialize on the internal mutex.
    pub fn publish(&self, state: CalibrationState) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        // SAFETY: sole writer (mutex held), readers reject odd sequences.
        unsafe { std::ptr::write_volatile(self.state.get(), state) };
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Read an internally consistent snapshot without blocking.
    ///
    /// The writer's critical section is two stores, so retries are rare and
    /// short; this spins rather than parking.
    pub fn snapshot(&self) -> CalibrationState {
        loop {
            let seq = self.seq.load(Ordering::Acquire);
            if seq & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }
            // SAFETY: validated against the sequence below; a torn value is
            // never returned.
            let state = unsafe { std::ptr::read_volatile(self.state.get()) };
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == seq {
                return state;
            }
            std::hint::spin_loop();
        }
    }
}

impl std::fmt::Debug for SharedCalibration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCalibration")
            .field("state", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_observe_cumulative_mean() {
        let state = CalibrationState::UNCALIBRATED
            .observe(2.0)
            .observe(4.0)
            .observe(3.0);
        assert_eq!(state.samples, 3);
        assert_eq!(state.ratio_sum, 9.0);
        assert!((state.cycles_per_ns - 3.0).abs() < 1e-12);
        assert!(state.is_calibrated());
    }

    #[test]
    fn test_uncalibrated_default() {
        let shared = SharedCalibration::new();
        let state = shared.snapshot();
        assert_eq!(state.samples, 0);
        assert!(!state.is_calibrated());
    }

    #[test]
    fn test_publish_then_snapshot() {
        let shared = SharedCalibration::new();
        shared.publish(CalibrationState::UNCALIBRATED.observe(3.25));
        let state = shared.snapshot();
        assert_eq!(state.samples, 1);
        assert_eq!(state.cycles_per_ns, 3.25);
    }

    /// Torn-read stress: one writer continuously republishing states whose
    /// fields are mutually consistent by construction, N readers checking
    /// that consistency on every snapshot. A torn read would surface as a
    /// ratio_sum that does not match cycles_per_ns * samples.
    #[test]
    fn test_snapshot_never_tears() {
        const READERS: usize = 4;
        const RATIO: f64 = 3.0;

        let shared = Arc::new(SharedCalibration::new());
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let shared = Arc::clone(&shared);
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    let mut observed = 0u64;
                    while !done.load(Ordering::Acquire) {
                        let state = shared.snapshot();
                        if state.samples == 0 {
                            continue;
                        }
                        observed += 1;
                        assert!(state.cycles_per_ns > 0.0, "published ratio of zero");
                        // Every observation is exactly RATIO, so the sums
                        // stay exactly representable and any mix of fields
                        // from different publishes is detectable.
                        assert_eq!(
                            state.cycles_per_ns, RATIO,
                            "inconsistent ratio at sample {}",
                            state.samples
                        );
                        assert_eq!(
                            state.ratio_sum,
                            RATIO * f64::from(state.samples),
                            "torn read: sum does not match count"
                        );
                    }
                    observed
                })
            })
            .collect();

        let mut state = CalibrationState::UNCALIBRATED;
        for _ in 0..200_000 {
            state = state.observe(RATIO);
            shared.publish(state);
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            let observed = reader.join().expect("reader panicked");
            assert!(observed > 0, "reader never saw a calibrated snapshot");
        }
    }
}
