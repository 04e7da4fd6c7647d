//! The TSC-to-wall-clock translator.
//!
//! [`TscClock`] is an owned object, not a process-wide singleton: pass it by
//! reference to every consumer. Multiple clocks (e.g. one per pinned core)
//! can coexist and be tested in isolation.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::anchor::ReferenceAnchor;
use crate::calibration::{CalibrationState, SharedCalibration};
use crate::config::Config;
use crate::counter::CounterSource;
use crate::error::Error;
use crate::sampler::SamplerHandle;
use crate::wallclock::{self, NS_PER_SEC};

/// Translates hardware cycle-counter readings into nanosecond wall-clock
/// timestamps.
///
/// The anchor is captured once at construction. Calibration runs either in
/// the background ([`start`](Self::start)) or synchronously once
/// ([`init`](Self::init)). Queries are non-blocking, callable from any
/// thread, and never touch the system clock.
#[derive(Debug)]
pub struct TscClock {
    anchor: ReferenceAnchor,
    shared: Arc<SharedCalibration>,
    source: CounterSource,
    config: Config,
    sampler: Mutex<Option<SamplerHandle>>,
}

impl TscClock {
    /// Construct a clock over the platform cycle counter.
    ///
    /// Captures the reference anchor; fails if the wall clock cannot be
    /// read, in which case no clock exists to misuse.
    pub fn new(config: Config) -> Result<Self, Error> {
        Self::with_source(config, CounterSource::default())
    }

    /// Construct a clock over an explicit counter source.
    pub fn with_source(config: Config, source: CounterSource) -> Result<Self, Error> {
        debug_assert!(config.validate().is_ok(), "invalid config: {:?}", config);
        let anchor = ReferenceAnchor::capture(&source)?;
        Ok(Self {
            anchor,
            shared: Arc::new(SharedCalibration::new()),
            source,
            config,
            sampler: Mutex::new(None),
        })
    }

    /// Start the background calibration sampler.
    ///
    /// Returns [`Error::CalibrationConflict`] if a sampler is already
    /// running, [`Error::Spawn`] if the thread could not be created.
    pub fn start(&self) -> Result<(), Error> {
        let mut slot = self.lock_sampler();
        if slot.is_some() {
            return Err(Error::CalibrationConflict);
        }
        let handle = SamplerHandle::spawn(
            self.source.clone(),
            Arc::clone(&self.shared),
            self.config.sample_interval,
            self.config.pinned_core,
        )?;
        *slot = Some(handle);
        Ok(())
    }

    /// Synchronous one-shot calibration.
    ///
    /// Sleeps the configured warm-up, takes a single counter/wall-clock
    /// pair, and seeds the calibration state with the one ratio observed
    /// against the anchor. Intended for short-lived processes that cannot
    /// wait for background samples.
    ///
    /// Returns [`Error::CalibrationConflict`] while the sampler is running;
    /// the two calibration paths never touch the shared state concurrently.
    pub fn init(&self) -> Result<(), Error> {
        // Holding the slot lock for the warm-up keeps start() out for the
        // whole one-shot window.
        let slot = self.lock_sampler();
        if slot.is_some() {
            return Err(Error::CalibrationConflict);
        }

        thread::sleep(self.config.init_warmup);
        let reading = wallclock::realtime()?;
        let counter = self.source.read();

        let ns_interval = reading.ns - self.anchor.ns;
        if ns_interval <= 0 {
            return Err(Error::WallClock(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "non-positive wall-clock interval during one-shot init",
            )));
        }
        let ratio = counter.wrapping_sub(self.anchor.counter) as f64 / ns_interval as f64;
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(Error::WallClock(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "degenerate counter ratio during one-shot init",
            )));
        }

        self.shared
            .publish(CalibrationState::UNCALIBRATED.observe(ratio));
        Ok(())
    }

    /// Stop the background sampler, if running, and join it.
    ///
    /// After this the most recently published ratio remains queryable.
    pub fn stop(&self) {
        if let Some(mut handle) = self.lock_sampler().take() {
            handle.stop();
        }
    }

    /// Current wall-clock time in nanoseconds since the Unix epoch, from a
    /// fresh counter reading.
    pub fn now_ns(&self) -> Result<i64, Error> {
        self.ns_from_tsc(self.source.read())
    }

    /// Convert a counter reading into nanoseconds since the Unix epoch,
    /// rounded to the nearest nanosecond.
    pub fn ns_from_tsc(&self, counter: u64) -> Result<i64, Error> {
        let state = self.shared.snapshot();
        if !state.is_calibrated() {
            return Err(Error::Uncalibrated);
        }
        let delta = counter as f64 - self.anchor.counter as f64;
        Ok(self.anchor.ns + (delta / state.cycles_per_ns).round() as i64)
    }

    /// Convert a counter reading into nanoseconds since local midnight on
    /// the anchor's capture day.
    pub fn ns_since_midnight_from_tsc(&self, counter: u64) -> Result<i64, Error> {
        Ok(self.ns_from_tsc(counter)? - self.anchor.ns_at_midnight)
    }

    /// Current wall-clock time split into whole seconds and the nanosecond
    /// remainder.
    pub fn now(&self) -> Result<(i64, u32), Error> {
        let ns = self.now_ns()?;
        Ok((ns.div_euclid(NS_PER_SEC), ns.rem_euclid(NS_PER_SEC) as u32))
    }

    /// Read the clock's counter source directly.
    pub fn counter(&self) -> u64 {
        self.source.read()
    }

    /// The reference anchor captured at construction.
    pub fn anchor(&self) -> &ReferenceAnchor {
        &self.anchor
    }

    /// Number of calibration samples folded in so far. Zero means
    /// uncalibrated.
    pub fn samples(&self) -> u32 {
        self.shared.snapshot().samples
    }

    /// The published cycles-per-nanosecond estimate, if calibrated.
    pub fn cycles_per_ns(&self) -> Option<f64> {
        let state = self.shared.snapshot();
        state.is_calibrated().then_some(state.cycles_per_ns)
    }

    fn lock_sampler(&self) -> std::sync::MutexGuard<'_, Option<SamplerHandle>> {
        self.sampler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Dropping the clock drops the sampler handle, which stops and joins the
// background thread on every exit path.
