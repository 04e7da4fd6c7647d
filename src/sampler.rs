//! The background calibration sampler.
//!
//! A dedicated thread sleeps for the configured interval, re-measures the
//! cycles-per-nanosecond ratio from consecutive counter/wall-clock readings,
//! and republishes the cumulative estimate through the seqlock. Sampling
//! failures (wall clock unreadable, non-positive interval after a clock
//! step) skip the tick and retry on the next one.
//!
//! The thread is owned by [`SamplerHandle`], which signals a stop flag and
//! joins on [`SamplerHandle::stop`] and on drop, so teardown is
//! deterministic on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::calibration::SharedCalibration;
use crate::counter::CounterSource;
use crate::error::Error;
use crate::wallclock;

/// Diagnostic thread name, visible to profilers and `ps -L`.
pub(crate) const SAMPLER_THREAD_NAME: &str = "tscns-sampler";

/// Owning handle for the sampler thread.
pub(crate) struct SamplerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Spawn the sampler. Spawn failure is surfaced to the caller.
    pub fn spawn(
        source: CounterSource,
        shared: Arc<SharedCalibration>,
        interval: Duration,
        pinned_core: Option<usize>,
    ) -> Result<Self, Error> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(SAMPLER_THREAD_NAME.to_string())
            .spawn(move || run(&source, &shared, interval, pinned_core, &flag))
            .map_err(Error::Spawn)?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Signal the stop flag and join. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("calibration sampler panicked before join");
            }
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SamplerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerHandle")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

fn run(
    source: &CounterSource,
    shared: &SharedCalibration,
    interval: Duration,
    pinned_core: Option<usize>,
    stop: &AtomicBool,
) {
    if let Some(core) = pinned_core {
        if let Err(e) = pin_to_core(core) {
            tracing::warn!(core, error = %e, "CPU pinning failed; sampling unpinned");
        }
    }
    elevate_priority();

    tracing::debug!(
        interval_ms = interval.as_millis() as u64,
        counter = source.name(),
        "calibration sampler running"
    );

    // Continue from whatever a completed one-shot init may have seeded.
    let mut state = shared.snapshot();
    let mut last = baseline(source);

    while !stop.load(Ordering::Acquire) {
        thread::sleep(interval);
        if stop.load(Ordering::Acquire) {
            break;
        }

        let ns = match wallclock::realtime() {
            Ok(reading) => reading.ns,
            Err(e) => {
                tracing::warn!(error = %e, "wall clock read failed; skipping tick");
                continue;
            }
        };
        let counter = source.read();

        let Some((last_counter, last_ns)) = last else {
            last = Some((counter, ns));
            continue;
        };

        let ns_delta = ns - last_ns;
        let counter_delta = counter.wrapping_sub(last_counter);
        last = Some((counter, ns));

        if ns_delta <= 0 {
            // Realtime clock stepped backwards (NTP); the interval is unusable.
            tracing::warn!(ns_delta, "non-positive wall-clock interval; skipping tick");
            continue;
        }

        let ratio = counter_delta as f64 / ns_delta as f64;
        if !ratio.is_finite() || ratio <= 0.0 {
            tracing::warn!(ratio, "discarding degenerate ratio observation");
            continue;
        }

        state = state.observe(ratio);
        shared.publish(state);
    }

    tracing::debug!(samples = state.samples, "calibration sampler stopped");
}

/// First counter/wall-clock pair, taken before the loop so the first tick
/// already yields a sample. A failed read falls back to seeding the
/// baseline from the first successful tick.
fn baseline(source: &CounterSource) -> Option<(u64, i64)> {
    match wallclock::realtime() {
        Ok(reading) => {
            let counter = source.read();
            Some((counter, reading.ns))
        }
        Err(e) => {
            tracing::warn!(error = %e, "baseline wall clock read failed");
            None
        }
    }
}

/// Pin the calling thread to `core`. Enforced by the kernel on Linux,
/// advisory on macOS, unavailable elsewhere.
#[cfg(target_os = "linux")]
fn pin_to_core(core: usize) -> Result<(), std::io::Error> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);

        let result = libc::sched_setaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &set,
        );
        if result != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    tracing::debug!(core, "pinned calibration sampler");
    Ok(())
}

#[cfg(target_os = "macos")]
fn pin_to_core(core: usize) -> Result<(), std::io::Error> {
    // macOS offers no hard pinning; set an affinity tag so the scheduler
    // tends to keep the thread on one core. KERN_POLICY_STATIC (46) is
    // common on newer macOS and degrades gracefully.
    const THREAD_AFFINITY_POLICY: u32 = 4;
    const THREAD_AFFINITY_POLICY_COUNT: u32 = 1;

    extern "C" {
        fn thread_policy_set(
            thread: u32,
            flavor: u32,
            policy_info: *const i32,
            count: u32,
        ) -> i32;
    }

    unsafe {
        let thread_port = libc::pthread_mach_thread_np(libc::pthread_self());
        if thread_port == 0 {
            return Err(std::io::Error::other("failed to get mach thread port"));
        }

        let affinity_tag = core as i32 + 1; // non-zero enables the hint
        let result = thread_policy_set(
            thread_port,
            THREAD_AFFINITY_POLICY,
            &affinity_tag,
            THREAD_AFFINITY_POLICY_COUNT,
        );
        if result != 0 {
            return Err(std::io::Error::other(format!(
                "thread_policy_set failed with code {}",
                result
            )));
        }
    }
    tracing::debug!(core, "set macOS affinity hint (advisory)");
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn pin_to_core(_core: usize) -> Result<(), std::io::Error> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "CPU affinity not supported on this platform",
    ))
}

/// Best-effort priority elevation so sampler wakeups are not delayed by
/// preemption. Fails quietly without privileges.
fn elevate_priority() {
    use thread_priority::{ThreadPriority, ThreadPriorityValue};

    // Moderately high, not max, to avoid starving system threads.
    let Ok(value) = ThreadPriorityValue::try_from(75u8) else {
        return;
    };
    match thread_priority::set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
        Ok(()) => tracing::debug!("elevated sampler thread priority"),
        Err(e) => {
            tracing::debug!("priority elevation failed (expected without privileges): {:?}", e);
        }
    }
}
