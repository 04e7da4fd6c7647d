//! Hardware cycle-counter access with platform-specific implementations.
//!
//! The raw reader is serialized so the counter read cannot be scheduled
//! around neighbouring work:
//! - **x86_64**: `lfence; rdtsc`
//! - **aarch64**: `isb; mrs cntvct_el0`
//! - Other targets fall back to `std::time::Instant`, which is correct but
//!   ticks in nanoseconds rather than cycles (lower sampling resolution).

use std::time::Instant;

/// Read the platform cycle counter with appropriate serialization.
///
/// The value increases monotonically on a given core and wraps only on
/// counter overflow (not handled here).
#[inline]
pub fn read_tsc() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        read_tsc_x86_64()
    }

    #[cfg(target_arch = "aarch64")]
    {
        read_tsc_aarch64()
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        monotonic_ticks()
    }
}

/// x86_64 implementation using lfence + rdtsc.
#[cfg(target_arch = "x86_64")]
#[inline]
fn read_tsc_x86_64() -> u64 {
    std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);

    let cycles: u64;
    unsafe {
        std::arch::asm!(
            "lfence",
            "rdtsc",
            "shl rdx, 32",
            "or rax, rdx",
            out("rax") cycles,
            out("rdx") _,
            options(nostack, nomem),
        );
    }

    std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
    cycles
}

/// aarch64 implementation using isb + mrs cntvct_el0.
#[cfg(target_arch = "aarch64")]
#[inline]
fn read_tsc_aarch64() -> u64 {
    std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);

    let cycles: u64;
    unsafe {
        std::arch::asm!(
            "isb",
            "mrs {}, cntvct_el0",
            out(reg) cycles,
            options(nostack, nomem),
        );
    }

    std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
    cycles
}

/// Nanosecond ticks from a process-wide monotonic origin.
#[inline]
fn monotonic_ticks() -> u64 {
    use std::sync::OnceLock;
    static ORIGIN: OnceLock<Instant> = OnceLock::new();

    let origin = ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_nanos() as u64
}

/// Where counter readings come from.
///
/// The enum-based approach keeps the hot path free of dynamic dispatch while
/// still allowing a portable fallback and a deterministic test source.
#[derive(Debug, Clone, Default)]
pub enum CounterSource {
    /// The platform cycle counter (rdtsc on x86_64, cntvct_el0 on ARM64,
    /// `Instant` nanoseconds elsewhere).
    #[default]
    Tsc,

    /// Explicit `Instant`-based source. Portable and monotonic, with one
    /// tick per nanosecond instead of one per cycle.
    Monotonic,

    /// A counter ticking at a fixed, known frequency. Lets calibration be
    /// validated against a reference frequency instead of real hardware.
    Synthetic(SyntheticCounter),
}

impl CounterSource {
    /// Read the current counter value.
    #[inline]
    pub fn read(&self) -> u64 {
        match self {
            CounterSource::Tsc => read_tsc(),
            CounterSource::Monotonic => monotonic_ticks(),
            CounterSource::Synthetic(counter) => counter.read(),
        }
    }

    /// Source name for diagnostics and metadata.
    pub fn name(&self) -> &'static str {
        match self {
            CounterSource::Tsc => {
                #[cfg(target_arch = "x86_64")]
                {
                    "rdtsc"
                }
                #[cfg(target_arch = "aarch64")]
                {
                    "cntvct_el0"
                }
                #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
                {
                    "instant"
                }
            }
            CounterSource::Monotonic => "monotonic",
            CounterSource::Synthetic(_) => "synthetic",
        }
    }
}

/// A counter that ticks at an exact, configured frequency.
///
/// Ticks are derived from a monotonic `Instant`, so the counter advances in
/// real time but its cycles-per-nanosecond ratio is known ahead of time.
#[derive(Debug, Clone)]
pub struct SyntheticCounter {
    cycles_per_ns: f64,
    origin: Instant,
    base: u64,
}

impl SyntheticCounter {
    /// Create a counter running at `cycles_per_ns` ticks per nanosecond.
    ///
    /// # Panics
    ///
    /// Panics if `cycles_per_ns` is not strictly positive and finite.
    pub fn new(cycles_per_ns: f64) -> Self {
        assert!(
            cycles_per_ns > 0.0 && cycles_per_ns.is_finite(),
            "cycles_per_ns must be positive and finite"
        );
        Self {
            cycles_per_ns,
            origin: Instant::now(),
            // Arbitrary non-zero start so conversions exercise the anchor offset.
            base: 1 << 32,
        }
    }

    /// The configured reference frequency in cycles per nanosecond.
    pub fn cycles_per_ns(&self) -> f64 {
        self.cycles_per_ns
    }

    #[inline]
    fn read(&self) -> u64 {
        let elapsed_ns = self.origin.elapsed().as_nanos() as f64;
        self.base + (elapsed_ns * self.cycles_per_ns) as u64
    }
}
