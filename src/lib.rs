//! # tscns
//!
//! Translate raw CPU cycle-counter readings into nanosecond wall-clock
//! timestamps without touching the system clock on the hot path.
//!
//! A [`TscClock`] captures a one-time reference anchor (a cycle-counter value
//! paired with a simultaneously read wall-clock value) and then keeps a
//! cycles-per-nanosecond ratio calibrated in the background. Any thread can
//! convert a counter reading into a wall-clock timestamp with a couple of
//! arithmetic operations and one lock-free snapshot read.
//!
//! ## Calibration paths
//!
//! There are two mutually exclusive ways to calibrate:
//!
//! - [`TscClock::start`] spawns a background sampler thread that periodically
//!   re-measures the ratio and republishes a smoothed estimate. Optionally
//!   pins itself to a core to avoid cross-core counter drift.
//! - [`TscClock::init`] performs a synchronous one-shot calibration after a
//!   short warm-up, for short-lived processes that cannot wait for multiple
//!   background samples.
//!
//! Engaging both at the same time is a precondition violation and returns
//! [`Error::CalibrationConflict`] rather than corrupting the shared state.
//!
//! ## Common Pitfall: Querying Before Calibration
//!
//! Until the first calibration sample has been published, queries return
//! [`Error::Uncalibrated`]. This is deliberate: a numeric sentinel like `0`
//! is indistinguishable from a valid timestamp.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tscns::{Config, TscClock};
//!
//! fn main() -> Result<(), tscns::Error> {
//!     let clock = TscClock::new(Config::default())?;
//!     clock.start()?;
//!
//!     // Give the sampler a few intervals to publish a ratio.
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//!
//!     let ns = clock.now_ns()?;
//!     println!("wall clock now: {} ns since the epoch", ns);
//!
//!     let midnight_ns = clock.ns_since_midnight_from_tsc(clock.counter())?;
//!     println!("{} ns since local midnight", midnight_ns);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod anchor;
mod calibration;
mod clock;
mod config;
mod counter;
mod error;
mod sampler;
mod wallclock;

pub use anchor::ReferenceAnchor;
pub use calibration::CalibrationState;
pub use clock::TscClock;
pub use config::Config;
pub use counter::{read_tsc, CounterSource, SyntheticCounter};
pub use error::Error;
