//! Error taxonomy for clock construction, calibration, and queries.

use std::fmt;
use std::io;

/// Errors surfaced by [`TscClock`](crate::TscClock).
///
/// Per-tick sampling failures inside the background sampler are not errors
/// at this level; they are logged and retried on the next interval.
#[derive(Debug)]
pub enum Error {
    /// The wall clock could not be read. Fatal during anchor capture and
    /// one-shot init; the clock must not proceed with zeroed fields.
    WallClock(io::Error),

    /// A query ran before any calibration sample was published.
    ///
    /// Distinguishable by type from a valid timestamp of zero.
    Uncalibrated,

    /// The background sampler thread could not be spawned.
    Spawn(io::Error),

    /// Both calibration paths were engaged at once. The sampler and the
    /// one-shot init are mutually exclusive while either is active.
    CalibrationConflict,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::WallClock(e) => write!(f, "wall clock read failed: {}", e),
            Error::Uncalibrated => {
                write!(f, "no calibration sample has been published yet")
            }
            Error::Spawn(e) => {
                write!(f, "failed to spawn calibration sampler thread: {}", e)
            }
            Error::CalibrationConflict => write!(
                f,
                "calibration sampler is active; one-shot init and start are \
                 mutually exclusive"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::WallClock(e) | Error::Spawn(e) => Some(e),
            Error::Uncalibrated | Error::CalibrationConflict => None,
        }
    }
}
