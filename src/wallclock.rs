//! Wall-clock primitives for anchor capture and calibration sampling.
//!
//! On unix targets the realtime clock is read via `clock_gettime` and local
//! midnight is derived with `localtime_r`. Elsewhere `SystemTime` stands in
//! and midnight falls back to UTC.

use crate::error::Error;

/// Nanoseconds per second.
pub(crate) const NS_PER_SEC: i64 = 1_000_000_000;

/// Nanoseconds per calendar day.
pub(crate) const NS_PER_DAY: i64 = 86_400 * NS_PER_SEC;

/// One realtime clock reading, kept in a form that still allows local
/// calendar arithmetic on the same instant.
pub(crate) struct WallClockReading {
    /// Nanoseconds since the Unix epoch.
    pub ns: i64,
    #[cfg(unix)]
    ts: libc::timespec,
}

/// Read `CLOCK_REALTIME`. A failed read is surfaced, never zero-filled.
#[cfg(unix)]
pub(crate) fn realtime() -> Result<WallClockReading, Error> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: passing a valid pointer to a stack-allocated timespec.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    if rc != 0 {
        return Err(Error::WallClock(std::io::Error::last_os_error()));
    }
    Ok(WallClockReading {
        ns: ts.tv_sec as i64 * NS_PER_SEC + ts.tv_nsec as i64,
        ts,
    })
}

#[cfg(not(unix))]
pub(crate) fn realtime() -> Result<WallClockReading, Error> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let dur = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|e| {
        Error::WallClock(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    Ok(WallClockReading {
        ns: dur.as_nanos() as i64,
    })
}

impl WallClockReading {
    /// Wall-clock nanosecond value of midnight on the day of this reading.
    ///
    /// Uses the local time zone on unix; UTC elsewhere (and on the
    /// vanishingly unlikely `localtime_r` failure).
    pub fn ns_at_local_midnight(&self) -> i64 {
        #[cfg(unix)]
        {
            let mut tm = std::mem::MaybeUninit::<libc::tm>::uninit();
            // SAFETY: tv_sec is a valid time_t and tm is a valid out pointer.
            let res = unsafe { libc::localtime_r(&self.ts.tv_sec, tm.as_mut_ptr()) };
            if res.is_null() {
                tracing::warn!("localtime_r failed; deriving midnight in UTC");
                return self.ns - self.ns.rem_euclid(NS_PER_DAY);
            }
            // SAFETY: localtime_r succeeded, so tm is initialized.
            let tm = unsafe { tm.assume_init() };
            let sec_since_midnight =
                tm.tm_hour as i64 * 3600 + tm.tm_min as i64 * 60 + tm.tm_sec as i64;
            self.ns - sec_since_midnight * NS_PER_SEC - self.ts.tv_nsec as i64
        }

        #[cfg(not(unix))]
        {
            self.ns - self.ns.rem_euclid(NS_PER_DAY)
        }
    }
}
