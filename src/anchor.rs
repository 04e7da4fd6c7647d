//! The reference anchor: a one-time (counter, wall clock) snapshot.

use crate::counter::CounterSource;
use crate::error::Error;
use crate::wallclock;

/// A simultaneously captured cycle-counter / wall-clock pair, used as the
/// origin for every later conversion.
///
/// Written exactly once, before any reader exists; immutable afterwards.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceAnchor {
    /// Counter value at capture.
    pub counter: u64,
    /// Wall-clock nanoseconds since the Unix epoch at capture.
    pub ns: i64,
    /// Wall-clock nanosecond value of local midnight on the capture day,
    /// enabling same-day "nanoseconds since midnight" timestamps.
    pub ns_at_midnight: i64,
}

impl ReferenceAnchor {
    /// Capture an anchor: wall clock first, then the counter, back to back
    /// with no intervening work.
    ///
    /// Fails if the wall clock cannot be read; the caller must not proceed
    /// with a zero-filled anchor.
    pub fn capture(source: &CounterSource) -> Result<Self, Error> {
        let reading = wallclock::realtime()?;
        let counter = source.read();
        Ok(Self {
            counter,
            ns: reading.ns,
            ns_at_midnight: reading.ns_at_local_midnight(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallclock::NS_PER_DAY;

    #[test]
    fn test_capture_populates_all_fields() {
        let anchor = ReferenceAnchor::capture(&CounterSource::Monotonic)
            .expect("anchor capture should succeed");
        assert!(anchor.ns > 0);
        assert!(anchor.ns_at_midnight <= anchor.ns);
    }

    #[test]
    fn test_capture_same_day_offset() {
        let anchor = ReferenceAnchor::capture(&CounterSource::Tsc).unwrap();
        let since_midnight = anchor.ns - anchor.ns_at_midnight;
        assert!(
            (0..NS_PER_DAY).contains(&since_midnight),
            "anchor is {} ns past its own midnight",
            since_midnight
        );
    }
}
