// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Wire-friendly duration/timestamp types used by job timeouts and monitor publish deadlines.

use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};

/// A non-negative duration, convertible to/from `prost_types::Duration` so it can ride on the
/// wire without every caller re-deriving the conversion.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Duration {
    secs: u64,
    nanos: u32,
}

impl Duration {
    pub const ZERO: Duration = Duration { secs: 0, nanos: 0 };

    pub fn from_secs(secs: u64) -> Duration {
        Duration { secs, nanos: 0 }
    }

    pub fn from_days(days: u64) -> Duration {
        Duration::from_secs(days * 24 * 60 * 60)
    }

    pub fn as_std(&self) -> StdDuration {
        StdDuration::new(self.secs, self.nanos)
    }

    pub fn checked_sub(&self, other: Duration) -> Option<Duration> {
        self.as_std()
            .checked_sub(other.as_std())
            .map(Duration::from)
    }

    pub fn div_u32(&self, divisor: u32) -> Duration {
        Duration::from(self.as_std() / divisor)
    }
}

impl From<StdDuration> for Duration {
    fn from(d: StdDuration) -> Duration {
        Duration {
            secs: d.as_secs(),
            nanos: d.subsec_nanos(),
        }
    }
}

impl From<Duration> for StdDuration {
    fn from(d: Duration) -> StdDuration {
        d.as_std()
    }
}

impl From<Duration> for prost_types::Duration {
    fn from(d: Duration) -> prost_types::Duration {
        prost_types::Duration {
            seconds: d.secs as i64,
            nanos: d.nanos as i32,
        }
    }
}

impl TryFrom<prost_types::Duration> for Duration {
    type Error = String;

    fn try_from(d: prost_types::Duration) -> Result<Duration, String> {
        if d.seconds < 0 || d.nanos < 0 {
            return Err(format!("negative duration is not representable: {d:?}"));
        }
        Ok(Duration {
            secs: d.seconds as u64,
            nanos: d.nanos as u32,
        })
    }
}

/// A point in time expressed as milliseconds since the Unix epoch, used for `Allocation.created_at`
/// and log record timestamps.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Timestamp(pub u128);

impl Timestamp {
    pub fn from_millis_since_epoch(millis: u128) -> Timestamp {
        Timestamp(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_prost_roundtrip() {
        let d = Duration::from_secs(15 * 24 * 60 * 60);
        let proto: prost_types::Duration = d.into();
        let back = Duration::try_from(proto).unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn checked_sub_respects_underflow() {
        let small = Duration::from_secs(1);
        let big = Duration::from_secs(2);
        assert_eq!(small.checked_sub(big), None);
        assert_eq!(big.checked_sub(small), Some(Duration::from_secs(1)));
    }
}
