//! Time utilities: wall-clock stamping for `Last Updated`.

use anyhow::Result;
use chrono::{Duration, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

/// Source of the `Last Updated` stamp.
pub trait Clock: Send + Sync {
    /// Local wall-clock time, second resolution.
    fn now(&self) -> NaiveDateTime;
}

/// Current time in an IANA zone such as "Europe/London".
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn from_name(tz: &str) -> Result<Self> {
        Ok(Self::new(parse_timezone(tz)?))
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let local = Utc::now().with_timezone(&self.tz).naive_local();
        local.with_nanosecond(0).unwrap_or(local)
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Returns `start`, then advances by `step` on every call.
#[derive(Debug)]
pub struct SteppingClock {
    next: Mutex<NaiveDateTime>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: NaiveDateTime, step: Duration) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> NaiveDateTime {
        let mut next = self.next.lock();
        let out = *next;
        *next = out + self.step;
        out
    }
}

pub fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone: {tz}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 20)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn stepping_clock_advances() {
        let clock = SteppingClock::new(at(9, 0, 0), Duration::seconds(30));
        assert_eq!(clock.now(), at(9, 0, 0));
        assert_eq!(clock.now(), at(9, 0, 30));
    }

    #[test]
    fn system_clock_drops_subseconds() {
        let clock = SystemClock::from_name("America/Chicago").unwrap();
        assert_eq!(clock.now().nanosecond(), 0);
    }

    #[test]
    fn rejects_unknown_timezone() {
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
