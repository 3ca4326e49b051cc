//! Job clock: owns a cron schedule and decides when a job is due.

use crate::error::ScoringResult;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// What the scheduler tells a job about the firing that invoked it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerInfo {
    pub scheduled_for: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
    /// At least one later occurrence had already elapsed when this one fired.
    pub past_due: bool,
}

impl TimerInfo {
    /// A manual, on-time firing.
    pub fn immediate(now: DateTime<Utc>) -> Self {
        Self { scheduled_for: now, fired_at: now, past_due: false }
    }
}

#[derive(Debug, Clone)]
pub struct JobClock {
    schedule: Schedule,
    next_fire: Option<DateTime<Utc>>,
}

impl JobClock {
    /// Parse a cron expression (seconds field first) and arm the first
    /// occurrence after `now`.
    pub fn parse(expr: &str, now: DateTime<Utc>) -> ScoringResult<Self> {
        let schedule = Schedule::from_str(expr)?;
        let next_fire = schedule.after(&now).next();
        Ok(Self { schedule, next_fire })
    }

    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.next_fire
    }

    /// Consume the pending occurrence if it is due and re-arm after `now`.
    /// Occurrences skipped while the process was busy collapse into one
    /// firing flagged `past_due`.
    pub fn fire(&mut self, now: DateTime<Utc>) -> Option<TimerInfo> {
        let scheduled_for = self.next_fire.filter(|t| *t <= now)?;
        let past_due = self
            .schedule
            .after(&scheduled_for)
            .next()
            .is_some_and(|following| following <= now);
        self.next_fire = self.schedule.after(&now).next();
        Some(TimerInfo { scheduled_for, fired_at: now, past_due })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn fires_once_per_occurrence() {
        let mut clock = JobClock::parse("0 */2 * * * *", at(10, 0, 30)).unwrap();
        assert_eq!(clock.next_fire(), Some(at(10, 2, 0)));
        assert!(clock.fire(at(10, 1, 59)).is_none());

        let t = clock.fire(at(10, 2, 1)).unwrap();
        assert_eq!(t.scheduled_for, at(10, 2, 0));
        assert!(!t.past_due);
        assert_eq!(clock.next_fire(), Some(at(10, 4, 0)));
        assert!(clock.fire(at(10, 2, 5)).is_none());
    }

    #[test]
    fn missed_occurrences_mark_past_due() {
        let mut clock = JobClock::parse("0 */1 * * * *", at(10, 0, 30)).unwrap();
        let t = clock.fire(at(10, 3, 10)).unwrap();
        assert!(t.past_due);
        assert_eq!(t.scheduled_for, at(10, 1, 0));
        assert_eq!(clock.next_fire(), Some(at(10, 4, 0)));
    }

    #[test]
    fn invalid_expression_is_an_error() {
        assert!(JobClock::parse("every two minutes", at(0, 0, 0)).is_err());
    }
}
