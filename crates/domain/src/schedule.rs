//! Schedule specifications and next-run computation.
//!
//! The calculator is a pure function of (spec, last run, now): callers pass
//! `now` explicitly, there is no internal clock read. Returned times are
//! always strictly in the future relative to `now`, or absent when the
//! schedule is exhausted.
//!
//! Calendar-based frequencies (days and coarser) anchor to the *local wall
//! clock* of the schedule's timezone: a daily schedule fires at the same local
//! time on both sides of a daylight-saving transition, with no skipped or
//! doubled day. Minute/hour frequencies are plain interval arithmetic from
//! `start_at`.

use chrono::{DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use reportflow_core::{EngineError, EngineResult};

use crate::report::ReportDefinition;

/// Run cadence with an interval multiplier (`Days { every: 2 }` fires every
/// second day).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Once,
    Minutes { every: u32 },
    Hours { every: u32 },
    Days { every: u32 },
    Weeks { every: u32 },
    Months { every: u32 },
    Years { every: u32 },
}

impl Frequency {
    fn interval(&self) -> Option<u32> {
        match *self {
            Frequency::Once => None,
            Frequency::Minutes { every }
            | Frequency::Hours { every }
            | Frequency::Days { every }
            | Frequency::Weeks { every }
            | Frequency::Months { every }
            | Frequency::Years { every } => Some(every),
        }
    }
}

/// When a report runs.
///
/// Immutable once computed into a run; changed only by explicit reschedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub frequency: Frequency,
    pub timezone: Tz,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    /// Local fire time for calendar frequencies. Defaults to local midnight.
    /// Ignored by minute/hour frequencies.
    pub time_of_day: Option<NaiveTime>,
}

impl ScheduleSpec {
    pub fn new(frequency: Frequency, timezone: Tz, start_at: DateTime<Utc>) -> EngineResult<Self> {
        if frequency.interval() == Some(0) {
            return Err(EngineError::validation(
                "schedule interval must be at least 1",
            ));
        }
        Ok(Self {
            frequency,
            timezone,
            start_at,
            end_at: None,
            time_of_day: None,
        })
    }

    pub fn with_end_at(mut self, end_at: DateTime<Utc>) -> EngineResult<Self> {
        if end_at < self.start_at {
            return Err(EngineError::validation("end_at must not precede start_at"));
        }
        self.end_at = Some(end_at);
        Ok(self)
    }

    pub fn with_time_of_day(mut self, time_of_day: NaiveTime) -> Self {
        self.time_of_day = Some(time_of_day);
        self
    }

    /// Compute the next eligible run strictly after `now`, or `None` when the
    /// schedule is exhausted (one-shot already ran, or past `end_at`).
    pub fn next_run(
        &self,
        last_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let candidate = match self.frequency {
            Frequency::Once => {
                if last_run_at.is_some() || self.start_at <= now {
                    return None;
                }
                self.start_at
            }
            Frequency::Minutes { every } => self.next_fixed_period(i64::from(every) * 60, now)?,
            Frequency::Hours { every } => self.next_fixed_period(i64::from(every) * 3600, now)?,
            Frequency::Days { every } => self.next_calendar_day(i64::from(every), now)?,
            Frequency::Weeks { every } => self.next_calendar_day(i64::from(every) * 7, now)?,
            Frequency::Months { every } => self.next_calendar_month(every, now)?,
            Frequency::Years { every } => self.next_calendar_month(every.checked_mul(12)?, now)?,
        };

        match self.end_at {
            Some(end) if candidate > end => None,
            _ => Some(candidate),
        }
    }

    fn fire_time(&self) -> NaiveTime {
        self.time_of_day.unwrap_or(NaiveTime::MIN)
    }

    fn next_fixed_period(&self, period_secs: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if period_secs <= 0 {
            return None;
        }
        if now < self.start_at {
            return Some(self.start_at);
        }
        let elapsed = (now - self.start_at).num_seconds();
        let k = elapsed / period_secs + 1;
        self.start_at.checked_add_signed(Duration::seconds(k.checked_mul(period_secs)?))
    }

    fn next_calendar_day(&self, step_days: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if step_days <= 0 {
            return None;
        }
        let anchor_date = self.start_at.with_timezone(&self.timezone).date_naive();
        let now_date = now.with_timezone(&self.timezone).date_naive();
        let diff = (now_date - anchor_date).num_days();
        let mut n = if diff > 0 { diff / step_days } else { 0 };
        loop {
            let date = anchor_date.checked_add_days(chrono::Days::new(
                u64::try_from(n.checked_mul(step_days)?).ok()?,
            ))?;
            let candidate = resolve_local(self.timezone, date, self.fire_time());
            if candidate > now && candidate >= self.start_at {
                return Some(candidate);
            }
            n += 1;
        }
    }

    fn next_calendar_month(&self, step_months: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if step_months == 0 {
            return None;
        }
        let anchor_date = self.start_at.with_timezone(&self.timezone).date_naive();
        let now_date = now.with_timezone(&self.timezone).date_naive();
        let elapsed = (i64::from(now_date.year()) - i64::from(anchor_date.year())) * 12
            + i64::from(now_date.month())
            - i64::from(anchor_date.month());
        let mut n = if elapsed > 0 {
            elapsed / i64::from(step_months)
        } else {
            0
        };
        loop {
            // checked_add_months clamps to the last valid day of a shorter
            // month (an anchor on the 31st fires on the 28th/29th/30th).
            let date = anchor_date.checked_add_months(Months::new(
                u32::try_from(n).ok()?.checked_mul(step_months)?,
            ))?;
            let candidate = resolve_local(self.timezone, date, self.fire_time());
            if candidate > now && candidate >= self.start_at {
                return Some(candidate);
            }
            n += 1;
        }
    }
}

/// Next run for a full definition: lifecycle and run-budget gating on top of
/// the schedule arithmetic.
///
/// Paused or retired definitions never get a next run. On resume, callers
/// recompute with the current time, so a stale previously computed `next_run_at`
/// is never replayed.
pub fn next_run_for(definition: &ReportDefinition, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !definition.lifecycle.is_active() || definition.runs_exhausted() {
        return None;
    }
    definition
        .schedule
        .as_ref()?
        .next_run(definition.last_run_at, now)
}

/// Resolve a local wall-clock instant to UTC, handling DST edges: an
/// ambiguous (fall-back) time takes the earlier offset; a nonexistent
/// (spring-forward) time shifts forward one hour into the new offset.
fn resolve_local(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = date.and_time(time) + Duration::hours(1);
            match tz.from_local_datetime(&shifted) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    dt.with_timezone(&Utc)
                }
                LocalResult::None => Utc.from_utc_datetime(&shifted),
            }
        }
    }
}
