//! Property tests for the schedule calculator.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;

use reportflow_domain::{Frequency, ScheduleSpec};

const ZONES: &[Tz] = &[
    chrono_tz::UTC,
    chrono_tz::Africa::Nairobi,
    chrono_tz::America::New_York,
    chrono_tz::Europe::Berlin,
    chrono_tz::Asia::Kolkata,
    chrono_tz::Australia::Sydney,
];

fn frequencies(every: u32) -> Vec<Frequency> {
    vec![
        Frequency::Once,
        Frequency::Minutes { every },
        Frequency::Hours { every },
        Frequency::Days { every },
        Frequency::Weeks { every },
        Frequency::Months { every },
        Frequency::Years { every },
    ]
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

proptest! {
    /// Whatever the schedule and reference time, the computed next run is
    /// either absent or strictly in the future.
    #[test]
    fn next_run_is_strictly_future(
        freq_index in 0usize..7,
        every in 1u32..48,
        zone_index in 0usize..ZONES.len(),
        // 2000-01-01 .. 2040-ish, exercising plenty of DST transitions
        start_secs in 946_684_800i64..2_200_000_000,
        now_offset_secs in -500_000_000i64..500_000_000,
        hour in 0u32..24,
        minute in 0u32..60,
        with_tod in any::<bool>(),
    ) {
        let start_at = timestamp(start_secs);
        let now = timestamp(start_secs + now_offset_secs);

        let mut spec = ScheduleSpec::new(
            frequencies(every)[freq_index],
            ZONES[zone_index],
            start_at,
        )
        .unwrap();
        if with_tod {
            spec = spec.with_time_of_day(NaiveTime::from_hms_opt(hour, minute, 0).unwrap());
        }

        if let Some(next) = spec.next_run(None, now) {
            prop_assert!(next > now, "next run {next} is not strictly after {now}");
            prop_assert!(next >= start_at, "next run {next} precedes start {start_at}");
        }
    }

    /// The end bound is never overshot.
    #[test]
    fn end_at_is_respected(
        every in 1u32..10,
        start_secs in 946_684_800i64..2_000_000_000,
        window_secs in 0i64..10_000_000,
        probe_secs in -1_000_000i64..20_000_000,
    ) {
        let start_at = timestamp(start_secs);
        let end_at = timestamp(start_secs + window_secs);
        let now = timestamp(start_secs + probe_secs);

        let spec = ScheduleSpec::new(Frequency::Days { every }, chrono_tz::UTC, start_at)
            .unwrap()
            .with_end_at(end_at)
            .unwrap();

        if let Some(next) = spec.next_run(None, now) {
            prop_assert!(next <= end_at);
        }
    }
}
