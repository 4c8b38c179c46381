use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::habit::{scheduled_on, HabitFrequency};
use crate::models::habit_log::{HabitLog, LogStatus, Mood};

/// Share of days since creation that got at least one completion, as a
/// 0-100 score.
pub fn consistency(total_days: i64, days_since_creation: i64) -> i32 {
    let denominator = days_since_creation.max(1) as f64;
    let score = (total_days as f64 / denominator * 100.0).round() as i64;
    score.min(100) as i32
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WeekBucket {
    pub week_start: NaiveDate,
    pub completions: i64,
    pub active_days: i64,
    pub skipped_days: i64,
    pub expected_days: i64,
    pub missed_days: i64,
}

/// Partition `[start, end]` into 7-day buckets (oldest first) and roll the
/// logs up per bucket. Expected days come from the habit's schedule
/// intersected with the bucket's calendar days.
pub fn weekly_breakdown(
    logs: &[HabitLog],
    frequency: HabitFrequency,
    days_of_week: &[i16],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<WeekBucket> {
    let mut buckets = Vec::new();
    let mut bucket_start = start;

    while bucket_start <= end {
        let bucket_end = (bucket_start + Duration::days(6)).min(end);

        let in_bucket = |log: &&HabitLog| {
            log.log_date >= bucket_start && log.log_date <= bucket_end
        };

        let completions: i64 = logs
            .iter()
            .filter(in_bucket)
            .filter(|l| l.status == LogStatus::Done)
            .map(|l| l.completion_count as i64)
            .sum();
        let active_days = logs
            .iter()
            .filter(in_bucket)
            .filter(|l| l.status == LogStatus::Done)
            .count() as i64;
        let skipped_days = logs
            .iter()
            .filter(in_bucket)
            .filter(|l| l.status == LogStatus::Skipped)
            .count() as i64;

        let mut expected_days = 0i64;
        let mut day = bucket_start;
        while day <= bucket_end {
            if scheduled_on(frequency, days_of_week, day) {
                expected_days += 1;
            }
            day += Duration::days(1);
        }

        buckets.push(WeekBucket {
            week_start: bucket_start,
            completions,
            active_days,
            skipped_days,
            expected_days,
            missed_days: (expected_days - active_days - skipped_days).max(0),
        });

        bucket_start += Duration::days(7);
    }

    buckets
}

/// Completion-event counts per mood across the range.
pub fn mood_distribution(logs: &[HabitLog]) -> HashMap<Mood, i64> {
    let mut counts = HashMap::new();
    for log in logs {
        for event in &log.events.0 {
            *counts.entry(event.mood).or_insert(0) += 1;
        }
    }
    counts
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TimelinePoint {
    pub date: NaiveDate,
    pub count: i64,
}

/// Completion events bucketed by the viewer's local calendar date. Event
/// timestamps are instants; the same instant lands on different dates in
/// different zones, so the conversion happens before grouping.
pub fn completion_timeline(logs: &[HabitLog], tz: Tz) -> Vec<TimelinePoint> {
    let mut by_date: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for log in logs {
        for event in &log.events.0 {
            let local_date = event.at.with_timezone(&tz).date_naive();
            *by_date.entry(local_date).or_insert(0) += 1;
        }
    }
    by_date
        .into_iter()
        .map(|(date, count)| TimelinePoint { date, count })
        .collect()
}

/// Calendar heatmap: one status per logged date.
pub fn heatmap(logs: &[HabitLog]) -> BTreeMap<NaiveDate, LogStatus> {
    logs.iter().map(|l| (l.log_date, l.status)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::types::Json;
    use uuid::Uuid;

    use crate::models::habit_log::CompletionEvent;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn log(date: NaiveDate, status: LogStatus, count: i32, moods: &[Mood]) -> HabitLog {
        let events = moods
            .iter()
            .map(|m| CompletionEvent {
                at: Utc::now(),
                mood: *m,
            })
            .collect();
        HabitLog {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            habit_id: Uuid::new_v4(),
            log_date: date,
            status,
            completion_count: count,
            events: Json(events),
            note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn consistency_rounds_and_clamps() {
        assert_eq!(consistency(0, 10), 0);
        assert_eq!(consistency(5, 10), 50);
        assert_eq!(consistency(2, 3), 67);
        assert_eq!(consistency(10, 10), 100);
        // logged more days than the habit has existed (backfill): clamp
        assert_eq!(consistency(12, 10), 100);
        // day-of-creation guard
        assert_eq!(consistency(1, 0), 100);
    }

    #[test]
    fn weekly_buckets_roll_up_counts() {
        let logs = vec![
            log(d(2024, 1, 1), LogStatus::Done, 2, &[Mood::Positive, Mood::Neutral]),
            log(d(2024, 1, 2), LogStatus::Done, 1, &[Mood::Positive]),
            log(d(2024, 1, 3), LogStatus::Skipped, 0, &[]),
            log(d(2024, 1, 9), LogStatus::Done, 1, &[Mood::Negative]),
        ];

        let buckets = weekly_breakdown(
            &logs,
            HabitFrequency::Daily,
            &[],
            d(2024, 1, 1),
            d(2024, 1, 14),
        );

        assert_eq!(buckets.len(), 2);
        assert_eq!(
            buckets[0],
            WeekBucket {
                week_start: d(2024, 1, 1),
                completions: 3,
                active_days: 2,
                skipped_days: 1,
                expected_days: 7,
                missed_days: 4,
            }
        );
        assert_eq!(buckets[1].completions, 1);
        assert_eq!(buckets[1].missed_days, 6);
    }

    #[test]
    fn weekly_expected_days_follow_the_schedule() {
        // Mon/Wed habit, two-week range starting Mon 2024-01-01
        let buckets = weekly_breakdown(
            &[],
            HabitFrequency::Weekly,
            &[1, 3],
            d(2024, 1, 1),
            d(2024, 1, 14),
        );
        assert_eq!(buckets[0].expected_days, 2);
        assert_eq!(buckets[1].expected_days, 2);
    }

    #[test]
    fn partial_trailing_bucket_is_clamped() {
        let buckets = weekly_breakdown(
            &[],
            HabitFrequency::Daily,
            &[],
            d(2024, 1, 1),
            d(2024, 1, 10),
        );
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[1].expected_days, 3);
    }

    #[test]
    fn mood_counts_are_per_event_not_per_day() {
        let logs = vec![
            log(
                d(2024, 1, 1),
                LogStatus::Done,
                3,
                &[Mood::Positive, Mood::Positive, Mood::VeryNegative],
            ),
            log(d(2024, 1, 2), LogStatus::Done, 1, &[Mood::Positive]),
        ];

        let counts = mood_distribution(&logs);
        assert_eq!(counts[&Mood::Positive], 3);
        assert_eq!(counts[&Mood::VeryNegative], 1);
        assert!(!counts.contains_key(&Mood::Neutral));
    }

    #[test]
    fn timeline_buckets_by_local_date() {
        // 02:00 UTC on June 2nd is still June 1st in New York
        let at = DateTime::parse_from_rfc3339("2024-06-02T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut l = log(d(2024, 6, 2), LogStatus::Done, 1, &[]);
        l.events.0.push(CompletionEvent {
            at,
            mood: Mood::Neutral,
        });

        let utc_view = completion_timeline(std::slice::from_ref(&l), chrono_tz::UTC);
        assert_eq!(utc_view[0].date, d(2024, 6, 2));

        let ny_view = completion_timeline(&[l], chrono_tz::America::New_York);
        assert_eq!(ny_view[0].date, d(2024, 6, 1));
    }

    #[test]
    fn heatmap_maps_dates_to_status() {
        let logs = vec![
            log(d(2024, 1, 1), LogStatus::Done, 1, &[Mood::Neutral]),
            log(d(2024, 1, 2), LogStatus::Missed, 0, &[]),
        ];
        let map = heatmap(&logs);
        assert_eq!(map[&d(2024, 1, 1)], LogStatus::Done);
        assert_eq!(map[&d(2024, 1, 2)], LogStatus::Missed);
    }
}
