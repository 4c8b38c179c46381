use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use futures_util::future::join_all;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::habit::Habit;
use crate::models::habit_log::LogStatus;
use crate::models::user::UserProfile;
use crate::services::dedup::DedupStore;
use crate::services::logging::is_due_on;
use crate::services::notify::{Notification, NotificationKind, Notifier};

const MINUTES_PER_DAY: i64 = 1440;

/// Floor for the idempotency TTL; wide enough to cover overlapping scans
/// even with a tiny window.
const MIN_DEDUP_TTL_SECS: i64 = 600;

#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub dispatched: usize,
}

/// A habit reminder that fell inside the current scan window.
#[derive(Debug, Clone)]
pub struct DueReminder {
    pub user_id: Uuid,
    pub habit_id: Uuid,
    pub habit_name: String,
    pub local_date: NaiveDate,
    pub reminder_minute: i64,
}

/// One reminder pass: find every habit whose configured reminder time fell
/// within the window (in its own timezone), dedup, and dispatch. Safe to
/// invoke more often than the window; repeats collapse on the idempotency
/// key.
pub async fn run_reminder_scan<D: DedupStore, N: Notifier>(
    db: &PgPool,
    dedup: &D,
    notifier: &N,
    window_minutes: i64,
) -> AppResult<ScanSummary> {
    let now = Utc::now();
    let mut due = Vec::new();

    let users = sqlx::query_as::<_, UserProfile>(
        "SELECT * FROM users WHERE habit_reminders_enabled",
    )
    .fetch_all(db)
    .await?;

    for user in &users {
        let habits = sqlx::query_as::<_, Habit>(
            r#"
            SELECT * FROM habits
            WHERE user_id = $1 AND is_active AND is_archived = false
              AND cardinality(reminder_times) > 0
            "#,
        )
        .bind(user.id)
        .fetch_all(db)
        .await?;

        for habit in habits {
            let tz = effective_timezone(&habit.timezone, &user.timezone);
            let local = now.with_timezone(&tz);
            let local_date = local.date_naive();

            if !is_due_on(&habit, local_date) {
                continue;
            }

            let now_minute = minutes_since_midnight(now, tz);
            let matched =
                due_reminder_minutes(&habit.reminder_times, now_minute, window_minutes);
            if matched.is_empty() {
                continue;
            }

            if user.skip_reminder_if_done
                && has_done_log(db, habit.id, local_date).await?
            {
                continue;
            }

            for reminder_minute in matched {
                due.push(DueReminder {
                    user_id: user.id,
                    habit_id: habit.id,
                    habit_name: habit.name.clone(),
                    local_date,
                    reminder_minute,
                });
            }
        }
    }

    let dispatched = dispatch_due(dedup, notifier, due, window_minutes).await;
    if dispatched > 0 {
        tracing::info!(dispatched, "Reminder scan dispatched notifications");
    }
    Ok(ScanSummary { dispatched })
}

/// Claim each reminder's idempotency key, then send the survivors with
/// all-settled semantics: one failing dispatch never aborts the batch.
/// A broken claim store fails open — a duplicate beats a dropped reminder.
pub async fn dispatch_due<D: DedupStore, N: Notifier>(
    dedup: &D,
    notifier: &N,
    due: Vec<DueReminder>,
    window_minutes: i64,
) -> usize {
    let ttl = Duration::from_secs(MIN_DEDUP_TTL_SECS.max(window_minutes * 60) as u64);
    let mut batch = Vec::new();

    for reminder in due {
        let key = format!(
            "reminder:{}:{}:{}:{}",
            reminder.user_id, reminder.habit_id, reminder.local_date, reminder.reminder_minute
        );
        let claimed = match dedup.claim(&key, ttl).await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Dedup store unavailable; failing open");
                true
            }
        };
        if claimed {
            batch.push(reminder);
        }
    }

    let dispatched = batch.len();
    let sends = batch.into_iter().map(|r| {
        let habit_id = r.habit_id;
        let notification = Notification {
            user_id: r.user_id,
            habit_id,
            kind: NotificationKind::HabitReminder,
            title: "Habit reminder".into(),
            body: format!("Time to work on \"{}\".", r.habit_name),
        };
        async move { (habit_id, notifier.notify(notification).await) }
    });

    for (habit_id, result) in join_all(sends).await {
        if let Err(e) = result {
            tracing::warn!(error = %e, habit_id = %habit_id, "Reminder dispatch failed");
        }
    }

    dispatched
}

/// Periodic in-process trigger for the reminder scan. Deployments that
/// prefer external cron set the interval to 0 and hit the internal route.
pub fn spawn_reminder_worker(
    db: PgPool,
    dedup: crate::services::dedup::InMemoryDedupStore,
    notifier: crate::services::notify::WebhookNotifier,
    interval_secs: u64,
    window_minutes: i64,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            dedup.cleanup().await;
            match run_reminder_scan(&db, &dedup, &notifier, window_minutes).await {
                Ok(summary) => {
                    tracing::debug!(dispatched = summary.dispatched, "Reminder scan finished");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Reminder scan failed");
                }
            }
        }
    });
}

/// Habit's own zone wins when it says something beyond the bare default,
/// then the user's zone, then UTC. Unparseable names degrade to UTC.
pub fn effective_timezone(habit_tz: &str, user_tz: &str) -> Tz {
    if !habit_tz.is_empty() && habit_tz != "UTC" {
        if let Ok(tz) = habit_tz.parse::<Tz>() {
            return tz;
        }
    }
    user_tz.parse::<Tz>().unwrap_or(chrono_tz::UTC)
}

pub fn minutes_since_midnight(now: DateTime<Utc>, tz: Tz) -> i64 {
    let local = now.with_timezone(&tz);
    local.hour() as i64 * 60 + local.minute() as i64
}

/// Reminder times whose wrap-around delta to now is inside the window.
/// The modular delta tolerates midnight crossings and clock drift between
/// the trigger cadence and the wall clock.
pub fn due_reminder_minutes(
    reminder_times: &[NaiveTime],
    now_minute: i64,
    window_minutes: i64,
) -> Vec<i64> {
    reminder_times
        .iter()
        .filter_map(|t| {
            let reminder_minute = t.hour() as i64 * 60 + t.minute() as i64;
            let delta = (now_minute - reminder_minute).rem_euclid(MINUTES_PER_DAY);
            (delta <= window_minutes).then_some(reminder_minute)
        })
        .collect()
}

async fn has_done_log(db: &PgPool, habit_id: Uuid, date: NaiveDate) -> AppResult<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM habit_logs
            WHERE habit_id = $1 AND log_date = $2 AND status = $3
        )
        "#,
    )
    .bind(habit_id)
    .bind(date)
    .bind(LogStatus::Done)
    .fetch_one(db)
    .await?;
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dedup::{InMemoryDedupStore, StoreUnavailable};
    use crate::services::notify::fakes::{CollectingNotifier, FailingNotifier};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn due(user: Uuid, habit: Uuid, minute: i64) -> DueReminder {
        DueReminder {
            user_id: user,
            habit_id: habit,
            habit_name: "Stretch".into(),
            local_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            reminder_minute: minute,
        }
    }

    #[test]
    fn reminder_inside_window_is_due() {
        // 09:00 reminder, scan at 09:10 with a 15 minute window
        assert_eq!(due_reminder_minutes(&[t(9, 0)], 550, 15), vec![540]);
        // exactly on time
        assert_eq!(due_reminder_minutes(&[t(9, 0)], 540, 15), vec![540]);
        // window exceeded
        assert!(due_reminder_minutes(&[t(9, 0)], 556, 15).is_empty());
        // one minute early: the wrap-around delta is ~a full day, not -1
        assert!(due_reminder_minutes(&[t(9, 0)], 539, 15).is_empty());
    }

    #[test]
    fn window_wraps_across_midnight() {
        // 23:55 reminder, scan at 00:05
        assert_eq!(due_reminder_minutes(&[t(23, 55)], 5, 15), vec![1435]);
    }

    #[test]
    fn habit_zone_wins_over_user_zone() {
        assert_eq!(
            effective_timezone("America/New_York", "Europe/Berlin"),
            chrono_tz::America::New_York
        );
        // bare default defers to the user
        assert_eq!(
            effective_timezone("UTC", "Europe/Berlin"),
            chrono_tz::Europe::Berlin
        );
        assert_eq!(effective_timezone("", "Europe/Berlin"), chrono_tz::Europe::Berlin);
        // garbage all the way down lands on UTC
        assert_eq!(effective_timezone("Nope/Nope", "Also/Nope"), chrono_tz::UTC);
    }

    #[test]
    fn minutes_respect_the_zone() {
        // 2024-06-01 12:30 UTC is 08:30 in New York (EDT)
        let now = DateTime::parse_from_rfc3339("2024-06-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(minutes_since_midnight(now, chrono_tz::UTC), 750);
        assert_eq!(
            minutes_since_midnight(now, chrono_tz::America::New_York),
            510
        );
    }

    #[tokio::test]
    async fn overlapping_scans_dispatch_once() {
        let store = InMemoryDedupStore::new();
        let notifier = CollectingNotifier::default();
        let reminders = vec![due(Uuid::new_v4(), Uuid::new_v4(), 540)];

        let first = dispatch_due(&store, &notifier, reminders.clone(), 15).await;
        let second = dispatch_due(&store, &notifier, reminders, 15).await;

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(notifier.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn distinct_reminder_minutes_both_dispatch() {
        let store = InMemoryDedupStore::new();
        let notifier = CollectingNotifier::default();
        let user = Uuid::new_v4();
        let habit = Uuid::new_v4();

        let n = dispatch_due(
            &store,
            &notifier,
            vec![due(user, habit, 540), due(user, habit, 1080)],
            15,
        )
        .await;

        assert_eq!(n, 2);
    }

    struct BrokenStore;

    impl DedupStore for BrokenStore {
        async fn claim(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreUnavailable> {
            Err(StoreUnavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn broken_store_fails_open() {
        let notifier = CollectingNotifier::default();
        let reminders = vec![due(Uuid::new_v4(), Uuid::new_v4(), 540)];

        let n = dispatch_due(&BrokenStore, &notifier, reminders.clone(), 15).await;
        // a second pass may duplicate; it must never drop
        let again = dispatch_due(&BrokenStore, &notifier, reminders, 15).await;

        assert_eq!(n, 1);
        assert_eq!(again, 1);
        assert_eq!(notifier.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn failing_sink_does_not_abort_the_batch() {
        let store = InMemoryDedupStore::new();
        let reminders = vec![
            due(Uuid::new_v4(), Uuid::new_v4(), 540),
            due(Uuid::new_v4(), Uuid::new_v4(), 600),
            due(Uuid::new_v4(), Uuid::new_v4(), 660),
        ];

        let n = dispatch_due(&store, &FailingNotifier, reminders, 15).await;
        assert_eq!(n, 3);
    }
}
