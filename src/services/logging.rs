use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::goal::{renormalize_weights, Goal, GoalLink};
use crate::models::habit::{
    scheduled_on, validate_schedule, validate_targets, CreateHabitRequest, Habit,
    UpdateHabitRequest,
};
use crate::models::habit_log::{HabitLog, LogStatus, Mood};
use crate::services::notify::{Notification, NotificationKind, Notifier};
use crate::services::streak::compute_streaks;

/// Streak values that earn a social shout-out.
const STREAK_MILESTONES: [i32; 4] = [1, 7, 30, 100];

/// Result of a write to the log history: the day's log, the habit with
/// freshly recomputed aggregates, and the streak before the write (side
/// effects compare against it).
#[derive(Debug)]
pub struct LogOutcome {
    pub log: HabitLog,
    pub habit: Habit,
    pub previous_streak: i32,
}

/// Record one completion event for the given date key. Creates the day's
/// log row when absent; the habit row is locked for the whole
/// read-modify-write so concurrent same-day completions linearize.
pub async fn log_completion(
    db: &PgPool,
    user_id: Uuid,
    habit_id: Uuid,
    date: NaiveDate,
    mood: Mood,
    note: Option<String>,
) -> AppResult<LogOutcome> {
    validate_log_date(date)?;

    let mut tx = db.begin().await?;
    let habit = lock_habit(&mut tx, user_id, habit_id).await?;
    let previous_streak = habit.current_streak;

    let mut log = fetch_or_new_log(&mut tx, &habit, date).await?;
    log.apply_completion(Utc::now(), mood, note);
    let log = persist_log(&mut tx, &log).await?;

    let habit = recompute_aggregates(&mut tx, &habit).await?;
    tx.commit().await?;

    tracing::info!(
        habit_id = %habit.id,
        date = %date,
        count = log.completion_count,
        streak = habit.current_streak,
        "Habit completion logged"
    );

    Ok(LogOutcome { log, habit, previous_streak })
}

/// Demote a date to skipped/missed. Zeroes the day's completion data and
/// recomputes the habit aggregates with that date excluded from the replay.
/// Repeating the call converges to the same state.
pub async fn mark_skipped_or_missed(
    db: &PgPool,
    user_id: Uuid,
    habit_id: Uuid,
    date: NaiveDate,
    status: LogStatus,
) -> AppResult<LogOutcome> {
    if status == LogStatus::Done {
        return Err(AppError::Validation(
            "Use a done event to log a completion".into(),
        ));
    }
    validate_log_date(date)?;

    let mut tx = db.begin().await?;
    let habit = lock_habit(&mut tx, user_id, habit_id).await?;
    let previous_streak = habit.current_streak;

    let mut log = fetch_or_new_log(&mut tx, &habit, date).await?;
    let prior = log.contribution();
    log.apply_demotion(status);
    let log = persist_log(&mut tx, &log).await?;

    let habit = recompute_aggregates(&mut tx, &habit).await?;
    tx.commit().await?;

    if prior.days > 0 {
        tracing::info!(
            habit_id = %habit.id,
            date = %date,
            reverted_completions = prior.completions,
            "Done log demoted; aggregates recomputed"
        );
    }

    Ok(LogOutcome { log, habit, previous_streak })
}

pub async fn create_habit(
    db: &PgPool,
    user_id: Uuid,
    req: CreateHabitRequest,
) -> AppResult<Habit> {
    validate_targets(req.target_completions, req.target_days).map_err(AppError::Validation)?;

    let frequency = req.frequency.unwrap_or_default();
    let days_of_week = req.days_of_week.unwrap_or_default();
    validate_schedule(frequency, &days_of_week).map_err(AppError::Validation)?;

    let mut tx = db.begin().await?;

    let timezone = match req.timezone.filter(|tz| !tz.is_empty()) {
        Some(tz) => tz,
        None => user_timezone(&mut tx, user_id).await?,
    };
    validate_timezone(&timezone)?;

    if let Some(goal_id) = req.goal_id {
        ensure_goal_owned(&mut tx, user_id, goal_id).await?;
    }

    let habit = sqlx::query_as::<_, Habit>(
        r#"
        INSERT INTO habits
            (id, user_id, name, description, frequency, days_of_week, timezone,
             target_completions, target_days, reminder_times, goal_id, is_public)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(frequency)
    .bind(&days_of_week)
    .bind(&timezone)
    .bind(req.target_completions)
    .bind(req.target_days)
    .bind(req.reminder_times.as_deref().unwrap_or(&[]))
    .bind(req.goal_id)
    .bind(req.is_public.unwrap_or(false))
    .fetch_one(&mut *tx)
    .await?;

    if let Some(goal_id) = habit.goal_id {
        attach_goal_link(&mut tx, goal_id, habit.id).await?;
    }

    tx.commit().await?;
    Ok(habit)
}

pub async fn update_habit(
    db: &PgPool,
    user_id: Uuid,
    habit_id: Uuid,
    req: UpdateHabitRequest,
) -> AppResult<Habit> {
    let mut tx = db.begin().await?;
    let existing = lock_habit_any_state(&mut tx, user_id, habit_id).await?;

    // Invariants are checked against the state the update would produce.
    let merged_completions = req.target_completions.or(existing.target_completions);
    let merged_days = req.target_days.or(existing.target_days);
    validate_targets(merged_completions, merged_days).map_err(AppError::Validation)?;

    let merged_frequency = req.frequency.unwrap_or(existing.frequency);
    let merged_dow = req
        .days_of_week
        .clone()
        .unwrap_or_else(|| existing.days_of_week.clone());
    validate_schedule(merged_frequency, &merged_dow).map_err(AppError::Validation)?;

    if let Some(tz) = &req.timezone {
        validate_timezone(tz)?;
    }

    // Reminder edits on a habit that never got a real timezone pick up the
    // user's stored zone, so scheduling math has something to anchor on.
    let mut timezone = req.timezone.clone();
    if timezone.is_none() && req.reminder_times.is_some() && !existing.has_own_timezone() {
        let user_tz = user_timezone(&mut tx, user_id).await?;
        if validate_timezone(&user_tz).is_ok() {
            timezone = Some(user_tz);
        }
    }

    let habit = sqlx::query_as::<_, Habit>(
        r#"
        UPDATE habits SET
            name = COALESCE($3, name),
            description = COALESCE($4, description),
            frequency = COALESCE($5, frequency),
            days_of_week = COALESCE($6, days_of_week),
            timezone = COALESCE($7, timezone),
            target_completions = COALESCE($8, target_completions),
            target_days = COALESCE($9, target_days),
            reminder_times = COALESCE($10, reminder_times),
            is_public = COALESCE($11, is_public),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(habit_id)
    .bind(user_id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(req.frequency)
    .bind(req.days_of_week.as_deref())
    .bind(timezone.as_deref())
    .bind(req.target_completions)
    .bind(req.target_days)
    .bind(req.reminder_times.as_deref())
    .bind(req.is_public)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(habit)
}

/// Pause or resume a habit. Archived habits stay visible but reject logs.
pub async fn set_archived(
    db: &PgPool,
    user_id: Uuid,
    habit_id: Uuid,
    archived: bool,
) -> AppResult<Habit> {
    sqlx::query_as::<_, Habit>(
        r#"
        UPDATE habits SET is_archived = $3, updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND is_active
        RETURNING *
        "#,
    )
    .bind(habit_id)
    .bind(user_id)
    .bind(archived)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("Habit not found".into()))
}

/// Soft-delete a habit. Its log history is removed, and any goal it fed
/// into has the remaining habit weights rescaled back to 100.
pub async fn delete_habit(db: &PgPool, user_id: Uuid, habit_id: Uuid) -> AppResult<()> {
    let mut tx = db.begin().await?;
    let habit = lock_habit_any_state(&mut tx, user_id, habit_id).await?;

    sqlx::query("DELETE FROM habit_logs WHERE habit_id = $1")
        .bind(habit.id)
        .execute(&mut *tx)
        .await?;

    detach_goal_links(&mut tx, habit.id).await?;

    sqlx::query(
        r#"
        UPDATE habits SET is_active = false, goal_id = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(habit.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(habit_id = %habit.id, "Habit deleted");
    Ok(())
}

pub async fn get_habit(db: &PgPool, user_id: Uuid, habit_id: Uuid) -> AppResult<Habit> {
    sqlx::query_as::<_, Habit>("SELECT * FROM habits WHERE id = $1 AND user_id = $2 AND is_active")
        .bind(habit_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Habit not found".into()))
}

pub async fn list_habits(db: &PgPool, user_id: Uuid) -> AppResult<Vec<Habit>> {
    let habits = sqlx::query_as::<_, Habit>(
        r#"
        SELECT * FROM habits
        WHERE user_id = $1 AND is_active AND is_archived = false
        ORDER BY created_at ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(habits)
}

/// Downstream effects of a done log: goal target detection and streak
/// milestones. Best-effort by contract; failures are logged, never
/// surfaced, and the committed log is already durable when this runs.
pub async fn run_done_side_effects<N: Notifier>(
    db: &PgPool,
    notifier: &N,
    milestones_enabled: bool,
    outcome: &LogOutcome,
) {
    let habit = &outcome.habit;

    if let Err(e) = check_goal_target(db, notifier, habit).await {
        tracing::warn!(error = %e, habit_id = %habit.id, "Goal target check failed");
    }

    if milestones_enabled {
        if let Some(milestone) = crossed_milestone(outcome.previous_streak, habit.current_streak) {
            let result = notifier
                .notify(Notification {
                    user_id: habit.user_id,
                    habit_id: habit.id,
                    kind: NotificationKind::StreakMilestone,
                    title: format!("{} day streak!", milestone),
                    body: format!("\"{}\" hit a {}-day streak.", habit.name, milestone),
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, habit_id = %habit.id, "Milestone notification failed");
            }
        }
    }

    if habit.is_public {
        let result = notifier
            .notify(Notification {
                user_id: habit.user_id,
                habit_id: habit.id,
                kind: NotificationKind::CommunityActivity,
                title: "Habit completed".into(),
                body: format!("Completed \"{}\".", habit.name),
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, habit_id = %habit.id, "Community mirror failed");
        }
    }
}

fn crossed_milestone(previous: i32, current: i32) -> Option<i32> {
    if current != previous && STREAK_MILESTONES.contains(&current) {
        Some(current)
    } else {
        None
    }
}

/// First time a linked goal's target is met, stamp it and emit an activity
/// event. The conditional UPDATE is the at-most-once guard.
async fn check_goal_target<N: Notifier>(
    db: &PgPool,
    notifier: &N,
    habit: &Habit,
) -> anyhow::Result<()> {
    let Some(goal_id) = habit.goal_id else {
        return Ok(());
    };

    let Some(goal) = sqlx::query_as::<_, Goal>("SELECT * FROM goals WHERE id = $1")
        .bind(goal_id)
        .fetch_optional(db)
        .await?
    else {
        return Ok(());
    };

    if goal.target_reached_at.is_some() {
        return Ok(());
    }

    let (completions, days) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT COALESCE(SUM(h.total_completions), 0), COALESCE(SUM(h.total_days), 0)
        FROM habits h
        JOIN goal_links gl ON gl.habit_id = h.id
        WHERE gl.goal_id = $1 AND h.is_active
        "#,
    )
    .bind(goal_id)
    .fetch_one(db)
    .await?;

    let reached = match (goal.target_completions, goal.target_days) {
        (Some(target), _) => completions >= target,
        (None, Some(target)) => days >= target,
        (None, None) => false,
    };
    if !reached {
        return Ok(());
    }

    let stamped = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE goals SET target_reached_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND target_reached_at IS NULL
        RETURNING id
        "#,
    )
    .bind(goal_id)
    .fetch_optional(db)
    .await?;

    if stamped.is_some() {
        tracing::info!(goal_id = %goal_id, "Goal target reached");
        notifier
            .notify(Notification {
                user_id: habit.user_id,
                habit_id: habit.id,
                kind: NotificationKind::GoalReached,
                title: "Goal reached".into(),
                body: format!("\"{}\" hit its target.", goal.title),
            })
            .await?;
    }

    Ok(())
}

// --- transaction-scoped helpers ---

/// Lock the habit row for the duration of a logging transaction. Inactive
/// habits look like missing ones; archived habits conflict.
async fn lock_habit(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    habit_id: Uuid,
) -> AppResult<Habit> {
    let habit = lock_habit_any_state(tx, user_id, habit_id).await?;
    if habit.is_archived {
        return Err(AppError::Conflict("Habit is archived".into()));
    }
    Ok(habit)
}

async fn lock_habit_any_state(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    habit_id: Uuid,
) -> AppResult<Habit> {
    sqlx::query_as::<_, Habit>(
        "SELECT * FROM habits WHERE id = $1 AND user_id = $2 AND is_active FOR UPDATE",
    )
    .bind(habit_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Habit not found".into()))
}

async fn fetch_or_new_log(
    tx: &mut Transaction<'_, Postgres>,
    habit: &Habit,
    date: NaiveDate,
) -> AppResult<HabitLog> {
    let existing = sqlx::query_as::<_, HabitLog>(
        "SELECT * FROM habit_logs WHERE habit_id = $1 AND log_date = $2 FOR UPDATE",
    )
    .bind(habit.id)
    .bind(date)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(existing.unwrap_or_else(|| HabitLog {
        id: Uuid::new_v4(),
        user_id: habit.user_id,
        habit_id: habit.id,
        log_date: date,
        status: LogStatus::Missed,
        completion_count: 0,
        events: sqlx::types::Json(Vec::new()),
        note: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }))
}

async fn persist_log(
    tx: &mut Transaction<'_, Postgres>,
    log: &HabitLog,
) -> AppResult<HabitLog> {
    let saved = sqlx::query_as::<_, HabitLog>(
        r#"
        INSERT INTO habit_logs
            (id, user_id, habit_id, log_date, status, completion_count, events, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (habit_id, log_date) DO UPDATE SET
            status = EXCLUDED.status,
            completion_count = EXCLUDED.completion_count,
            events = EXCLUDED.events,
            note = EXCLUDED.note,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(log.id)
    .bind(log.user_id)
    .bind(log.habit_id)
    .bind(log.log_date)
    .bind(log.status)
    .bind(log.completion_count)
    .bind(&log.events)
    .bind(&log.note)
    .fetch_one(&mut **tx)
    .await?;
    Ok(saved)
}

/// Replay the done history and persist the derived aggregates. Runs inside
/// the same transaction as the log write so the pair is atomic.
async fn recompute_aggregates(
    tx: &mut Transaction<'_, Postgres>,
    habit: &Habit,
) -> AppResult<Habit> {
    let done_dates = sqlx::query_scalar::<_, NaiveDate>(
        r#"
        SELECT log_date FROM habit_logs
        WHERE habit_id = $1 AND status = $2
        ORDER BY log_date DESC
        "#,
    )
    .bind(habit.id)
    .bind(LogStatus::Done)
    .fetch_all(&mut **tx)
    .await?;

    let (total_completions, total_days) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT COALESCE(SUM(completion_count), 0), COUNT(*)
        FROM habit_logs
        WHERE habit_id = $1 AND status = $2
        "#,
    )
    .bind(habit.id)
    .bind(LogStatus::Done)
    .fetch_one(&mut **tx)
    .await?;

    let today = Utc::now().date_naive();
    let streaks = compute_streaks(
        &done_dates,
        habit.frequency,
        &habit.days_of_week,
        today,
        habit.longest_streak,
    );

    let updated = sqlx::query_as::<_, Habit>(
        r#"
        UPDATE habits SET
            current_streak = $2,
            longest_streak = $3,
            total_completions = $4,
            total_days = $5,
            last_logged_date = $6,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(habit.id)
    .bind(streaks.current)
    .bind(streaks.longest)
    .bind(total_completions)
    .bind(total_days)
    .bind(done_dates.first().copied())
    .fetch_one(&mut **tx)
    .await?;

    Ok(updated)
}

async fn user_timezone(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<String, sqlx::Error> {
    let tz = sqlx::query_scalar::<_, String>("SELECT timezone FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(tz.unwrap_or_else(|| "UTC".into()))
}

fn validate_timezone(tz: &str) -> AppResult<()> {
    tz.parse::<chrono_tz::Tz>()
        .map(|_| ())
        .map_err(|_| AppError::Validation(format!("Unknown timezone: {}", tz)))
}

/// Backfill is allowed; future dates (beyond one day of zone skew) are not.
fn validate_log_date(date: NaiveDate) -> AppResult<()> {
    let today = Utc::now().date_naive();
    if (date - today).num_days() > 1 {
        return Err(AppError::Validation("Date cannot be in the future".into()));
    }
    Ok(())
}

async fn ensure_goal_owned(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    goal_id: Uuid,
) -> AppResult<()> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM goals WHERE id = $1 AND user_id = $2")
        .bind(goal_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Goal not found".into()))?;
    Ok(())
}

/// Add the habit to the goal's weighted breakdown. The newcomer enters at
/// the current average weight, then everything rescales to sum 100.
async fn attach_goal_link(
    tx: &mut Transaction<'_, Postgres>,
    goal_id: Uuid,
    habit_id: Uuid,
) -> AppResult<()> {
    let links = sqlx::query_as::<_, GoalLink>(
        "SELECT goal_id, habit_id, weight FROM goal_links WHERE goal_id = $1 ORDER BY habit_id",
    )
    .bind(goal_id)
    .fetch_all(&mut **tx)
    .await?;

    let newcomer = if links.is_empty() {
        100
    } else {
        let total: i64 = links.iter().map(|l| l.weight as i64).sum();
        (total / links.len() as i64).max(1) as i32
    };

    let mut weights: Vec<i32> = links.iter().map(|l| l.weight).collect();
    weights.push(newcomer);
    let weights = renormalize_weights(&weights);

    for (link, weight) in links.iter().zip(&weights) {
        sqlx::query("UPDATE goal_links SET weight = $3 WHERE goal_id = $1 AND habit_id = $2")
            .bind(link.goal_id)
            .bind(link.habit_id)
            .bind(weight)
            .execute(&mut **tx)
            .await?;
    }

    sqlx::query("INSERT INTO goal_links (goal_id, habit_id, weight) VALUES ($1, $2, $3)")
        .bind(goal_id)
        .bind(habit_id)
        .bind(weights[weights.len() - 1])
        .execute(&mut **tx)
        .await?;

    Ok(())
}

async fn detach_goal_links(
    tx: &mut Transaction<'_, Postgres>,
    habit_id: Uuid,
) -> AppResult<()> {
    let goal_ids = sqlx::query_scalar::<_, Uuid>(
        "DELETE FROM goal_links WHERE habit_id = $1 RETURNING goal_id",
    )
    .bind(habit_id)
    .fetch_all(&mut **tx)
    .await?;

    for goal_id in goal_ids {
        let links = sqlx::query_as::<_, GoalLink>(
            "SELECT goal_id, habit_id, weight FROM goal_links WHERE goal_id = $1 ORDER BY habit_id",
        )
        .bind(goal_id)
        .fetch_all(&mut **tx)
        .await?;

        if links.is_empty() {
            continue;
        }

        let weights = renormalize_weights(&links.iter().map(|l| l.weight).collect::<Vec<_>>());
        for (link, weight) in links.iter().zip(&weights) {
            sqlx::query("UPDATE goal_links SET weight = $3 WHERE goal_id = $1 AND habit_id = $2")
                .bind(link.goal_id)
                .bind(link.habit_id)
                .bind(weight)
                .execute(&mut **tx)
                .await?;
        }
    }

    Ok(())
}

/// True when the habit is scheduled to occur on the given calendar day.
pub fn is_due_on(habit: &Habit, date: NaiveDate) -> bool {
    scheduled_on(habit.frequency, &habit.days_of_week, date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestone_fires_only_on_exact_crossing() {
        assert_eq!(crossed_milestone(0, 1), Some(1));
        assert_eq!(crossed_milestone(6, 7), Some(7));
        assert_eq!(crossed_milestone(29, 30), Some(30));
        assert_eq!(crossed_milestone(99, 100), Some(100));

        // re-logging the same day leaves the streak in place: no re-fire
        assert_eq!(crossed_milestone(7, 7), None);
        // ordinary days are quiet
        assert_eq!(crossed_milestone(7, 8), None);
        assert_eq!(crossed_milestone(2, 3), None);
    }

    #[test]
    fn future_dates_are_rejected() {
        let today = Utc::now().date_naive();
        assert!(validate_log_date(today).is_ok());
        assert!(validate_log_date(today - chrono::Duration::days(30)).is_ok());
        assert!(validate_log_date(today + chrono::Duration::days(1)).is_ok());
        assert!(validate_log_date(today + chrono::Duration::days(2)).is_err());
    }

    #[test]
    fn timezone_names_are_checked() {
        assert!(validate_timezone("America/New_York").is_ok());
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("Mars/Olympus_Mons").is_err());
    }
}
