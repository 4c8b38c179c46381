use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// One row per (habit, calendar date). The date key is the identity
/// granularity: logging "done" twice on the same day mutates the same row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HabitLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub habit_id: Uuid,
    pub log_date: NaiveDate,
    pub status: LogStatus,
    pub completion_count: i32,
    pub events: Json<Vec<CompletionEvent>>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "log_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Done,
    Skipped,
    Missed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    VeryPositive,
    Positive,
    Neutral,
    Negative,
    VeryNegative,
}

/// One completion event: when it happened and how it felt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CompletionEvent {
    pub at: DateTime<Utc>,
    pub mood: Mood,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LogEventRequest {
    pub status: LogStatus,

    /// Defaults to today (UTC date key) when absent.
    pub date: Option<NaiveDate>,

    /// Mood for a "done" event. Defaults to neutral.
    pub mood: Option<Mood>,

    #[validate(length(max = 5000, message = "Note must be under 5000 characters"))]
    pub note: Option<String>,
}

/// The day's contribution to the habit's cached aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayContribution {
    pub completions: i64,
    pub days: i64,
}

impl HabitLog {
    /// What this log currently adds to total_completions / total_days.
    pub fn contribution(&self) -> DayContribution {
        if self.status == LogStatus::Done && self.completion_count > 0 {
            DayContribution {
                completions: self.completion_count as i64,
                days: 1,
            }
        } else {
            DayContribution {
                completions: 0,
                days: 0,
            }
        }
    }

    /// Record one more completion event for the day.
    pub fn apply_completion(&mut self, at: DateTime<Utc>, mood: Mood, note: Option<String>) {
        self.status = LogStatus::Done;
        self.completion_count += 1;
        self.events.0.push(CompletionEvent { at, mood });
        if note.is_some() {
            self.note = note;
        }
    }

    /// Demote the day to skipped/missed: completion data is zeroed.
    pub fn apply_demotion(&mut self, status: LogStatus) {
        self.status = status;
        self.completion_count = 0;
        self.events.0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_log(date: NaiveDate) -> HabitLog {
        HabitLog {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            habit_id: Uuid::new_v4(),
            log_date: date,
            status: LogStatus::Done,
            completion_count: 0,
            events: Json(Vec::new()),
            note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn multiple_completions_same_day_accumulate() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let mut log = blank_log(date);

        log.apply_completion(Utc::now(), Mood::Positive, None);
        log.apply_completion(Utc::now(), Mood::Neutral, None);
        log.apply_completion(Utc::now(), Mood::VeryPositive, Some("pb!".into()));

        assert_eq!(log.completion_count, 3);
        assert_eq!(log.events.0.len(), 3);
        assert_eq!(log.events.0[1].mood, Mood::Neutral);
        // still one day's worth of distinct-day contribution
        assert_eq!(log.contribution(), DayContribution { completions: 3, days: 1 });
    }

    #[test]
    fn demotion_zeroes_completion_data() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let mut log = blank_log(date);
        log.apply_completion(Utc::now(), Mood::Positive, None);

        log.apply_demotion(LogStatus::Skipped);

        assert_eq!(log.status, LogStatus::Skipped);
        assert_eq!(log.completion_count, 0);
        assert!(log.events.0.is_empty());
        assert_eq!(log.contribution(), DayContribution { completions: 0, days: 0 });

        // repeating the demotion converges to the same state
        log.apply_demotion(LogStatus::Skipped);
        assert_eq!(log.completion_count, 0);
        assert!(log.events.0.is_empty());
    }
}
