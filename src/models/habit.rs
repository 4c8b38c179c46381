use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Habit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub frequency: HabitFrequency,
    /// Weekday numbers 0-6, Sunday = 0. Only meaningful for weekly habits.
    pub days_of_week: Vec<i16>,
    /// IANA zone name. Defaults to the user's stored timezone at create time.
    pub timezone: String,
    pub target_completions: Option<i32>,
    pub target_days: Option<i32>,
    pub reminder_times: Vec<NaiveTime>,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub total_completions: i64,
    pub total_days: i64,
    pub last_logged_date: Option<NaiveDate>,
    pub is_active: bool,
    pub is_archived: bool,
    pub is_public: bool,
    pub goal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "habit_frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HabitFrequency {
    Daily,
    Weekly,
}

impl Default for HabitFrequency {
    fn default() -> Self {
        Self::Daily
    }
}

impl Habit {
    /// True when the habit's own timezone carries information beyond the
    /// bare default, i.e. it should win over the user's zone.
    pub fn has_own_timezone(&self) -> bool {
        !self.timezone.is_empty() && self.timezone != "UTC"
    }

    pub fn is_scheduled_on(&self, date: NaiveDate) -> bool {
        scheduled_on(self.frequency, &self.days_of_week, date)
    }
}

pub fn scheduled_on(frequency: HabitFrequency, days_of_week: &[i16], date: NaiveDate) -> bool {
    match frequency {
        HabitFrequency::Daily => true,
        HabitFrequency::Weekly => {
            let dow = sunday_based_weekday(date);
            days_of_week.contains(&dow)
        }
    }
}

/// Weekday as 0-6 with Sunday = 0.
pub fn sunday_based_weekday(date: NaiveDate) -> i16 {
    use chrono::Datelike;
    date.weekday().num_days_from_sunday() as i16
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateHabitRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,

    pub frequency: Option<HabitFrequency>,
    pub days_of_week: Option<Vec<i16>>,

    /// IANA zone. Falls back to the user's stored timezone, then "UTC".
    pub timezone: Option<String>,

    pub target_completions: Option<i32>,
    pub target_days: Option<i32>,

    pub reminder_times: Option<Vec<NaiveTime>>,
    pub goal_id: Option<Uuid>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateHabitRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    pub frequency: Option<HabitFrequency>,
    pub days_of_week: Option<Vec<i16>>,
    pub timezone: Option<String>,
    pub target_completions: Option<i32>,
    pub target_days: Option<i32>,
    pub reminder_times: Option<Vec<NaiveTime>>,
    pub is_public: Option<bool>,
}

/// At most one of the two target kinds may be set on a habit.
pub fn validate_targets(
    target_completions: Option<i32>,
    target_days: Option<i32>,
) -> Result<(), String> {
    if target_completions.is_some() && target_days.is_some() {
        return Err("A habit may set target_completions or target_days, not both".into());
    }
    if let Some(t) = target_completions {
        if t < 1 {
            return Err("target_completions must be at least 1".into());
        }
    }
    if let Some(t) = target_days {
        if t < 1 {
            return Err("target_days must be at least 1".into());
        }
    }
    Ok(())
}

/// Weekly habits need a usable schedule; daily habits ignore days_of_week.
pub fn validate_schedule(
    frequency: HabitFrequency,
    days_of_week: &[i16],
) -> Result<(), String> {
    if frequency == HabitFrequency::Weekly {
        if days_of_week.is_empty() || days_of_week.len() > 7 {
            return Err("Weekly habits require 1-7 days_of_week entries".into());
        }
        for d in days_of_week {
            if !(0..=6).contains(d) {
                return Err(format!("Day {} is invalid; must be 0-6 (Sun-Sat)", d));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_targets_rejected() {
        assert!(validate_targets(Some(10), Some(5)).is_err());
        assert!(validate_targets(Some(10), None).is_ok());
        assert!(validate_targets(None, Some(5)).is_ok());
        assert!(validate_targets(None, None).is_ok());
    }

    #[test]
    fn weekly_schedule_bounds() {
        assert!(validate_schedule(HabitFrequency::Weekly, &[]).is_err());
        assert!(validate_schedule(HabitFrequency::Weekly, &[7]).is_err());
        assert!(validate_schedule(HabitFrequency::Weekly, &[0, 3, 6]).is_ok());
        // daily habits don't care
        assert!(validate_schedule(HabitFrequency::Daily, &[]).is_ok());
    }

    #[test]
    fn sunday_is_zero() {
        // 2024-01-07 was a Sunday
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(sunday_based_weekday(sunday), 0);
        assert_eq!(sunday_based_weekday(sunday + chrono::Duration::days(1)), 1);
        assert_eq!(sunday_based_weekday(sunday + chrono::Duration::days(6)), 6);
    }
}
