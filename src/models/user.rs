use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The slice of the user record this service reads. Account management
/// (auth, email, profile editing) belongs to the upstream user service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub timezone: String,
    pub habit_reminders_enabled: bool,
    /// Suppress a reminder when the habit already has a done log today.
    pub skip_reminder_if_done: bool,
    pub created_at: DateTime<Utc>,
}
