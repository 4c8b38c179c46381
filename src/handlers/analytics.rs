use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::identity::AuthUser;
use crate::models::habit_log::{HabitLog, Mood};
use crate::services::analytics::{self, TimelinePoint, WeekBucket};
use crate::services::{logging, scheduler};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<i64>,
    /// Viewer's IANA zone for timeline bucketing. Falls back to the
    /// habit's own zone, then UTC.
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HabitStats {
    pub current_streak: i32,
    pub longest_streak: i32,
    pub total_completions: i64,
    pub total_days: i64,
    pub consistency: i32,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub stats: HabitStats,
    pub timeline: Vec<TimelinePoint>,
    pub weekly_data: Vec<WeekBucket>,
    pub mood_counts: HashMap<Mood, i64>,
}

pub async fn get_analytics(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
    Query(query): Query<AnalyticsQuery>,
) -> AppResult<Json<AnalyticsResponse>> {
    let habit = logging::get_habit(&state.db, auth_user.id, habit_id).await?;

    let days = query.days.unwrap_or(30).clamp(1, 365);
    let today = Utc::now().date_naive();
    let start = today - chrono::Duration::days(days - 1);

    let logs = sqlx::query_as::<_, HabitLog>(
        r#"
        SELECT * FROM habit_logs
        WHERE habit_id = $1 AND log_date BETWEEN $2 AND $3
        ORDER BY log_date ASC
        "#,
    )
    .bind(habit.id)
    .bind(start)
    .bind(today)
    .fetch_all(&state.db)
    .await?;

    let tz = query
        .timezone
        .as_deref()
        .and_then(|s| s.parse::<Tz>().ok())
        .unwrap_or_else(|| scheduler::effective_timezone(&habit.timezone, ""));

    let days_since_creation = (today - habit.created_at.date_naive()).num_days();

    Ok(Json(AnalyticsResponse {
        stats: HabitStats {
            current_streak: habit.current_streak,
            longest_streak: habit.longest_streak,
            total_completions: habit.total_completions,
            total_days: habit.total_days,
            consistency: analytics::consistency(habit.total_days, days_since_creation),
        },
        timeline: analytics::completion_timeline(&logs, tz),
        weekly_data: analytics::weekly_breakdown(
            &logs,
            habit.frequency,
            &habit.days_of_week,
            start,
            today,
        ),
        mood_counts: analytics::mood_distribution(&logs),
    }))
}
