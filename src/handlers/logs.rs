use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::identity::AuthUser;
use crate::models::habit::Habit;
use crate::models::habit_log::{HabitLog, LogEventRequest, LogStatus, Mood};
use crate::services::{analytics, logging};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LogEventResponse {
    pub log: HabitLog,
    pub habit: Habit,
}

/// Record a done/skipped/missed event for a date. Done events route
/// through the completion path (and its downstream side effects); the
/// other statuses demote the day.
pub async fn log_event(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
    Json(body): Json<LogEventRequest>,
) -> AppResult<Json<LogEventResponse>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let date = body.date.unwrap_or_else(|| Utc::now().date_naive());

    let outcome = match body.status {
        LogStatus::Done => {
            let mood = body.mood.unwrap_or(Mood::Neutral);
            let outcome = logging::log_completion(
                &state.db,
                auth_user.id,
                habit_id,
                date,
                mood,
                body.note,
            )
            .await?;

            logging::run_done_side_effects(
                &state.db,
                &state.notifier,
                state.config.milestone_notifications_enabled,
                &outcome,
            )
            .await;

            outcome
        }
        status => {
            logging::mark_skipped_or_missed(&state.db, auth_user.id, habit_id, date, status)
                .await?
        }
    };

    Ok(Json(LogEventResponse {
        log: outcome.log,
        habit: outcome.habit,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HeatmapQuery {
    pub months: Option<i32>,
}

pub async fn get_heatmap(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
    Query(query): Query<HeatmapQuery>,
) -> AppResult<Json<std::collections::BTreeMap<chrono::NaiveDate, LogStatus>>> {
    let habit = logging::get_habit(&state.db, auth_user.id, habit_id).await?;

    let months = query.months.unwrap_or(3).clamp(1, 12);
    let end = Utc::now().date_naive();
    let start = end - chrono::Duration::days(months as i64 * 30);

    let logs = sqlx::query_as::<_, HabitLog>(
        r#"
        SELECT * FROM habit_logs
        WHERE habit_id = $1 AND log_date BETWEEN $2 AND $3
        ORDER BY log_date ASC
        "#,
    )
    .bind(habit.id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(analytics::heatmap(&logs)))
}
