use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::identity::AuthUser;
use crate::models::habit::{CreateHabitRequest, Habit, UpdateHabitRequest};
use crate::services::logging;
use crate::AppState;

pub async fn list_habits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<Habit>>> {
    let habits = logging::list_habits(&state.db, auth_user.id).await?;
    Ok(Json(habits))
}

pub async fn get_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
) -> AppResult<Json<Habit>> {
    let habit = logging::get_habit(&state.db, auth_user.id, habit_id).await?;
    Ok(Json(habit))
}

pub async fn create_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateHabitRequest>,
) -> AppResult<Json<Habit>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let habit = logging::create_habit(&state.db, auth_user.id, body).await?;
    Ok(Json(habit))
}

pub async fn update_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
    Json(body): Json<UpdateHabitRequest>,
) -> AppResult<Json<Habit>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let habit = logging::update_habit(&state.db, auth_user.id, habit_id, body).await?;
    Ok(Json(habit))
}

pub async fn archive_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
) -> AppResult<Json<Habit>> {
    let habit = logging::set_archived(&state.db, auth_user.id, habit_id, true).await?;
    Ok(Json(habit))
}

pub async fn unarchive_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
) -> AppResult<Json<Habit>> {
    let habit = logging::set_archived(&state.db, auth_user.id, habit_id, false).await?;
    Ok(Json(habit))
}

pub async fn delete_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    logging::delete_habit(&state.db, auth_user.id, habit_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
