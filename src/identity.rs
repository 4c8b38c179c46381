use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;

/// Caller identity, resolved by the upstream gateway and forwarded in the
/// `X-User-Id` header. Auth itself (sessions, tokens, OTP) lives outside
/// this service.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

pub const USER_ID_HEADER: &str = "x-user-id";

pub async fn require_identity(mut req: Request, next: Next) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let user_id = Uuid::parse_str(header).map_err(|_| AppError::Unauthorized)?;

    req.extensions_mut().insert(AuthUser { id: user_id });
    Ok(next.run(req).await)
}
