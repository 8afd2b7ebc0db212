use crate::error::AppError;
use crate::AppState;
use axum::extract::State;
use axum::Json;

pub async fn test_connection(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = state.tracker.get_myself().await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "JIRA connection is working",
        "user": user.label(),
        "email": user.email,
    })))
}
