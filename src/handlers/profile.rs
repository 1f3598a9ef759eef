use axum::{Json, extract::State, response::IntoResponse};
use sqlx::PgPool;

use crate::{error::AppError, models::user::MeResponse, utils::jwt::AuthUser};

/// Get current user's profile and test statistics.
pub async fn get_me(
    State(pool): State<PgPool>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let me = sqlx::query_as::<_, MeResponse>(
        r#"
        SELECT
            u.id, u.username, u.role, u.created_at,
            (SELECT COUNT(*) FROM test_instances WHERE user_id = u.id) AS tests_taken,
            (SELECT COUNT(*) FROM test_instances WHERE user_id = u.id AND is_completed) AS tests_completed,
            (SELECT AVG(score) FROM test_instances WHERE user_id = u.id AND is_completed) AS average_score
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(user.id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(me))
}
