use axum::{
    extract::{Form, State},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use crate::{auth_middleware, error::AppError, AppState};

// Access token obtained by the sign-in page from the managed backend
#[derive(Deserialize)]
pub struct LoginForm {
    pub access_token: String,
}

// Identity the back-office front end keeps after signing in
#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    user_id: String,
    email: Option<String>,
    is_admin: bool,
}

// Handler for POST /admin/login
// Only administrators are admitted to the back office
pub async fn handle_login(
    State(app_state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let preview: String = form.access_token.chars().take(10).collect();
    tracing::info!("Received login token (first few chars): {}", preview);

    let claims = match auth_middleware::verify_token(&form.access_token, &app_state.settings) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::error!("Token verification failed: {:?}", e);
            return Err(e);
        }
    };

    if !claims.is_admin() {
        tracing::warn!("User {} signed in without the admin role", claims.sub);
        return Err(AppError::Forbidden("Access denied. Admin privileges required.".into()));
    }

    tracing::info!("Token verified successfully for admin user_id: {}", claims.sub);
    Ok(Json(LoginResponse { success: true, is_admin: claims.is_admin(), user_id: claims.sub, email: claims.email }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_middleware::testing::sign;
    use crate::backend::InMemoryBackend;
    use crate::config::Settings;
    use crate::messaging::ChatLinkMessenger;
    use crate::models::Role;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use serde_json::Value;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::new(
            Arc::new(Settings::for_tests()),
            Arc::new(InMemoryBackend::new()),
            Arc::new(ChatLinkMessenger),
            None,
        )
    }

    async fn login(token: String) -> (StatusCode, Value) {
        let response = match handle_login(State(state()), Form(LoginForm { access_token: token })).await {
            Ok(response) => response.into_response(),
            Err(e) => e.into_response(),
        };
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn admin_login_returns_identity() {
        let (status, body) = login(sign("boss", Some(Role::Admin), "test-secret", 600)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["user_id"], "boss");
        assert_eq!(body["email"], "boss@example.com");
        assert_eq!(body["is_admin"], true);
    }

    #[tokio::test]
    async fn non_admin_and_garbage_tokens_are_refused() {
        let (status, body) = login(sign("u1", Some(Role::User), "test-secret", 600)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert_eq!(login("not-a-jwt".to_string()).await.0, StatusCode::UNAUTHORIZED);
    }
}
