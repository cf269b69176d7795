use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{config::Settings, error::AppError, models::Role, AppState};

// Audience the managed backend puts in signed-in user tokens
const TOKEN_AUDIENCE: &str = "authenticated";

// --- Claims ---

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct AppMetadata {
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (User ID)
    pub aud: String,
    pub exp: usize, // Expiration time (seconds since epoch)
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub app_metadata: AppMetadata, // Role is assigned server side, never by the client
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.app_metadata.role == Some(Role::Admin)
    }
}

// --- Token Verification ---

// Verifies an access token issued by the managed backend (HS256, shared secret)
pub fn verify_token(token: &str, settings: &Settings) -> Result<Claims, AppError> {
    let secret = settings.backend_jwt_secret.as_deref().ok_or_else(|| {
        error!("Backend JWT secret not configured in settings.");
        AppError::Unavailable("Sign-in is not configured".into())
    })?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[TOKEN_AUDIENCE]);

    let decoded = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation).map_err(|e| {
        warn!("Token validation failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::Unauthorized("Token expired".into()),
            jsonwebtoken::errors::ErrorKind::InvalidAudience => AppError::Unauthorized("Invalid token audience".into()),
            _ => AppError::Unauthorized("Invalid token".into()),
        }
    })?;

    info!("Token successfully validated for user: {}", decoded.claims.sub);
    Ok(decoded.claims)
}

// --- Axum Extractors ---

// Any signed-in user
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
    pub is_admin: bool,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|e| {
                warn!("Failed to extract Authorization header: {}", e);
                AppError::Unauthorized("Missing or invalid Authorization header".into())
            })?;

        let app_state = AppState::from_ref(state);
        let claims = verify_token(bearer.token(), &app_state.settings)?;

        Ok(AuthenticatedUser { is_admin: claims.is_admin(), user_id: claims.sub, email: claims.email })
    }
}

// Back-office routes: a signed-in user holding the admin role
#[derive(Clone, Debug)]
pub struct AdminUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::Forbidden(format!("User {} is not an administrator", user.user_id)));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    // Signs a token the way the managed backend would
    pub fn sign(sub: &str, role: Option<Role>, secret: &str, exp_offset_secs: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset_secs) as usize,
            email: Some(format!("{}@example.com", sub)),
            app_metadata: AppMetadata { role },
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::sign;
    use super::*;

    #[test]
    fn valid_admin_token_is_accepted() {
        let settings = Settings::for_tests();
        let claims = verify_token(&sign("u1", Some(Role::Admin), "test-secret", 600), &settings).unwrap();
        assert_eq!(claims.sub, "u1");
        assert!(claims.is_admin());
    }

    #[test]
    fn plain_user_is_not_admin() {
        let settings = Settings::for_tests();
        let claims = verify_token(&sign("u2", None, "test-secret", 600), &settings).unwrap();
        assert!(!claims.is_admin());
    }

    #[test]
    fn wrong_secret_and_expired_tokens_are_rejected() {
        let settings = Settings::for_tests();
        assert!(matches!(
            verify_token(&sign("u1", Some(Role::Admin), "other-secret", 600), &settings),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            verify_token(&sign("u1", Some(Role::Admin), "test-secret", -3600), &settings),
            Err(AppError::Unauthorized(m)) if m == "Token expired"
        ));
    }
}
