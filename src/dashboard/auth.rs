//! Shared-password login and bearer-token sessions.

use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use super::api::{ApiError, ApiJson, SharedState};
use super::store::PASSWORD_KEY;

pub const MIN_PASSWORD_LEN: usize = 4;

/// Session token of the authenticated caller, set by [`require_auth`].
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ))
    } else {
        Ok(())
    }
}

/// Reject requests that do not carry the token of an existing session.
pub async fn require_auth(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthorized)?;
    if !state.store.session_exists(token.clone()).await? {
        return Err(ApiError::Unauthorized);
    }
    req.extensions_mut().insert(SessionToken(token));
    Ok(next.run(req).await)
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: Option<String>,
}

pub async fn login(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let stored = state
        .store
        .get_config(PASSWORD_KEY.to_string())
        .await?
        .unwrap_or_default();
    let given = req.password.unwrap_or_default();

    // An unset password never matches, not even an empty attempt.
    if stored.is_empty() || given != stored {
        tracing::warn!("rejected login attempt");
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "error": "Invalid password"})),
        )
            .into_response());
    }

    let token = uuid::Uuid::new_v4().to_string();
    state.store.create_session(token.clone()).await?;
    tracing::info!("session created");
    Ok(Json(json!({"success": true, "token": token})).into_response())
}

pub async fn logout(
    State(state): State<SharedState>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_session(token).await?;
    Ok(Json(json!({"success": true})))
}

pub async fn session() -> impl IntoResponse {
    Json(json!({"authenticated": true}))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(rename = "newPassword", default)]
    pub new_password: Option<String>,
}

pub async fn change_password(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let password = req.new_password.unwrap_or_default();
    validate_password(&password).map_err(ApiError::BadRequest)?;
    state
        .store
        .set_config(PASSWORD_KEY.to_string(), password)
        .await?;
    tracing::info!("dashboard password changed");
    Ok(Json(json!({"success": true})))
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::dashboard::api::testutil::{body_json, test_app, test_state};

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Bearer  abc ")).as_deref(), Some("abc"));
        assert!(bearer_token(&headers_with("Bearer ")).is_none());
        assert!(bearer_token(&headers_with("Basic abc")).is_none());
        assert!(bearer_token(&headers_with("bearer abc")).is_none());
        assert!(bearer_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_validate_password_length() {
        assert!(validate_password("abc").is_err());
        assert!(validate_password("").is_err());
        assert!(validate_password("abcd").is_ok());
    }

    async fn router_with_password(password: Option<&str>) -> Router {
        let state = test_state().await;
        if let Some(pw) = password {
            state
                .store
                .set_config(PASSWORD_KEY.to_string(), pw.to_string())
                .await
                .unwrap();
        }
        test_app(state)
    }

    fn login_request(password: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(json!({"password": password}).to_string()))
            .unwrap()
    }

    async fn login_token(app: &Router, password: &str) -> String {
        let resp = app.clone().oneshot(login_request(password)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp.into_body()).await;
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_login_with_correct_password() {
        let app = router_with_password(Some("hunter2")).await;
        let resp = app.oneshot(login_request("hunter2")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp.into_body()).await;
        assert_eq!(body["success"], true);
        let token = body["token"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(token).is_ok());
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let app = router_with_password(Some("hunter2")).await;
        let resp = app.oneshot(login_request("nope")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(resp.into_body()).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid password");
    }

    #[tokio::test]
    async fn test_login_without_stored_password_always_fails() {
        let app = router_with_password(None).await;
        let resp = app.oneshot(login_request("")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_protected_route_requires_session() {
        let app = router_with_password(Some("hunter2")).await;

        let req = Request::builder()
            .uri("/api/auth/session")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(resp.into_body()).await;
        assert_eq!(body["error"], "Unauthorized");

        let req = Request::builder()
            .uri("/api/auth/session")
            .header("authorization", "Bearer not-a-session")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let token = login_token(&app, "hunter2").await;
        let req = Request::builder()
            .uri("/api/auth/session")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp.into_body()).await;
        assert_eq!(body["authenticated"], true);
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let app = router_with_password(Some("hunter2")).await;
        let token = login_token(&app, "hunter2").await;

        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/logout")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder()
            .uri("/api/auth/session")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_change_password() {
        let app = router_with_password(Some("hunter2")).await;
        let token = login_token(&app, "hunter2").await;

        let change = |pw: serde_json::Value| {
            Request::builder()
                .method("POST")
                .uri("/api/change-password")
                .header("authorization", format!("Bearer {}", token))
                .header("content-type", "application/json")
                .body(Body::from(pw.to_string()))
                .unwrap()
        };

        let resp = app.clone().oneshot(change(json!({"newPassword": "abc"}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp.into_body()).await;
        assert_eq!(body["error"], "Password must be at least 4 characters");

        let resp = app.clone().oneshot(change(json!({}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.clone().oneshot(change(json!({"newPassword": "s3cret!"}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#"{"success":true}"#);

        let resp = app.clone().oneshot(login_request("hunter2")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        login_token(&app, "s3cret!").await;
    }
}
