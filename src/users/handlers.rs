use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    state::AppState,
    users::{
        dto::{
            AuthResponse, ChangePasswordRequest, CreateUserRequest, ForgotPasswordRequest,
            LoginRequest, ResetPasswordRequest, ResetTokenQuery, StatusMessage, UpdateUserRequest,
            UserResponse, UserWithLoans,
        },
        error::UserError,
        jwt::{AuthUser, Claims},
        repo_types::Role,
    },
};

type ApiError = (StatusCode, String);

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/password/forgot", post(forgot_password))
        .route("/auth/password/reset", post(reset_password))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/me", get(get_me))
        .route("/me/password", put(change_password))
}

fn forbidden() -> ApiError {
    (StatusCode::FORBIDDEN, "Forbidden".into())
}

fn is_staff(claims: &Claims) -> bool {
    matches!(claims.role, Role::Admin | Role::Librarian)
}

fn ensure_self_or_staff(claims: &Claims, id: i64) -> Result<(), ApiError> {
    if claims.sub == id || is_staff(claims) {
        Ok(())
    } else {
        warn!(user_id = claims.sub, target = id, "access to another account denied");
        Err(forbidden())
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    if payload.role.is_some_and(|r| r != Role::Member) {
        return Err(forbidden());
    }
    let res = state.users.register(payload).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    Ok(Json(state.users.login(payload).await?))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<StatusMessage>, ApiError> {
    Ok(Json(state.users.forgot_password(&payload).await?))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Query(q): Query<ResetTokenQuery>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<StatusMessage>, ApiError> {
    Ok(Json(state.users.reset_password(&payload, &q.token).await?))
}

#[instrument(skip(state, claims))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Vec<UserWithLoans>>, ApiError> {
    if !is_staff(&claims) {
        return Err(forbidden());
    }
    Ok(Json(state.users.get_all().await?))
}

#[instrument(skip(state, claims))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    ensure_self_or_staff(&claims, id)?;
    Ok(Json(state.users.get_by_id(id).await?))
}

#[instrument(skip(state, claims, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    ensure_self_or_staff(&claims, id)?;
    if claims.role != Role::Admin {
        let current = state.users.get_by_id(id).await?;
        // non-admin staff only manage accounts ranked below them
        if claims.sub != id && current.role.rank() >= claims.role.rank() {
            warn!(user_id = claims.sub, target = id, "edit of equal or higher rank denied");
            return Err(forbidden());
        }
        // only admins hand out roles
        if payload.role != current.role {
            return Err(forbidden());
        }
    }
    Ok(Json(state.users.update(id, payload).await?))
}

#[instrument(skip(state, claims))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if claims.sub != id && claims.role != Role::Admin {
        return Err(forbidden());
    }
    state.users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, claims))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    state
        .users
        .get_by_id(claims.sub)
        .await
        .map(Json)
        .map_err(|e| me_error(claims.sub, e))
}

fn me_error(user_id: i64, e: UserError) -> ApiError {
    match e {
        // a valid token for a deleted account
        UserError::NotFound(_) => {
            warn!(user_id, "user not found");
            (StatusCode::UNAUTHORIZED, "User not found".into())
        }
        other => other.into(),
    }
}

#[instrument(skip(state, claims, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state.users.change_password(claims.sub, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        extract::FromRef,
        http::{header, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, users::jwt::JwtKeys};

    async fn call(
        app: Router,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    fn signup_body(email: &str, phone: &str) -> Value {
        json!({
            "email": email,
            "name": "Ada Reader",
            "phone_number": phone,
            "password": "long-enough",
        })
    }

    async fn register(state: &AppState, email: &str, phone: &str) -> (i64, String) {
        let (status, body) = call(
            build_app(state.clone()),
            "POST",
            "/api/v1/auth/register",
            None,
            Some(signup_body(email, phone)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["user"]["id"].as_i64().unwrap(),
            body["access_token"].as_str().unwrap().to_string(),
        )
    }

    fn staff_token(state: &AppState, role: Role) -> String {
        JwtKeys::from_ref(state)
            .sign(&UserResponse {
                id: 1000,
                email: "staff@lib.org".into(),
                name: "Staff".into(),
                phone_number: "0".into(),
                role,
            })
            .unwrap()
    }


    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = call(build_app(AppState::fake()), "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("ok".into()));
    }

    #[tokio::test]
    async fn register_then_login_and_me() {
        let state = AppState::fake();
        let (id, token) = register(&state, "a@x.com", "1").await;

        let (status, body) = call(
            build_app(state.clone()),
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "a@x.com", "password": "long-enough"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], id);
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = call(build_app(state), "GET", "/api/v1/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "a@x.com");
    }

    #[tokio::test]
    async fn error_kinds_map_to_statuses() {
        let state = AppState::fake();
        register(&state, "a@x.com", "1").await;

        let (status, _) = call(
            build_app(state.clone()),
            "POST",
            "/api/v1/auth/register",
            None,
            Some(signup_body("a@x.com", "2")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            build_app(state.clone()),
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "a@x.com", "password": "wrong-password"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            build_app(state),
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "ghost@x.com", "password": "whatever1"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn self_registration_cannot_pick_a_role() {
        let mut body = signup_body("a@x.com", "1");
        body["role"] = json!("admin");
        let (status, _) = call(
            build_app(AppState::fake()),
            "POST",
            "/api/v1/auth/register",
            None,
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn members_only_see_themselves() {
        let state = AppState::fake();
        let (a, token_a) = register(&state, "a@x.com", "1").await;
        let (b, _) = register(&state, "b@x.com", "2").await;

        let (status, _) = call(build_app(state.clone()), "GET", &format!("/api/v1/users/{a}"), Some(&token_a), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(build_app(state.clone()), "GET", &format!("/api/v1/users/{b}"), Some(&token_a), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(build_app(state.clone()), "GET", "/api/v1/users", Some(&token_a), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(build_app(state), "GET", "/api/v1/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn librarian_lists_users_with_loans() {
        let state = AppState::fake();
        let token = staff_token(&state, Role::Librarian);

        let (status, body) = call(build_app(state.clone()), "GET", "/api/v1/users", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        register(&state, "a@x.com", "1").await;
        let (_, body) = call(build_app(state), "GET", "/api/v1/users", Some(&token), None).await;
        assert_eq!(body[0]["email"], "a@x.com");
        assert_eq!(body[0]["loans"], json!([]));
    }

    #[tokio::test]
    async fn only_admins_change_roles() {
        let state = AppState::fake();
        let (a, token_a) = register(&state, "a@x.com", "1").await;
        let promote = json!({
            "email": "a@x.com", "name": "Ada", "phone_number": "1", "role": "admin"
        });

        let (status, _) = call(
            build_app(state.clone()),
            "PUT",
            &format!("/api/v1/users/{a}"),
            Some(&token_a),
            Some(promote.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = staff_token(&state, Role::Admin);
        let (status, body) = call(
            build_app(state),
            "PUT",
            &format!("/api/v1/users/{a}"),
            Some(&admin),
            Some(promote),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "admin");
        assert_eq!(body["name"], "Ada");
    }

    #[tokio::test]
    async fn librarian_cannot_edit_admin_account() {
        let state = AppState::fake();
        let (a, _) = register(&state, "a@x.com", "1").await;
        let (m, _) = register(&state, "m@x.com", "2").await;
        let admin = staff_token(&state, Role::Admin);
        let librarian = staff_token(&state, Role::Librarian);

        let (status, _) = call(
            build_app(state.clone()),
            "PUT",
            &format!("/api/v1/users/{a}"),
            Some(&admin),
            Some(json!({"email": "a@x.com", "name": "Ada", "phone_number": "1", "role": "admin"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            build_app(state.clone()),
            "PUT",
            &format!("/api/v1/users/{a}"),
            Some(&librarian),
            Some(json!({"email": "attacker@evil.com", "name": "Ada", "phone_number": "1", "role": "admin"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, body) = call(build_app(state.clone()), "GET", &format!("/api/v1/users/{a}"), Some(&admin), None).await;
        assert_eq!(body["email"], "a@x.com");

        // members stay editable by librarians
        let (status, body) = call(
            build_app(state),
            "PUT",
            &format!("/api/v1/users/{m}"),
            Some(&librarian),
            Some(json!({"email": "m@x.com", "name": "Mo", "phone_number": "2", "role": "member"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Mo");
    }

    #[test]
    fn me_maps_only_missing_account_to_unauthorized() {
        let (status, _) = me_error(1, UserError::NotFound("user"));
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = me_error(1, UserError::Internal(anyhow::anyhow!("pool timed out")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("pool"));
    }

    #[tokio::test]
    async fn delete_own_account() {
        let state = AppState::fake();
        let (a, token_a) = register(&state, "a@x.com", "1").await;

        let (status, _) = call(build_app(state.clone()), "DELETE", &format!("/api/v1/users/{a}"), Some(&token_a), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(build_app(state), "GET", "/api/v1/me", Some(&token_a), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reset_with_unknown_token_is_not_found() {
        let (status, _) = call(
            build_app(AppState::fake()),
            "POST",
            "/api/v1/auth/password/reset?token=nope",
            None,
            Some(json!({"new_password": "brand-new-pass"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn forgot_password_answers_generically() {
        let (status, body) = call(
            build_app(AppState::fake()),
            "POST",
            "/api/v1/auth/password/forgot",
            None,
            Some(json!({"email": "ghost@x.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], crate::users::services::RECOVERY_SENT);
    }
}
