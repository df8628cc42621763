use axum::http::StatusCode;
use thiserror::Error;
use tracing::error;

/// Failure kinds surfaced by the user repository and services.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already in use")]
    Conflict(&'static str),

    #[error("invalid credentials")]
    InvalidCredential,

    #[error("{0}")]
    Validation(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type UserResult<T> = Result<T, UserError>;

impl UserError {
    pub fn status(&self) -> StatusCode {
        match self {
            UserError::NotFound(_) => StatusCode::NOT_FOUND,
            UserError::Conflict(_) => StatusCode::CONFLICT,
            UserError::InvalidCredential => StatusCode::UNAUTHORIZED,
            UserError::Validation(_) => StatusCode::BAD_REQUEST,
            UserError::Hash(_) | UserError::Storage(_) | UserError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Handler-side conversion; internal details stay in the log.
impl From<UserError> for (StatusCode, String) {
    fn from(e: UserError) -> Self {
        let status = e.status();
        if status.is_server_error() {
            error!(error = %e, "request failed");
            (status, "Internal server error".into())
        } else {
            (status, e.to_string())
        }
    }
}

/// Postgres `unique_violation`.
pub(crate) fn unique_violation(e: &sqlx::Error) -> Option<&'static str> {
    let db = e.as_database_error()?;
    conflict_field(db.code().as_deref(), db.constraint())
}

/// Field named in a `Conflict`, from the SQLSTATE and violated constraint.
fn conflict_field(code: Option<&str>, constraint: Option<&str>) -> Option<&'static str> {
    if code != Some("23505") {
        return None;
    }
    match constraint {
        Some(c) if c.contains("phone") => Some("phone number"),
        Some(c) if c.contains("token") => Some("token"),
        _ => Some("email"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_kinds_to_status_codes() {
        assert_eq!(UserError::NotFound("user").status(), StatusCode::NOT_FOUND);
        assert_eq!(UserError::Conflict("email").status(), StatusCode::CONFLICT);
        assert_eq!(UserError::InvalidCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(UserError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            UserError::Hash("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unique_constraints_name_the_clashing_field() {
        let unique = Some("23505");
        assert_eq!(conflict_field(unique, Some("users_email_key")), Some("email"));
        assert_eq!(
            conflict_field(unique, Some("users_phone_number_key")),
            Some("phone number")
        );
        assert_eq!(
            conflict_field(unique, Some("password_reset_tokens_token_key")),
            Some("token")
        );
        assert_eq!(conflict_field(unique, None), Some("email"));
        // foreign key violation
        assert_eq!(conflict_field(Some("23503"), Some("users_email_key")), None);
        assert_eq!(conflict_field(None, None), None);
    }

    #[test]
    fn non_database_errors_are_not_conflicts() {
        assert_eq!(unique_violation(&sqlx::Error::RowNotFound), None);
    }

    #[test]
    fn server_errors_hide_details() {
        let (status, body) =
            <(StatusCode, String)>::from(UserError::Hash("salt exploded".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("salt"));

        let (status, body) = <(StatusCode, String)>::from(UserError::Conflict("email"));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "email already in use");
    }
}
