use serde::{Deserialize, Serialize};

use super::repo_types::{Loan, PasswordResetToken, Role, User, UserEntity};

/// Request body for user registration.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub phone_number: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Request body for login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Full profile replacement; every field is written.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserRequest {
    pub email: String,
    pub name: String,
    pub phone_number: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetTokenQuery {
    pub token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub phone_number: String,
    pub role: Role,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            phone_number: u.phone_number.clone(),
            role: u.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserWithLoans {
    #[serde(flatten)]
    pub user: UserResponse,
    pub loans: Vec<Loan>,
}

impl From<UserEntity> for UserWithLoans {
    fn from(e: UserEntity) -> Self {
        Self {
            user: UserResponse::from(&e.user),
            loans: e.loans,
        }
    }
}

/// Internal projection carrying the digest. Deliberately not `Serialize`.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: UserResponse,
    pub password_hash: String,
}

impl From<User> for UserCredentials {
    fn from(u: User) -> Self {
        Self {
            user: UserResponse::from(&u),
            password_hash: u.password_hash,
        }
    }
}

/// Reset token together with the user it was issued for.
#[derive(Debug, Clone)]
pub struct IssuedResetToken {
    pub token: PasswordResetToken,
    pub user: UserResponse,
}

/// Response returned after register or login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: UserResponse,
}

impl AuthResponse {
    pub fn bearer(access_token: String, user: UserResponse) -> Self {
        Self {
            access_token,
            token_type: "Bearer",
            user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
