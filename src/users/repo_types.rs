use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Librarian,
    #[default]
    Member,
}

impl Role {
    /// Higher ranks may manage accounts of lower ranks.
    pub fn rank(self) -> u8 {
        match self {
            Role::Admin => 2,
            Role::Librarian => 1,
            Role::Member => 0,
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub phone_number: String,
    pub role: Role,
    pub password_hash: String, // Argon2 PHC string, never serialized
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Row shape for inserts; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub phone_number: String,
    pub role: Role,
    pub password_hash: String,
}

/// A book loan held by a user. Read-only from this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: i64,
    pub user_id: i64,
    pub book_title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub borrowed_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub due_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub returned_at: Option<OffsetDateTime>,
}

/// User together with eagerly loaded loans.
#[derive(Debug, Clone)]
pub struct UserEntity {
    pub user: User,
    pub loans: Vec<Loan>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PasswordResetToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expiration: OffsetDateTime,
}

impl PasswordResetToken {
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.expiration > now
    }
}
