use async_trait::async_trait;
use time::OffsetDateTime;

use super::error::UserResult;
use super::repo_types::{Loan, NewUser, PasswordResetToken, User};

/// Persistent table of users. Unique on email and phone number.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list(&self) -> UserResult<Vec<User>>;

    async fn loans_for(&self, user_ids: &[i64]) -> UserResult<Vec<Loan>>;

    async fn find_by_id(&self, id: i64) -> UserResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> UserResult<Option<User>>;

    /// True if another user (not `exclude_id`) already has this email.
    async fn email_taken(&self, email: &str, exclude_id: Option<i64>) -> UserResult<bool>;

    async fn phone_taken(&self, phone: &str, exclude_id: Option<i64>) -> UserResult<bool>;

    /// Fails with `Conflict` when a uniqueness constraint is hit.
    async fn insert(&self, user: NewUser) -> UserResult<User>;

    /// Overwrites every column. Returns `None` if the row is gone.
    async fn update(&self, user: &User) -> UserResult<Option<User>>;

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> UserResult<bool>;

    async fn delete(&self, id: i64) -> UserResult<bool>;
}

/// Persistent table of single-use password reset tokens.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn insert(
        &self,
        user_id: i64,
        token: &str,
        expiration: OffsetDateTime,
    ) -> UserResult<PasswordResetToken>;

    /// Exact match on `token` with `expiration > now`.
    async fn find_valid(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> UserResult<Option<PasswordResetToken>>;

    async fn find_by_id(&self, id: i64) -> UserResult<Option<PasswordResetToken>>;

    async fn delete(&self, id: i64) -> UserResult<bool>;

    async fn delete_expired(&self, now: OffsetDateTime) -> UserResult<u64>;

    /// Drops every token issued to `user_id`, expired or not.
    async fn delete_for_user(&self, user_id: i64) -> UserResult<u64>;
}
