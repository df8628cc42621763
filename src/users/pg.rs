use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use super::error::{unique_violation, UserError, UserResult};
use super::repo_types::{Loan, NewUser, PasswordResetToken, User};
use super::store::{ResetTokenStore, UserStore};

const USER_COLUMNS: &str =
    "id, email, name, phone_number, role, password_hash, created_at, updated_at";

/// Postgres-backed user and reset-token tables.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_err(e: sqlx::Error) -> UserError {
    match unique_violation(&e) {
        Some(field) => UserError::Conflict(field),
        None => UserError::Storage(e),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn list(&self) -> UserResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn loans_for(&self, user_ids: &[i64]) -> UserResult<Vec<Loan>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, user_id, book_title, borrowed_at, due_at, returned_at
            FROM loans
            WHERE user_id = ANY($1)
            ORDER BY borrowed_at
            "#,
        )
        .bind(user_ids.to_vec())
        .fetch_all(&self.db)
        .await?;
        Ok(loans)
    }

    async fn find_by_id(&self, id: i64) -> UserResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> UserResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn email_taken(&self, email: &str, exclude_id: Option<i64>) -> UserResult<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE email = $1 AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.db)
        .await?;
        Ok(taken)
    }

    async fn phone_taken(&self, phone: &str, exclude_id: Option<i64>) -> UserResult<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE phone_number = $1 AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(phone)
        .bind(exclude_id)
        .fetch_one(&self.db)
        .await?;
        Ok(taken)
    }

    async fn insert(&self, user: NewUser) -> UserResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, name, phone_number, role, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.phone_number)
        .bind(user.role)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_err)?;
        Ok(created)
    }

    async fn update(&self, user: &User) -> UserResult<Option<User>> {
        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email = $2, name = $3, phone_number = $4, role = $5,
                password_hash = $6, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.phone_number)
        .bind(user.role)
        .bind(&user.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_err)?;
        Ok(updated)
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> UserResult<bool> {
        let res = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> UserResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl ResetTokenStore for PgStore {
    async fn insert(
        &self,
        user_id: i64,
        token: &str,
        expiration: OffsetDateTime,
    ) -> UserResult<PasswordResetToken> {
        let row = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (user_id, token, expiration)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token, expiration
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expiration)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_err)?;
        Ok(row)
    }

    async fn find_valid(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> UserResult<Option<PasswordResetToken>> {
        let row = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, user_id, token, expiration
            FROM password_reset_tokens
            WHERE token = $1 AND expiration > $2
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> UserResult<Option<PasswordResetToken>> {
        let row = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT id, user_id, token, expiration FROM password_reset_tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete(&self, id: i64) -> UserResult<bool> {
        let res = sqlx::query("DELETE FROM password_reset_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> UserResult<u64> {
        let res = sqlx::query("DELETE FROM password_reset_tokens WHERE expiration <= $1")
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }

    async fn delete_for_user(&self, user_id: i64) -> UserResult<u64> {
        let res = sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }
}
