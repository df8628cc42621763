use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::error::{UserError, UserResult};
use super::repo_types::{Loan, NewUser, PasswordResetToken, User};
use super::store::{ResetTokenStore, UserStore};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    loans: Vec<Loan>,
    tokens: BTreeMap<i64, PasswordResetToken>,
    next_user_id: i64,
    next_token_id: i64,
}

/// In-process store with the same constraints as the Postgres schema.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn add_loan(&self, user_id: i64, book_title: &str, due_at: OffsetDateTime) -> Loan {
        let mut t = self.inner.write().await;
        let loan = Loan {
            id: t.loans.len() as i64 + 1,
            user_id,
            book_title: book_title.to_string(),
            borrowed_at: OffsetDateTime::now_utc(),
            due_at,
            returned_at: None,
        };
        t.loans.push(loan.clone());
        loan
    }

    #[cfg(test)]
    pub async fn token_count(&self) -> usize {
        self.inner.read().await.tokens.len()
    }
}

fn clash(t: &Tables, email: &str, phone: &str, exclude_id: Option<i64>) -> Option<&'static str> {
    let others = t.users.values().filter(|u| Some(u.id) != exclude_id);
    for u in others {
        if u.email == email {
            return Some("email");
        }
        if u.phone_number == phone {
            return Some("phone number");
        }
    }
    None
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn list(&self) -> UserResult<Vec<User>> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn loans_for(&self, user_ids: &[i64]) -> UserResult<Vec<Loan>> {
        let t = self.inner.read().await;
        Ok(t.loans
            .iter()
            .filter(|l| user_ids.contains(&l.user_id))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> UserResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> UserResult<Option<User>> {
        let t = self.inner.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn email_taken(&self, email: &str, exclude_id: Option<i64>) -> UserResult<bool> {
        let t = self.inner.read().await;
        Ok(t.users
            .values()
            .any(|u| u.email == email && Some(u.id) != exclude_id))
    }

    async fn phone_taken(&self, phone: &str, exclude_id: Option<i64>) -> UserResult<bool> {
        let t = self.inner.read().await;
        Ok(t.users
            .values()
            .any(|u| u.phone_number == phone && Some(u.id) != exclude_id))
    }

    async fn insert(&self, user: NewUser) -> UserResult<User> {
        let mut t = self.inner.write().await;
        if let Some(field) = clash(&t, &user.email, &user.phone_number, None) {
            return Err(UserError::Conflict(field));
        }
        t.next_user_id += 1;
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: t.next_user_id,
            email: user.email,
            name: user.name,
            phone_number: user.phone_number,
            role: user.role,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, user: &User) -> UserResult<Option<User>> {
        let mut t = self.inner.write().await;
        if !t.users.contains_key(&user.id) {
            return Ok(None);
        }
        if let Some(field) = clash(&t, &user.email, &user.phone_number, Some(user.id)) {
            return Err(UserError::Conflict(field));
        }
        let mut updated = user.clone();
        updated.updated_at = OffsetDateTime::now_utc();
        t.users.insert(updated.id, updated.clone());
        Ok(Some(updated))
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> UserResult<bool> {
        let mut t = self.inner.write().await;
        match t.users.get_mut(&id) {
            Some(u) => {
                u.password_hash = password_hash.to_string();
                u.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i64) -> UserResult<bool> {
        let mut t = self.inner.write().await;
        let removed = t.users.remove(&id).is_some();
        if removed {
            // ON DELETE CASCADE
            t.loans.retain(|l| l.user_id != id);
            t.tokens.retain(|_, tok| tok.user_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn insert(
        &self,
        user_id: i64,
        token: &str,
        expiration: OffsetDateTime,
    ) -> UserResult<PasswordResetToken> {
        let mut t = self.inner.write().await;
        if !t.users.contains_key(&user_id) {
            return Err(UserError::NotFound("user"));
        }
        if t.tokens.values().any(|tok| tok.token == token) {
            return Err(UserError::Conflict("token"));
        }
        t.next_token_id += 1;
        let row = PasswordResetToken {
            id: t.next_token_id,
            user_id,
            token: token.to_string(),
            expiration,
        };
        t.tokens.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_valid(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> UserResult<Option<PasswordResetToken>> {
        let t = self.inner.read().await;
        Ok(t.tokens
            .values()
            .find(|tok| tok.token == token && tok.is_valid_at(now))
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> UserResult<Option<PasswordResetToken>> {
        Ok(self.inner.read().await.tokens.get(&id).cloned())
    }

    async fn delete(&self, id: i64) -> UserResult<bool> {
        Ok(self.inner.write().await.tokens.remove(&id).is_some())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> UserResult<u64> {
        let mut t = self.inner.write().await;
        let before = t.tokens.len();
        t.tokens.retain(|_, tok| tok.is_valid_at(now));
        Ok((before - t.tokens.len()) as u64)
    }

    async fn delete_for_user(&self, user_id: i64) -> UserResult<u64> {
        let mut t = self.inner.write().await;
        let before = t.tokens.len();
        t.tokens.retain(|_, tok| tok.user_id != user_id);
        Ok((before - t.tokens.len()) as u64)
    }
}
