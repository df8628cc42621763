use std::collections::HashMap;
use std::sync::Arc;

use time::Duration;
use tracing::{debug, info, instrument, warn};

use super::clock::Clock;
use super::dto::{
    CreateUserRequest, IssuedResetToken, LoginRequest, UserCredentials, UserResponse,
    UserWithLoans,
};
use super::error::{UserError, UserResult};
use super::password::{hash_password, verify_password, Verification};
use super::repo_types::{NewUser, PasswordResetToken, User, UserEntity};
use super::store::{ResetTokenStore, UserStore};
use super::tokens::generate_reset_token;

/// Data access for users and their reset tokens.
#[derive(Clone)]
pub struct UserRepository {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn ResetTokenStore>,
    clock: Arc<dyn Clock>,
    reset_ttl: Duration,
}

impl UserRepository {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn ResetTokenStore>,
        clock: Arc<dyn Clock>,
        reset_ttl: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            clock,
            reset_ttl,
        }
    }

    /// All users with their loans. An empty table yields an empty list.
    pub async fn list_all(&self) -> UserResult<Vec<UserWithLoans>> {
        let users = self.users.list().await?;
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        let mut loans_by_user: HashMap<i64, Vec<_>> = HashMap::new();
        for loan in self.users.loans_for(&ids).await? {
            loans_by_user.entry(loan.user_id).or_default().push(loan);
        }
        Ok(users
            .into_iter()
            .map(|user| {
                let loans = loans_by_user.remove(&user.id).unwrap_or_default();
                UserWithLoans::from(UserEntity { user, loans })
            })
            .collect())
    }

    pub async fn get_by_id(&self, id: i64) -> UserResult<UserResponse> {
        let user = self.fetch(id).await?;
        Ok(UserResponse::from(&user))
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(&self, input: CreateUserRequest) -> UserResult<UserResponse> {
        if self.users.email_taken(&input.email, None).await? {
            warn!("email already registered");
            return Err(UserError::Conflict("email"));
        }
        if self.users.phone_taken(&input.phone_number, None).await? {
            warn!("phone number already registered");
            return Err(UserError::Conflict("phone number"));
        }

        let password_hash = hash_password(&input.password)?;
        let user = self
            .users
            .insert(NewUser {
                email: input.email,
                name: input.name,
                phone_number: input.phone_number,
                role: input.role.unwrap_or_default(),
                password_hash,
            })
            .await?;

        info!(user_id = user.id, "user created");
        Ok(UserResponse::from(&user))
    }

    /// Writes every column of `user` back.
    pub async fn update(&self, user: &User) -> UserResult<UserResponse> {
        let updated = self
            .users
            .update(user)
            .await?
            .ok_or(UserError::NotFound("user"))?;
        debug!(user_id = updated.id, "user updated");
        Ok(UserResponse::from(&updated))
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &LoginRequest) -> UserResult<UserResponse> {
        let user = self
            .users
            .find_by_email(&credentials.email)
            .await?
            .ok_or(UserError::NotFound("user"))?;

        match verify_password(&user.password_hash, &credentials.password) {
            Verification::Match => {}
            Verification::Mismatch => {
                warn!(user_id = user.id, "login invalid password");
                return Err(UserError::InvalidCredential);
            }
            Verification::RehashNeeded => {
                let upgraded = hash_password(&credentials.password)?;
                self.users.set_password_hash(user.id, &upgraded).await?;
                info!(user_id = user.id, "password digest upgraded");
            }
        }
        Ok(UserResponse::from(&user))
    }

    pub async fn remove(&self, id: i64) -> UserResult<()> {
        let user = self.fetch(id).await?;
        if !self.users.delete(user.id).await? {
            return Err(UserError::NotFound("user"));
        }
        info!(user_id = id, "user removed");
        Ok(())
    }

    /// Internal lookup; the result carries the digest.
    pub async fn get_by_email(&self, email: &str) -> UserResult<UserCredentials> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(UserError::NotFound("user"))?;
        Ok(UserCredentials::from(user))
    }

    pub async fn exists_with_email(&self, email: &str, exclude_id: Option<i64>) -> UserResult<bool> {
        self.users.email_taken(email, exclude_id).await
    }

    pub async fn exists_with_phone(&self, phone: &str, exclude_id: Option<i64>) -> UserResult<bool> {
        self.users.phone_taken(phone, exclude_id).await
    }

    pub async fn get_entity_by_id(&self, id: i64) -> UserResult<UserEntity> {
        let user = self.fetch(id).await?;
        let loans = self.users.loans_for(&[id]).await?;
        Ok(UserEntity { user, loans })
    }

    #[instrument(skip(self))]
    pub async fn create_token(&self, email: &str) -> UserResult<IssuedResetToken> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(UserError::NotFound("user"))?;

        let expiration = self.clock.now() + self.reset_ttl;
        let token = self
            .tokens
            .insert(user.id, &generate_reset_token(), expiration)
            .await?;

        info!(user_id = user.id, token_id = token.id, %expiration, "reset token issued");
        Ok(IssuedResetToken {
            token,
            user: UserResponse::from(&user),
        })
    }

    /// Expired and unknown tokens are both `NotFound`.
    pub async fn get_token(&self, token: &str) -> UserResult<PasswordResetToken> {
        self.tokens
            .find_valid(token, self.clock.now())
            .await?
            .ok_or(UserError::NotFound("token"))
    }

    pub async fn remove_token(&self, token: &PasswordResetToken) -> UserResult<()> {
        let row = self
            .tokens
            .find_by_id(token.id)
            .await?
            .ok_or(UserError::NotFound("token"))?;
        if !self.tokens.delete(row.id).await? {
            return Err(UserError::NotFound("token"));
        }
        debug!(token_id = row.id, "reset token removed");
        Ok(())
    }

    /// Invalidates every outstanding reset token of `user_id`.
    pub async fn remove_tokens_for_user(&self, user_id: i64) -> UserResult<u64> {
        let removed = self.tokens.delete_for_user(user_id).await?;
        debug!(user_id, removed, "reset tokens revoked");
        Ok(removed)
    }

    pub async fn purge_expired_tokens(&self) -> UserResult<u64> {
        let purged = self.tokens.delete_expired(self.clock.now()).await?;
        if purged > 0 {
            debug!(purged, "expired reset tokens purged");
        }
        Ok(purged)
    }

    pub async fn update_password(&self, email: &str, new_password: &str) -> UserResult<()> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(UserError::NotFound("user"))?;
        let password_hash = hash_password(new_password)?;
        if !self.users.set_password_hash(user.id, &password_hash).await? {
            return Err(UserError::NotFound("user"));
        }
        info!(user_id = user.id, "password updated");
        Ok(())
    }

    async fn fetch(&self, id: i64) -> UserResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or(UserError::NotFound("user"))
    }
}
