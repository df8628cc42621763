use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use super::dto::{
    AuthResponse, ChangePasswordRequest, CreateUserRequest, ForgotPasswordRequest, LoginRequest,
    ResetPasswordRequest, StatusMessage, UpdateUserRequest, UserResponse, UserWithLoans,
};
use super::error::{UserError, UserResult};
use super::jwt::TokenGenerator;
use super::password::verify_password;
use super::repo::UserRepository;
use crate::mailer::{EmailMessage, EmailSender};

const MIN_PASSWORD_LEN: usize = 8;

pub const RECOVERY_SENT: &str = "If the email is registered, a password reset link has been sent";
pub const PASSWORD_RESET: &str = "Password has been reset";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_email(email: &str) -> UserResult<()> {
    if !is_valid_email(email) {
        return Err(UserError::Validation("Invalid email".into()));
    }
    Ok(())
}

fn check_password(password: &str) -> UserResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserError::Validation("Password too short".into()));
    }
    Ok(())
}

fn check_required(value: &str, field: &str) -> UserResult<()> {
    if value.trim().is_empty() {
        return Err(UserError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Password recovery and reset.
#[derive(Clone)]
pub struct PasswordService {
    repo: UserRepository,
    mailer: Arc<dyn EmailSender>,
    reset_url_base: String,
}

impl PasswordService {
    pub fn new(
        repo: UserRepository,
        mailer: Arc<dyn EmailSender>,
        reset_url_base: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            mailer,
            reset_url_base: reset_url_base.into(),
        }
    }

    /// Same answer whether or not the account exists.
    #[instrument(skip(self, request))]
    pub async fn process_password_recovery(
        &self,
        request: &ForgotPasswordRequest,
    ) -> UserResult<StatusMessage> {
        let email = normalize_email(&request.email);
        check_email(&email)?;

        let issued = match self.repo.create_token(&email).await {
            Ok(issued) => issued,
            Err(UserError::NotFound(_)) => {
                info!("password recovery for unknown email");
                return Ok(StatusMessage::new(RECOVERY_SENT));
            }
            Err(e) => return Err(e),
        };

        let message = EmailMessage {
            to: issued.user.email.clone(),
            subject: "Reset your library password".into(),
            body: format!(
                "Hello {},\n\nUse the link below to choose a new password. It expires at {}.\n\n{}{}\n\nIf you did not ask for this, ignore this email.",
                issued.user.name,
                issued.token.expiration,
                self.reset_url_base,
                issued.token.token,
            ),
        };
        if let Err(e) = self.mailer.send(message).await {
            error!(error = %e, user_id = issued.user.id, "recovery email failed");
        }
        Ok(StatusMessage::new(RECOVERY_SENT))
    }

    #[instrument(skip_all)]
    pub async fn process_password_reset(
        &self,
        request: &ResetPasswordRequest,
        token: &str,
    ) -> UserResult<StatusMessage> {
        check_password(&request.new_password)?;

        let record = self.repo.get_token(token).await?;
        let user = self.repo.get_by_id(record.user_id).await?;
        self.repo
            .update_password(&user.email, &request.new_password)
            .await?;
        self.repo.remove_token(&record).await?;
        // links from earlier recovery emails die with the old password
        self.repo.remove_tokens_for_user(user.id).await?;
        if let Err(e) = self.repo.purge_expired_tokens().await {
            warn!(error = %e, "purging expired reset tokens failed");
        }

        info!(user_id = user.id, "password reset via token");
        Ok(StatusMessage::new(PASSWORD_RESET))
    }
}

/// Account operations exposed to the HTTP layer.
#[derive(Clone)]
pub struct UserService {
    repo: UserRepository,
    tokens: Arc<dyn TokenGenerator>,
    mailer: Arc<dyn EmailSender>,
    passwords: PasswordService,
}

impl UserService {
    pub fn new(
        repo: UserRepository,
        tokens: Arc<dyn TokenGenerator>,
        mailer: Arc<dyn EmailSender>,
        passwords: PasswordService,
    ) -> Self {
        Self {
            repo,
            tokens,
            mailer,
            passwords,
        }
    }

    fn session_for(&self, user: UserResponse) -> UserResult<AuthResponse> {
        let token = self.tokens.generate(&user)?;
        Ok(AuthResponse::bearer(token, user))
    }

    #[instrument(skip(self, request))]
    pub async fn register(&self, mut request: CreateUserRequest) -> UserResult<AuthResponse> {
        request.email = normalize_email(&request.email);
        request.phone_number = request.phone_number.trim().to_string();
        check_email(&request.email)?;
        check_password(&request.password)?;
        check_required(&request.name, "name")?;
        check_required(&request.phone_number, "phone_number")?;

        let user = self.repo.create(request).await?;

        let welcome = EmailMessage {
            to: user.email.clone(),
            subject: "Welcome to the library".into(),
            body: format!("Hello {},\n\nYour library account is ready.", user.name),
        };
        if let Err(e) = self.mailer.send(welcome).await {
            warn!(error = %e, user_id = user.id, "welcome email failed");
        }

        info!(user_id = user.id, email = %user.email, "user registered");
        self.session_for(user)
    }

    #[instrument(skip(self, request))]
    pub async fn login(&self, mut request: LoginRequest) -> UserResult<AuthResponse> {
        request.email = normalize_email(&request.email);
        check_email(&request.email)?;

        let user = self.repo.login(&request).await?;
        info!(user_id = user.id, "user logged in");
        self.session_for(user)
    }

    pub async fn get_all(&self) -> UserResult<Vec<UserWithLoans>> {
        self.repo.list_all().await
    }

    pub async fn get_by_id(&self, id: i64) -> UserResult<UserResponse> {
        self.repo.get_by_id(id).await
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: i64, request: UpdateUserRequest) -> UserResult<UserResponse> {
        let email = normalize_email(&request.email);
        let phone_number = request.phone_number.trim().to_string();
        check_email(&email)?;
        check_required(&request.name, "name")?;
        check_required(&phone_number, "phone_number")?;

        if self.repo.exists_with_email(&email, Some(id)).await? {
            return Err(UserError::Conflict("email"));
        }
        if self.repo.exists_with_phone(&phone_number, Some(id)).await? {
            return Err(UserError::Conflict("phone number"));
        }

        let mut entity = self.repo.get_entity_by_id(id).await?;
        entity.user.email = email;
        entity.user.name = request.name;
        entity.user.phone_number = phone_number;
        entity.user.role = request.role;
        self.repo.update(&entity.user).await
    }

    pub async fn delete(&self, id: i64) -> UserResult<()> {
        self.repo.remove(id).await
    }

    #[instrument(skip(self, request))]
    pub async fn change_password(&self, id: i64, request: &ChangePasswordRequest) -> UserResult<()> {
        check_password(&request.new_password)?;
        let user = self.repo.get_by_id(id).await?;
        let credentials = self.repo.get_by_email(&user.email).await?;
        if !verify_password(&credentials.password_hash, &request.current_password).is_match() {
            warn!(user_id = id, "change password with wrong current password");
            return Err(UserError::InvalidCredential);
        }
        self.repo
            .update_password(&credentials.user.email, &request.new_password)
            .await
    }

    pub async fn forgot_password(&self, request: &ForgotPasswordRequest) -> UserResult<StatusMessage> {
        self.passwords.process_password_recovery(request).await
    }

    pub async fn reset_password(
        &self,
        request: &ResetPasswordRequest,
        token: &str,
    ) -> UserResult<StatusMessage> {
        self.passwords.process_password_reset(request, token).await
    }
}
