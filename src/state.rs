use std::sync::Arc;

use anyhow::Context;
use time::Duration;
use tracing::info;

use crate::config::{AppConfig, StorageBackend};
use crate::mailer::{EmailSender, LogMailer};
use crate::users::{
    clock::SystemClock,
    jwt::{JwtKeys, TokenGenerator},
    memory::MemoryStore,
    pg::PgStore,
    repo::UserRepository,
    services::{PasswordService, UserService},
    store::{ResetTokenStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (users, tokens): (Arc<dyn UserStore>, Arc<dyn ResetTokenStore>) = match config.storage
        {
            StorageBackend::Postgres => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .connect(&config.database_url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                let store = PgStore::new(db);
                (
                    Arc::new(store.clone()) as Arc<dyn UserStore>,
                    Arc::new(store) as Arc<dyn ResetTokenStore>,
                )
            }
            StorageBackend::Memory => {
                info!("using in-memory storage; data is lost on restart");
                let store = MemoryStore::new();
                (
                    Arc::new(store.clone()) as Arc<dyn UserStore>,
                    Arc::new(store) as Arc<dyn ResetTokenStore>,
                )
            }
        };

        let mailer = Arc::new(LogMailer::new(config.mail.from.clone())) as Arc<dyn EmailSender>;
        Ok(Self::from_parts(config, users, tokens, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn ResetTokenStore>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        let repo = UserRepository::new(
            users,
            tokens,
            Arc::new(SystemClock),
            Duration::hours(config.reset_token_ttl_hours),
        );
        let passwords = PasswordService::new(
            repo.clone(),
            mailer.clone(),
            config.mail.reset_url_base.clone(),
        );
        let session_tokens = Arc::new(JwtKeys::from(&config.jwt)) as Arc<dyn TokenGenerator>;
        let users = UserService::new(repo, session_tokens, mailer, passwords);
        Self { config, users }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::{JwtConfig, MailConfig};

        let config = Arc::new(AppConfig {
            storage: StorageBackend::Memory,
            database_url: String::new(),
            db_max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
            },
            reset_token_ttl_hours: 24,
            mail: MailConfig {
                from: "no-reply@test".into(),
                reset_url_base: "https://test/reset?token=".into(),
            },
        });
        let store = MemoryStore::new();
        Self::from_parts(
            config,
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(LogMailer::new("no-reply@test")),
        )
    }
}
