use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::{
    auth::{
        jwt::JwtKeys,
        password::Passwords,
        repo::{CredentialStore, InMemoryCredentialStore, PgCredentialStore},
    },
    config::{AppConfig, StorageBackend},
    listings::repo::{InMemoryListingRepository, ListingRepository, PgListingRepository},
    mail::{LogMailer, Mailer, SmtpMailer},
    storage::{LocalStorage, StorageClient},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn CredentialStore>,
    pub listings: Arc<dyn ListingRepository>,
    pub storage: Arc<dyn StorageClient>,
    pub mailer: Arc<dyn Mailer>,
    pub passwords: Passwords,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    /// Builds every component from `config`. Returns the pool too so the
    /// caller can run migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, Option<PgPool>)> {
        let config = Arc::new(config);

        let (users, listings, db): (Arc<dyn CredentialStore>, Arc<dyn ListingRepository>, _) =
            match config.backend {
                StorageBackend::Postgres => {
                    let db = PgPoolOptions::new()
                        .max_connections(10)
                        .connect(&config.database_url)
                        .await
                        .context("connect to database")?;
                    (
                        Arc::new(PgCredentialStore::new(db.clone())) as Arc<dyn CredentialStore>,
                        Arc::new(PgListingRepository::new(db.clone())) as Arc<dyn ListingRepository>,
                        Some(db),
                    )
                }
                StorageBackend::Memory => {
                    warn!("using in-memory storage; data is lost on restart");
                    (
                        Arc::new(InMemoryCredentialStore::default()) as Arc<dyn CredentialStore>,
                        Arc::new(InMemoryListingRepository::default()) as Arc<dyn ListingRepository>,
                        None,
                    )
                }
            };

        let storage = Arc::new(LocalStorage::new(config.upload_dir.clone()).await?)
            as Arc<dyn StorageClient>;

        let mailer: Arc<dyn Mailer> = match &config.mail {
            Some(mail) => {
                info!(host = %mail.host, "smtp mail enabled");
                Arc::new(SmtpMailer::new(mail)?)
            }
            None => {
                warn!("SMTP not configured; verification links will only be logged");
                Arc::new(LogMailer)
            }
        };

        let state = Self {
            users,
            listings,
            storage,
            mailer,
            passwords: Passwords::new(&config.hash)?,
            jwt: Arc::new(JwtKeys::new(&config.jwt)),
            config,
        };
        Ok((state, db))
    }
}

#[cfg(test)]
impl AppState {
    pub fn test_config() -> AppConfig {
        AppConfig {
            backend: StorageBackend::Memory,
            database_url: String::new(),
            jwt: crate::config::JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60 * 24,
            },
            hash: crate::auth::password::cheap_config(),
            upload_dir: "uploads".into(),
            upload_max_bytes: 1024 * 1024,
            public_base_url: "http://localhost:8080".into(),
            mail: None,
        }
    }

    fn fake_from_parts(mailer: Arc<dyn Mailer>, storage: Arc<dyn StorageClient>) -> Self {
        let config = Arc::new(Self::test_config());
        Self {
            users: Arc::new(InMemoryCredentialStore::default()),
            listings: Arc::new(InMemoryListingRepository::default()),
            storage,
            mailer,
            passwords: Passwords::new(&config.hash).expect("test argon2 params"),
            jwt: Arc::new(JwtKeys::new(&config.jwt)),
            config,
        }
    }

    pub fn fake() -> Self {
        Self::fake_with_storage().0
    }

    pub fn fake_with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        Self::fake_from_parts(
            mailer,
            Arc::new(crate::storage::fake::MemoryStorage::default()),
        )
    }

    pub fn fake_with_storage() -> (Self, Arc<crate::storage::fake::MemoryStorage>) {
        let storage = Arc::new(crate::storage::fake::MemoryStorage::default());
        let st = Self::fake_from_parts(
            Arc::new(crate::mail::fake::RecordingMailer::default()),
            storage.clone(),
        );
        (st, storage)
    }
}
