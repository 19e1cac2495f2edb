use std::path::PathBuf;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2 cost parameters. Raising them makes every hash slower.
#[derive(Debug, Clone)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub hash: HashConfig,
    pub upload_dir: PathBuf,
    pub upload_max_bytes: usize,
    pub public_base_url: String,
    pub mail: Option<MailConfig>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match std::env::var("STORAGE_BACKEND").as_deref() {
            Ok("memory") => StorageBackend::Memory,
            _ => StorageBackend::Postgres,
        };
        let database_url = match backend {
            StorageBackend::Postgres => {
                std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?
            }
            StorageBackend::Memory => std::env::var("DATABASE_URL").unwrap_or_default(),
        };

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "talalink".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "talalink-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24),
        };

        let defaults = HashConfig::default();
        let hash = HashConfig {
            memory_kib: env_or("ARGON2_MEMORY_KIB", defaults.memory_kib),
            iterations: env_or("ARGON2_ITERATIONS", defaults.iterations),
            parallelism: env_or("ARGON2_PARALLELISM", defaults.parallelism),
        };

        // SMTP is optional; without it verification links are only logged.
        let mail = match (
            std::env::var("SMTP_HOST"),
            std::env::var("SMTP_USERNAME"),
            std::env::var("SMTP_PASSWORD"),
        ) {
            (Ok(host), Ok(username), Ok(password)) => Some(MailConfig {
                port: env_or("SMTP_PORT", 587),
                from: std::env::var("MAIL_FROM")
                    .unwrap_or_else(|_| format!("TalaLink <{}>", username)),
                host,
                username,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            backend,
            database_url,
            jwt,
            hash,
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".into())
                .into(),
            upload_max_bytes: env_or("UPLOAD_MAX_BYTES", 10 * 1024 * 1024),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into())
                .trim_end_matches('/')
                .to_string(),
            mail,
        })
    }
}
