use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;
use url::Url;

use crate::dispatch::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Inline,
    Queue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailBackend {
    Console,
    SendGrid,
    Capture,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Repository
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub run_migrations: bool,

    // Dispatch
    pub redis_url: Option<String>,
    pub dispatch_mode: DispatchMode,
    pub dispatch_queue: String,
    pub dispatch_max_attempts: u32,
    pub dispatch_retry_initial_ms: u64,
    pub dispatch_retry_max_ms: u64,
    pub embedded_worker: bool,
    pub shutdown_grace_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Auth
    pub jwt_secret: String,
    pub access_token_expires_minutes: i64,
    pub refresh_token_expires_days: i64,
    pub password_hash_cost: u32,

    // Email
    pub email_backend: EmailBackend,
    pub sendgrid_key: Option<String>,
    pub sendgrid_from: String,
    pub sendgrid_timeout_seconds: u64,

    // Documents
    pub uploads_dir: String,
    pub upload_handle_ttl_seconds: i64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parse_or = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a non-negative integer", key)),
                None => Ok(default),
            }
        };
        let flag = |key: &str, default: bool| match get(key) {
            Some(raw) => matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
            None => default,
        };

        let env = Environment::from_str(&get("ENV").unwrap_or_else(|| "dev".to_string()));
        let server_addr = get("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        // Repository
        let database_url = get("DATABASE_URL");
        if let Some(raw) = &database_url {
            Url::parse(raw).context("DATABASE_URL is not a valid URL")?;
        }
        let storage_backend = match get("STORAGE_BACKEND").map(|s| s.to_lowercase()) {
            Some(s) if s == "postgres" => StorageBackend::Postgres,
            Some(s) if s == "memory" => StorageBackend::Memory,
            Some(other) => bail!("STORAGE_BACKEND must be 'postgres' or 'memory', got '{}'", other),
            None if database_url.is_some() => StorageBackend::Postgres,
            None => StorageBackend::Memory,
        };
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set");
        }
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10)? as u32;
        let run_migrations = flag("RUN_MIGRATIONS", false);

        // Dispatch
        let redis_url = get("REDIS_URL");
        if let Some(raw) = &redis_url {
            Url::parse(raw).context("REDIS_URL is not a valid URL")?;
        }
        let dispatch_mode = match get("DISPATCH_MODE").map(|s| s.to_lowercase()) {
            Some(s) if s == "inline" => DispatchMode::Inline,
            Some(s) if s == "queue" => DispatchMode::Queue,
            Some(other) => bail!("DISPATCH_MODE must be 'inline' or 'queue', got '{}'", other),
            None if redis_url.is_some() => DispatchMode::Queue,
            None => DispatchMode::Inline,
        };
        if dispatch_mode == DispatchMode::Queue && redis_url.is_none() {
            bail!("REDIS_URL must be set when DISPATCH_MODE=queue");
        }
        let dispatch_queue = get("DISPATCH_QUEUE").unwrap_or_else(|| "rfp:jobs".to_string());
        let dispatch_max_attempts = parse_or("DISPATCH_MAX_ATTEMPTS", 5)?.max(1) as u32;
        let dispatch_retry_initial_ms = parse_or("DISPATCH_RETRY_INITIAL_MS", 500)?;
        let dispatch_retry_max_ms = parse_or("DISPATCH_RETRY_MAX_MS", 30_000)?;
        let embedded_worker = flag("EMBEDDED_WORKER", true);
        let shutdown_grace_seconds = parse_or("SHUTDOWN_GRACE_SECONDS", 10)?;

        // CORS
        let cors_allow_origins = get("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Auth
        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if env.is_prod() => bail!("JWT_SECRET must be set"),
            None => "dev-insecure-secret".to_string(),
        };
        let access_token_expires_minutes = parse_or("ACCESS_TOKEN_EXPIRES_MINUTES", 15)? as i64;
        let refresh_token_expires_days = parse_or("REFRESH_TOKEN_EXPIRES_DAYS", 7)? as i64;
        let password_hash_cost = parse_or("PASSWORD_HASH_COST", bcrypt::DEFAULT_COST as u64)?
            .clamp(4, 31) as u32;

        // Email
        let sendgrid_key = get("SENDGRID_KEY");
        let sendgrid_from =
            get("SENDGRID_FROM").unwrap_or_else(|| "no-reply@rfp.local".to_string());
        let sendgrid_timeout_seconds = parse_or("SENDGRID_TIMEOUT_SECONDS", 10)?.max(1);
        let email_backend = match get("EMAIL_BACKEND").map(|s| s.to_lowercase()) {
            Some(s) if s == "console" => EmailBackend::Console,
            Some(s) if s == "sendgrid" => EmailBackend::SendGrid,
            Some(s) if s == "capture" => EmailBackend::Capture,
            Some(other) => bail!(
                "EMAIL_BACKEND must be 'console', 'sendgrid' or 'capture', got '{}'",
                other
            ),
            None if sendgrid_key.is_some() => EmailBackend::SendGrid,
            None => EmailBackend::Console,
        };
        if email_backend == EmailBackend::SendGrid && sendgrid_key.is_none() {
            bail!("SENDGRID_KEY must be set when EMAIL_BACKEND=sendgrid");
        }

        // Documents
        let uploads_dir = get("UPLOADS_DIR").unwrap_or_else(|| "./uploads".to_string());
        let upload_handle_ttl_seconds = parse_or("UPLOAD_HANDLE_TTL_SECONDS", 900)? as i64;

        Ok(Settings {
            env,
            server_addr,
            storage_backend,
            database_url,
            database_max_connections,
            run_migrations,
            redis_url,
            dispatch_mode,
            dispatch_queue,
            dispatch_max_attempts,
            dispatch_retry_initial_ms,
            dispatch_retry_max_ms,
            embedded_worker,
            shutdown_grace_seconds,
            cors_allow_origins,
            jwt_secret,
            access_token_expires_minutes,
            refresh_token_expires_days,
            password_hash_cost,
            email_backend,
            sendgrid_key,
            sendgrid_from,
            sendgrid_timeout_seconds,
            uploads_dir,
            upload_handle_ttl_seconds,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.dispatch_max_attempts,
            initial_interval: Duration::from_millis(self.dispatch_retry_initial_ms),
            max_interval: Duration::from_millis(self.dispatch_retry_max_ms),
        }
    }

    /// How long shutdown waits for background jobs
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn sendgrid_timeout(&self) -> Duration {
        Duration::from_secs(self.sendgrid_timeout_seconds)
    }
}
