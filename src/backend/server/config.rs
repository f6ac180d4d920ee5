//! Server configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults for local development. The database is optional: without
//! `DATABASE_URL` the gateway runs on in-memory stores, which is enough for
//! local work and tests but loses everything on restart.

use std::time::Duration;

use sqlx::PgPool;

/// Runtime configuration of the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind, e.g. `0.0.0.0`.
    pub bind_addr: String,
    /// Port to listen on.
    pub port: u16,
    /// PostgreSQL connection string; `None` means in-memory stores.
    pub database_url: Option<String>,
    /// Shared secret the identity issuer signs session tokens with.
    pub jwt_secret: String,
    /// How long a fresh connection may take to send its `connect` frame.
    pub auth_deadline: Duration,
    /// Upper bound on any single external-store call.
    pub store_timeout: Duration,
    /// How long a sender may self-delete a group message.
    pub delete_grace: Duration,
}

impl GatewayConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let port = std::env::var("GATEWAY_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(4000);

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using a development-only default");
            "dev-secret-change-in-production".to_string()
        });

        Self {
            bind_addr: std::env::var("GATEWAY_BIND").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            database_url: std::env::var("DATABASE_URL").ok(),
            jwt_secret,
            auth_deadline: env_duration_secs("GATEWAY_AUTH_DEADLINE_SECS", 10),
            store_timeout: env_duration_secs("GATEWAY_STORE_TIMEOUT_SECS", 5),
            delete_grace: env_duration_secs("GATEWAY_DELETE_GRACE_SECS", 300),
        }
    }
}

fn env_duration_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

/// Connect to the database and run migrations.
///
/// Returns `None` when `DATABASE_URL` is unset or the connection fails;
/// errors are logged but do not prevent startup, the server falls back to
/// in-memory stores.
pub async fn load_database(config: &GatewayConfig) -> Option<PgPool> {
    let database_url = match &config.database_url {
        Some(url) => url,
        None => {
            tracing::warn!("DATABASE_URL not set, falling back to in-memory stores");
            return None;
        }
    };

    let pool = match PgPool::connect(database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("failed to create database connection pool: {e:?}");
            tracing::warn!("falling back to in-memory stores");
            return None;
        }
    };

    tracing::info!("database connection pool created");

    match sqlx::migrate!().run(&pool).await {
        Ok(_) => tracing::info!("database migrations completed"),
        Err(e) => {
            // Migrations may already have been applied by the platform.
            tracing::error!("failed to run database migrations: {e:?}");
            tracing::warn!("continuing; the schema might not be up to date");
        }
    }

    Some(pool)
}
