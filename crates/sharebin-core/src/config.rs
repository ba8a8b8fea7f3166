//! Configuration module
//!
//! Environment-driven configuration for the share host: server and database
//! settings, upload directory layout, per-tier byte ceilings, identity
//! settings, and stale-part sweep tuning.

use std::env;

use crate::models::LimitTier;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const JWT_EXPIRY_HOURS: i64 = 24;

/// Base configuration shared by server-facing binaries
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub environment: String,
}

/// Ingestion service configuration
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub base: BaseConfig,
    pub database_url: String,
    /// Upload root; permanent files live directly under it, in-flight parts
    /// under its `tmp/` subdirectory.
    pub upload_dir: String,
    // Per-tier byte ceilings
    pub anon_max_file_bytes: u64,
    pub anon_quota_bytes: u64,
    pub account_max_file_bytes: u64,
    pub account_quota_bytes: u64,
    /// Number of proxies in front of the service whose X-Forwarded-For
    /// entries are trusted. 0 means forwarded headers are ignored.
    pub trusted_proxy_count: usize,
    /// Maximum (and default) expiry horizon for anonymous shares, in days.
    pub anon_expiry_max_days: i64,
    /// Age after which an abandoned `.part` file may be swept, in seconds.
    pub part_ttl_secs: u64,
    /// Interval between sweep runs, in seconds. 0 disables the sweep task.
    pub part_sweep_interval_secs: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<IngestConfig>);

impl Config {
    fn inner(&self) -> &IngestConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = IngestConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn jwt_secret(&self) -> &str {
        &self.inner().base.jwt_secret
    }

    pub fn jwt_expiry_hours(&self) -> i64 {
        self.inner().base.jwt_expiry_hours
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn upload_dir(&self) -> &str {
        &self.inner().upload_dir
    }

    pub fn trusted_proxy_count(&self) -> usize {
        self.inner().trusted_proxy_count
    }

    pub fn anon_expiry_max_days(&self) -> i64 {
        self.inner().anon_expiry_max_days
    }

    pub fn part_ttl_secs(&self) -> u64 {
        self.inner().part_ttl_secs
    }

    pub fn part_sweep_interval_secs(&self) -> u64 {
        self.inner().part_sweep_interval_secs
    }

    /// Byte ceilings for the anonymous or account tier.
    pub fn limit_tier(&self, authenticated: bool) -> LimitTier {
        let cfg = self.inner();
        if authenticated {
            LimitTier {
                max_file_bytes: cfg.account_max_file_bytes,
                quota_bytes: cfg.account_quota_bytes,
            }
        } else {
            LimitTier {
                max_file_bytes: cfg.anon_max_file_bytes,
                quota_bytes: cfg.anon_quota_bytes,
            }
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const ANON_MAX_FILE_SIZE_MB: u64 = 50;
        const ANON_QUOTA_MB: u64 = 500;
        const ACCOUNT_MAX_FILE_SIZE_MB: u64 = 2048;
        const ACCOUNT_QUOTA_MB: u64 = 20480;
        const TRUSTED_PROXY_COUNT: usize = 0;
        const ANON_EXPIRY_MAX_DAYS: i64 = 7;
        const PART_TTL_SECS: u64 = 86400;
        const PART_SWEEP_INTERVAL_SECS: u64 = 3600;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set for authentication"))?,
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| JWT_EXPIRY_HOURS.to_string())
                .parse()
                .unwrap_or(JWT_EXPIRY_HOURS),
            environment,
        };

        let anon_max_file_mb = env::var("ANON_MAX_FILE_SIZE_MB")
            .unwrap_or_else(|_| ANON_MAX_FILE_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(ANON_MAX_FILE_SIZE_MB);
        let anon_quota_mb = env::var("ANON_QUOTA_MB")
            .unwrap_or_else(|_| ANON_QUOTA_MB.to_string())
            .parse::<u64>()
            .unwrap_or(ANON_QUOTA_MB);
        let account_max_file_mb = env::var("ACCOUNT_MAX_FILE_SIZE_MB")
            .unwrap_or_else(|_| ACCOUNT_MAX_FILE_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(ACCOUNT_MAX_FILE_SIZE_MB);
        let account_quota_mb = env::var("ACCOUNT_QUOTA_MB")
            .unwrap_or_else(|_| ACCOUNT_QUOTA_MB.to_string())
            .parse::<u64>()
            .unwrap_or(ACCOUNT_QUOTA_MB);

        let config = IngestConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            anon_max_file_bytes: anon_max_file_mb * 1024 * 1024,
            anon_quota_bytes: anon_quota_mb * 1024 * 1024,
            account_max_file_bytes: account_max_file_mb * 1024 * 1024,
            account_quota_bytes: account_quota_mb * 1024 * 1024,
            trusted_proxy_count: env::var("TRUSTED_PROXY_COUNT")
                .unwrap_or_else(|_| TRUSTED_PROXY_COUNT.to_string())
                .parse()
                .unwrap_or(TRUSTED_PROXY_COUNT),
            anon_expiry_max_days: env::var("ANON_EXPIRY_MAX_DAYS")
                .unwrap_or_else(|_| ANON_EXPIRY_MAX_DAYS.to_string())
                .parse()
                .unwrap_or(ANON_EXPIRY_MAX_DAYS),
            part_ttl_secs: env::var("PART_TTL_SECS")
                .unwrap_or_else(|_| PART_TTL_SECS.to_string())
                .parse()
                .unwrap_or(PART_TTL_SECS),
            part_sweep_interval_secs: env::var("PART_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| PART_SWEEP_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(PART_SWEEP_INTERVAL_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.upload_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("UPLOAD_DIR cannot be empty"));
        }
        let is_production = self.base.environment.to_lowercase() == "production"
            || self.base.environment.to_lowercase() == "prod";
        if is_production && self.base.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters in production"
            ));
        }
        if self.anon_expiry_max_days <= 0 {
            return Err(anyhow::anyhow!("ANON_EXPIRY_MAX_DAYS must be positive"));
        }
        Ok(())
    }
}
