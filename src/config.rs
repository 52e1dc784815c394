use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

/// Default upper bound for a single upload (100 MiB), mirrored in the presigned POST policy.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub debug: bool,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `None` selects the in-memory repository (debug only).
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Clone, Deserialize)]
pub struct StorageConfig {
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_endpoint: Option<String>,
}

impl StorageConfig {
    /// Real S3 is only used when a full credential pair and a bucket are present.
    pub fn has_credentials(&self) -> bool {
        !self.s3_bucket.is_empty()
            && self.s3_access_key_id.as_deref().is_some_and(|k| !k.is_empty())
            && self.s3_secret_access_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_access_key_id", &self.s3_access_key_id.as_ref().map(|_| "***"))
            .field("s3_secret_access_key", &self.s3_secret_access_key.as_ref().map(|_| "***"))
            .field("s3_endpoint", &self.s3_endpoint)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
}

impl AuthConfig {
    /// Token settings alone, shared by the server and the CLI's `dev-token`.
    /// Outside debug mode the secret must be configured.
    pub fn from_env(debug: bool) -> Result<Self> {
        let jwt_secret = match env::var("JWT_SECRET_KEY") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if debug => "dev-only-insecure-jwt-secret".to_string(),
            _ => anyhow::bail!("JWT_SECRET_KEY must be set"),
        };

        Ok(Self {
            jwt_secret,
            access_token_expire_minutes: env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("ACCESS_TOKEN_EXPIRE_MINUTES must be a number of minutes")?,
        })
    }
}

/// `DEBUG=true|false`, default false
pub fn debug_from_env() -> Result<bool> {
    env::var("DEBUG")
        .unwrap_or_else(|_| "false".to_string())
        .parse()
        .context("DEBUG must be true or false")
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"***")
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_upload_bytes: u64,
    pub upload_url_expires_secs: u32,
    pub download_url_expires_secs: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_url_expires_secs: 3600,
            download_url_expires_secs: 3600,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let debug = debug_from_env()?;
        let auth = AuthConfig::from_env(debug)?;

        let database_url = env::var("DATABASE_URL").ok().filter(|u| !u.is_empty());
        if database_url.is_none() && !debug {
            anyhow::bail!("DATABASE_URL must be set (the in-memory store is only available with DEBUG=true)");
        }

        Ok(Self {
            debug,
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .context("PORT must be a valid port number")?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| {
                        "http://localhost:3000,http://localhost:5173,http://127.0.0.1:3000,http://127.0.0.1:5173"
                            .to_string()
                    })
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("DB_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
            },
            storage: StorageConfig {
                s3_bucket: env::var("S3_BUCKET_NAME").unwrap_or_default(),
                s3_region: env::var("S3_REGION").unwrap_or_else(|_| "ap-northeast-2".to_string()),
                s3_access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
                s3_secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
                s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|e| !e.is_empty()),
            },
            auth,
            upload: UploadConfig {
                max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                    .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
                    .parse()
                    .context("MAX_UPLOAD_BYTES must be a byte count")?,
                upload_url_expires_secs: env::var("UPLOAD_URL_EXPIRES_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()?,
                download_url_expires_secs: env::var("DOWNLOAD_URL_EXPIRES_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()?,
            },
        })
    }

    /// Configuration for tests and local tooling: debug mode, in-memory store, mock storage.
    pub fn for_development(jwt_secret: &str) -> Self {
        Self {
            debug: true,
            server: ServerConfig {
                port: 8000,
                host: "127.0.0.1".to_string(),
                cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 1,
                min_connections: 1,
            },
            storage: StorageConfig {
                s3_bucket: "library-dev".to_string(),
                s3_region: "ap-northeast-2".to_string(),
                s3_access_key_id: None,
                s3_secret_access_key: None,
                s3_endpoint: None,
            },
            auth: AuthConfig {
                jwt_secret: jwt_secret.to_string(),
                access_token_expire_minutes: 30,
            },
            upload: UploadConfig::default(),
        }
    }
}
