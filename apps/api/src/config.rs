use anyhow::{bail, Context, Result};

/// Which storage adapter receives uploaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Cloudinary,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    /// Public base URL of the storage endpoint; objects are served at `{public_url}/{bucket}/{key}`.
    pub public_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub enable_cache: bool,
    pub hanko_api_url: String,
    pub hanko_audience: Option<String>,
    pub storage_backend: StorageBackend,
    pub storage_folder: String,
    pub s3: Option<S3Config>,
    pub cloudinary: Option<CloudinaryConfig>,
    pub stripe_secret_key: String,
    pub checkout_currency: String,
    pub checkout_product_image: Option<String>,
    pub public_base_url: String,
    pub app_env: String,
    pub seed_on_startup: bool,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let storage_backend = match optional_env("STORAGE_BACKEND")
            .unwrap_or_else(|| "cloudinary".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3,
            "cloudinary" => StorageBackend::Cloudinary,
            other => bail!("STORAGE_BACKEND must be 's3' or 'cloudinary', got '{other}'"),
        };

        let s3 = match storage_backend {
            StorageBackend::S3 => Some(S3Config {
                bucket: require_env("S3_BUCKET")?,
                endpoint: require_env("S3_ENDPOINT")?,
                region: optional_env("S3_REGION").unwrap_or_else(|| "eu-west-1".to_string()),
                public_url: require_env("S3_PUBLIC_URL")?,
                access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            StorageBackend::Cloudinary => None,
        };

        let cloudinary = match storage_backend {
            StorageBackend::Cloudinary => Some(CloudinaryConfig {
                cloud_name: require_env("CLOUDINARY_CLOUD_NAME")?,
                api_key: require_env("CLOUDINARY_API_KEY")?,
                api_secret: require_env("CLOUDINARY_API_SECRET")?,
            }),
            StorageBackend::S3 => None,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: optional_env("REDIS_URL")
                .unwrap_or_else(|| "redis://localhost:6379".to_string()),
            enable_cache: flag_env("ENABLE_CACHE"),
            hanko_api_url: require_env("HANKO_API_URL")?,
            hanko_audience: optional_env("HANKO_AUDIENCE"),
            storage_backend,
            storage_folder: optional_env("STORAGE_FOLDER")
                .unwrap_or_else(|| "stashspot".to_string()),
            s3,
            cloudinary,
            stripe_secret_key: require_env("STRIPE_SECRET_KEY")?,
            checkout_currency: optional_env("CHECKOUT_CURRENCY")
                .unwrap_or_else(|| "gbp".to_string()),
            checkout_product_image: optional_env("CHECKOUT_PRODUCT_IMAGE"),
            public_base_url: optional_env("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            app_env: optional_env("APP_ENV").unwrap_or_else(|| "development".to_string()),
            seed_on_startup: flag_env("SEED_ON_STARTUP"),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag_env(key: &str) -> bool {
    optional_env(key).is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}
