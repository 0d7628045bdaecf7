use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::SessionVerifier;
use crate::cache::UserCache;
use crate::config::Config;
use crate::payments::PaymentProcessor;
use crate::storage::{StorageAdapter, UploadContext};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Verifies identity-provider session tokens. Default: JwksVerifier.
    pub sessions: Arc<dyn SessionVerifier>,
    /// Receives uploaded files. S3 or Cloudinary, per STORAGE_BACKEND.
    pub storage: Arc<dyn StorageAdapter>,
    pub upload_ctx: UploadContext,
    pub payments: Arc<dyn PaymentProcessor>,
    pub cache: UserCache,
    pub config: Config,
}
