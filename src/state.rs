use crate::config::Config;
use jsonwebtoken::DecodingKey;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Verification key derived once from `JWT_SECRET`; every request extractor
    /// shares this instead of re-deriving it.
    pub jwt_decoding_key: Arc<DecodingKey>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            jwt_decoding_key: Arc::new(DecodingKey::from_secret(config.jwt_secret.as_bytes())),
        }
    }
}
