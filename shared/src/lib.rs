pub mod config;
pub mod dynamo;
pub mod error;
pub mod postgres;
pub mod provider;
pub mod session;
pub mod types;

use std::sync::Arc;

use crate::config::BackendConfig;
use crate::dynamo::{CognitoIdentity, DynamoReports, S3BlobStore};
use crate::error::DataError;
use crate::postgres::{BucketBlobStore, PostgresIdentity, PostgresReports};
use crate::provider::{BlobUploader, IdentityResolver, ReportRepository};
use crate::session::SessionStore;

/// Shared application state: one provider variant behind the capability
/// traits, plus the session store fed by its auth events.
pub struct Backend {
    pub identity: Arc<dyn IdentityResolver>,
    pub reports: Arc<dyn ReportRepository>,
    pub storage: Arc<dyn BlobUploader>,
    pub session: SessionStore,
}

impl Backend {
    /// Construct the variant selected by configuration. Clients are built
    /// once here and live for the whole process.
    pub async fn from_config(config: &BackendConfig) -> Result<Arc<Self>, DataError> {
        match config {
            BackendConfig::Dynamo(cfg) => {
                let aws_config = aws_config::load_from_env().await;
                let identity: Arc<dyn IdentityResolver> =
                    Arc::new(CognitoIdentity::new(&aws_config, cfg));
                let storage: Arc<dyn BlobUploader> =
                    Arc::new(S3BlobStore::new(&aws_config, &cfg.bucket));
                let session = SessionStore::spawn(identity.clone());
                let reports: Arc<dyn ReportRepository> = Arc::new(DynamoReports::new(
                    &aws_config,
                    cfg,
                    storage.clone(),
                    session.clone(),
                ));
                Ok(Arc::new(Self {
                    identity,
                    reports,
                    storage,
                    session,
                }))
            }
            BackendConfig::Postgres(cfg) => {
                let pool = postgres::connect(&cfg.database_url).await?;
                let aws_config = aws_config::load_from_env().await;
                let identity: Arc<dyn IdentityResolver> =
                    Arc::new(PostgresIdentity::new(pool.clone()));
                let storage: Arc<dyn BlobUploader> =
                    Arc::new(BucketBlobStore::new(&aws_config, cfg));
                let session = SessionStore::spawn(identity.clone());
                let reports: Arc<dyn ReportRepository> =
                    Arc::new(PostgresReports::new(pool, storage.clone(), session.clone()));
                Ok(Arc::new(Self {
                    identity,
                    reports,
                    storage,
                    session,
                }))
            }
        }
    }
}
