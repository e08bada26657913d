use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(&'static str),
    #[error("unknown BACKEND '{0}', expected 'dynamo' or 'postgres'")]
    UnknownBackend(String),
}

/// Provider variant selected at process start via the BACKEND variable.
/// Exactly one variant is constructed; there is no runtime switching.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Dynamo(DynamoConfig),
    Postgres(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct DynamoConfig {
    pub table_name: String,
    pub bucket: String,
    pub client_id: String,
    pub client_secret: String,
    pub user_pool_id: String,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub bucket: String,
    pub storage_endpoint: String,
    pub storage_public_url: String,
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var("BACKEND").as_deref() {
            Ok("postgres") => Ok(Self::Postgres(PostgresConfig {
                database_url: required("DATABASE_URL")?,
                bucket: defaulted("REPORTS_BUCKET", "reports"),
                storage_endpoint: required("STORAGE_ENDPOINT")?,
                storage_public_url: required("STORAGE_PUBLIC_URL")?,
            })),
            Ok("dynamo") | Err(_) => Ok(Self::Dynamo(DynamoConfig {
                table_name: defaulted("TABLE_NAME", "fieldlog"),
                bucket: defaulted("REPORTS_BUCKET", "fieldlog-reports"),
                client_id: required("COGNITO_CLIENT_ID")?,
                client_secret: required("COGNITO_CLIENT_SECRET")?,
                user_pool_id: required("COGNITO_USER_POOL_ID")?,
            })),
            Ok(other) => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn defaulted(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}
