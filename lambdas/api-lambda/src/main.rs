use fieldlog_shared::config::BackendConfig;
use fieldlog_shared::Backend;
use lambda_http::{run, service_fn, tracing, Error, Request};
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    // One provider variant is constructed at startup and shared across
    // invocations; the clients are stateless handles with no teardown.
    let config = BackendConfig::from_env()?;
    let backend = Backend::from_config(&config).await?;

    run(service_fn(move |event: Request| {
        let backend = Arc::clone(&backend);
        async move { http_handler::function_handler(event, backend).await }
    }))
    .await
}
