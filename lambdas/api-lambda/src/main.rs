mod http_handler;

use std::sync::Arc;

use lambda_http::{run, service_fn, Error};
use recycleme_shared::{config::AppConfig, tracing_init::init_tracing, AppState};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing("info");

    let config = AppConfig::from_env()?;
    let state = Arc::new(AppState::from_config(config).await?);
    tracing::info!("🚀 RecycleMe API ready");

    run(service_fn(move |event| {
        let state = state.clone();
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
