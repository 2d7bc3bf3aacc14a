use std::sync::Arc;

use engine_health::{
    config::AppConfig,
    model,
    session::SessionStore,
    web::{self, AppState},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();

    // Everything else depends on the model; without it only the error page is served.
    let app = match model::load_model(&config.model_path) {
        Ok(mdl) => {
            let schema = mdl.schema();
            tracing::info!(
                "loaded {} model from {}; schema {} v{} features[{}]: {:?}",
                mdl.kind(),
                config.model_path.display(),
                schema.name,
                schema.version,
                schema.features.len(),
                &schema.features
            );
            web::router(AppState {
                model: mdl,
                sessions: Arc::new(SessionStore::new(config.session_ttl, config.max_sessions)),
                config: Arc::new(config.clone()),
            })
        }
        Err(e) => {
            let message = web::startup_error_message(&e, &config.model_path);
            tracing::error!("{}", message);
            web::unavailable_router(message)
        }
    };

    let addr = config.socket_addr();
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
