use anyhow::Context;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging is set up from the config before the app, so startup errors are logged
    let log_level = secondtry_builder::extract_config()?.log_level;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level).context("invalid log level")?)
        .init();

    let (router, config, on_shutdown) = secondtry_builder::create_app().await?;
    let listener = tokio::net::TcpListener::bind((config.host, config.port))
        .await
        .with_context(|| format!("could not bind to {}:{}", config.host, config.port))?;
    tracing::warn!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    on_shutdown.await;

    Ok(())
}
