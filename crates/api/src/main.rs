use anyhow::Context;

use rolegate_api::app::{build_app, services::build_services};
use rolegate_infra::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rolegate_observability::init();

    let config = Config::from_env()?;
    let services = build_services(&config).await?;

    if config.uses_dev_secret() {
        if let Some(admin) = &config.bootstrap_elevated {
            let issued = services
                .identity
                .sign_in(admin)
                .context("failed to sign in bootstrap identity")?;
            tracing::warn!(identity_id = %admin, token = %issued.token, "development token for bootstrap identity");
        }
    }

    let app = build_app(services.service.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    let stats = services.worker.shutdown().await;
    tracing::info!(
        handled = stats.handled,
        failed = stats.failed,
        redelivered = stats.redelivered,
        "lifecycle worker stopped"
    );
    Ok(())
}
