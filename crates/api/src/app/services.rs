//! Component wiring for the HTTP process.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use rolegate_events::{AuthProvider, InMemoryEventBus};
use rolegate_infra::{
    AccessService, Backends, CallPolicies, Config, IdentityProvider, IdentityProviderError,
    InMemoryIdentityProvider, LifecycleWorker, TokenSigner, WorkerHandle, Wiring,
};

/// Everything the server runs on.
pub struct AppServices {
    pub service: Arc<AccessService>,
    /// Direct handle on the identity provider, for sign-in and tooling.
    pub identity: Arc<InMemoryIdentityProvider>,
    pub worker: WorkerHandle,
}

pub async fn build_services(config: &Config) -> anyhow::Result<AppServices> {
    let signer = TokenSigner::new(config.token_secret.as_bytes(), config.token_issuer.clone());
    let events = Arc::new(InMemoryEventBus::new());
    let identity = Arc::new(InMemoryIdentityProvider::new(
        signer,
        config.token_ttl_chrono(),
        events,
    ));
    let provider: Arc<dyn IdentityProvider> = identity.clone();

    let backends = match &config.database_url {
        Some(url) => {
            info!("using postgres stores");
            Backends::postgres(url, config.call_timeout, provider)
                .await
                .context("failed to initialise postgres stores")?
        }
        None => {
            info!("DATABASE_URL not set, using in-memory stores");
            Backends::in_memory(provider)
        }
    };

    let policies = CallPolicies {
        request: config.retry_policy(),
        background: config.background_retry_policy(),
        audit_timeout: config.call_timeout,
    };
    let Wiring { service, lifecycle } = Wiring::new(backends, policies);

    // Runs before the worker subscribes, so the bootstrap identity's creation
    // event is never handled concurrently with its elevation.
    if let Some(admin) = &config.bootstrap_elevated {
        let email = format!("{admin}@bootstrap.local");
        match identity.create_identity_with_id(admin.clone(), &email, None, AuthProvider::Password) {
            Ok(()) | Err(IdentityProviderError::AlreadyExists) => {}
            Err(e) => return Err(e).context("failed to create bootstrap identity"),
        }
        let changed = service
            .bootstrap_elevated(admin, &email)
            .await
            .context("failed to elevate bootstrap identity")?;
        info!(identity_id = %admin, changed, "bootstrap identity ready");
    }

    let worker = LifecycleWorker::spawn(&**identity.events(), lifecycle);

    Ok(AppServices {
        service: Arc::new(service),
        identity,
        worker,
    })
}
