pub mod api;
pub mod assembler;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod legislative;
pub mod metrics_defs;
pub mod overrides;
pub mod pipeline;
pub mod types;

#[cfg(test)]
mod testutils;

use crate::api::{ApiError, AppState};
use crate::config::{Config, ValidationError};
use crate::credentials::CredentialStore;
use crate::errors::ResolveError;
use crate::events::EventSink;
use crate::legislative::TheyWorkForYouClient;
use crate::overrides::{HttpOverrideSource, OverrideCache};
use crate::pipeline::ResolutionPipeline;
use crate::types::ResolvedContact;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::io;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("lookup failed: {0}")]
    Resolve(#[from] ResolveError),
}

impl From<ApiError> for ServiceError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::IoError(e) => ServiceError::Io(e),
        }
    }
}

/// Everything a request needs, wired from one `Config`.
struct Components {
    credentials: Arc<CredentialStore>,
    overrides: Arc<OverrideCache>,
    pipeline: Arc<ResolutionPipeline>,
    events: EventSink,
}

impl Components {
    fn build(config: &Config) -> Result<Self, ServiceError> {
        let client = TheyWorkForYouClient::new(&config.legislative_api)?;
        let source = HttpOverrideSource::new(&config.overrides)?;
        let overrides = Arc::new(OverrideCache::new(
            Arc::new(source),
            config.overrides.ttl(),
        ));

        let pipeline = ResolutionPipeline::new(
            Arc::new(client),
            overrides.clone(),
            config.legislative_api.profile_base_url.clone(),
        );

        Ok(Components {
            credentials: Arc::new(CredentialStore::from_config(&config.clients)),
            overrides,
            pipeline: Arc::new(pipeline),
            events: EventSink::new(&config.event_sink)?,
        })
    }

    fn app_state(&self) -> AppState {
        AppState {
            credentials: self.credentials.clone(),
            pipeline: self.pipeline.clone(),
            events: self.events.clone(),
        }
    }
}

/// Serves the lookup API and the admin listener until either one fails.
pub async fn run(config: Config) -> Result<(), ServiceError> {
    config.validate()?;
    let components = Components::build(&config)?;

    // Warm the override cache so the first lookup does not pay for the fetch.
    // `/ready` reports 503 until this attempt has finished.
    let overrides = components.overrides.clone();
    tokio::spawn(async move {
        let snapshot = overrides.get().await;
        tracing::info!(rows = snapshot.len(), "override cache warmed");
    });

    let overrides = components.overrides.clone();
    let admin_task = run_http_service::<_, ServiceError>(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(move || overrides.is_warm()),
    );

    let api_task = async {
        api::serve(&config.listener, components.app_state())
            .await
            .map_err(ServiceError::from)
    };

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}

/// Runs a single lookup outside the HTTP surface. Caller credentials are not
/// checked.
pub async fn resolve_once(config: &Config, postcode: &str) -> Result<ResolvedContact, ServiceError> {
    config.validate()?;
    let components = Components::build(config)?;

    let postcode = postcode.trim();
    if postcode.is_empty() {
        return Err(ResolveError::MissingPostcode.into());
    }

    Ok(components.pipeline.resolve(postcode).await?)
}
