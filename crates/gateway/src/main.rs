use common::TelemetryGuard;
use gateway::{
    config::get_configuration,
    logging::setup_logging,
    server::run_server,
    state::{AppState, ModelHandle},
};

const SERVICE_NAME: &str = "gateway";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;

    let _telemetry = match &config.otel_endpoint {
        Some(endpoint) => Some(TelemetryGuard::init(
            SERVICE_NAME,
            endpoint,
            config.environment,
        )?),
        None => {
            setup_logging(&config);
            None
        }
    };

    config.validate()?;
    tracing::info!(environment = %config.environment, "Starting {}", SERVICE_NAME);

    let detector_config = config.detector.clone();
    let model = match tokio::task::spawn_blocking(move || ModelHandle::load(&detector_config))
        .await?
    {
        Ok(handle) => {
            tracing::info!(
                model_type = handle.model_type(),
                classes = handle.labels().len(),
                "Model loaded"
            );
            Some(handle)
        }
        Err(e) if config.require_model => {
            return Err(e.context("Model is required but failed to load"));
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Failed to load model, serving degraded");
            None
        }
    };

    let state = AppState::new(model, config.jpeg_quality);
    run_server(&config, state).await
}
