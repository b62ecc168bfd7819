use crate::{
    config::GatewayConfig,
    error::GatewayError,
    pipeline::{PredictionResponse, run_prediction},
    state::AppState,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::HeaderValue,
    routing::{get, post},
};
use inference::LabelMap;
use serde::Serialize;
use std::time::Instant;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

const UPLOAD_FIELD: &str = "file";
const ENDPOINTS: [&str; 4] = ["/", "/health", "/model-info", "/predict"];

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub status: &'static str,
    pub model_loaded: bool,
    pub endpoints: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub classes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_type: String,
    pub classes: LabelMap,
    pub num_classes: usize,
}

pub fn router(state: AppState, config: &GatewayConfig) -> anyhow::Result<Router> {
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/model-info", get(model_info))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

/// Allow-list CORS with credentials, or fully permissive when `*` is listed.
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.iter().any(|origin| origin == "*") {
        return Ok(CorsLayer::permissive());
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| anyhow::anyhow!("Invalid CORS origin {:?}: {}", origin, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Object Detection API",
        status: "running",
        model_loaded: state.model_loaded(),
        endpoints: ENDPOINTS.to_vec(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, classes) = match &state.model {
        Some(model) => ("healthy", model.labels().names()),
        None => ("degraded", Vec::new()),
    };

    Json(HealthResponse {
        status,
        model_loaded: state.model_loaded(),
        classes,
    })
}

async fn model_info(
    State(state): State<AppState>,
) -> Result<Json<ModelInfoResponse>, GatewayError> {
    let model = state.model()?;

    Ok(Json(ModelInfoResponse {
        model_type: model.model_type().to_string(),
        classes: model.labels().clone(),
        num_classes: model.labels().len(),
    }))
}

async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, GatewayError> {
    let start = Instant::now();

    match handle_predict(&state, multipart).await {
        Ok(response) => {
            state
                .metrics
                .record_success(start.elapsed(), response.num_detections);
            Ok(Json(response))
        }
        Err(err) => {
            state.metrics.record_failure(start.elapsed(), &err);
            Err(err)
        }
    }
}

async fn handle_predict(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictionResponse, GatewayError> {
    let model = state.model()?;
    let bytes = read_image_field(multipart?).await?;

    let jpeg_quality = state.jpeg_quality;
    tokio::task::spawn_blocking(move || run_prediction(&model, &bytes, jpeg_quality))
        .await
        .map_err(|e| GatewayError::Internal(format!("Prediction task failed: {}", e)))?
}

/// Bytes of the `file` field. The content type is checked before the body
/// is buffered.
async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>, GatewayError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(GatewayError::invalid_input(format!(
                "File must be an image, got content type {:?}",
                content_type
            )));
        }

        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(GatewayError::invalid_input("Uploaded file is empty"));
        }

        tracing::debug!(content_type, size = bytes.len(), "Received upload");
        return Ok(bytes.to_vec());
    }

    Err(GatewayError::invalid_input(format!(
        "Missing multipart field {:?}",
        UPLOAD_FIELD
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_origin_is_permissive() {
        assert!(cors_layer(&["*".to_string()]).is_ok());
    }

    #[test]
    fn test_allow_list_origins_parse() {
        let origins = vec![
            "http://localhost:5173".to_string(),
            "http://127.0.0.1:5173".to_string(),
        ];
        assert!(cors_layer(&origins).is_ok());
    }

    #[test]
    fn test_invalid_origin_is_rejected() {
        assert!(cors_layer(&["http://bad\norigin".to_string()]).is_err());
    }
}
