use common::Environment;
use inference::DetectorConfig;
use serde::Deserialize;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. A single `*` allows any origin without credentials.
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub jpeg_quality: u8,
    /// Abort startup when the model cannot be loaded instead of serving
    /// in degraded mode.
    pub require_model: bool,
    pub otel_endpoint: Option<String>,
    pub detector: DetectorConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            jpeg_quality: 90,
            require_model: false,
            otel_endpoint: None,
            detector: DetectorConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            anyhow::bail!("jpeg_quality must be within 1..=100, got {}", self.jpeg_quality);
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be greater than 0");
        }
        self.detector.validate()
    }
}

/// Load configuration from `GATEWAY_*` environment variables.
///
/// Nested detector settings use a double underscore, e.g.
/// `GATEWAY_DETECTOR__MODEL_PATH`.
pub fn get_configuration() -> Result<GatewayConfig, config::ConfigError> {
    let config = config::Config::builder()
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cors_origins")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize::<GatewayConfig>()
}
