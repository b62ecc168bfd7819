pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod routes;
pub mod server;
pub mod state;

pub use crate::config::{GatewayConfig, get_configuration};
pub use crate::error::GatewayError;
pub use crate::pipeline::{DetectionRecord, PredictionResponse, run_prediction};
pub use crate::routes::router;
pub use crate::state::{AppState, ModelHandle};
