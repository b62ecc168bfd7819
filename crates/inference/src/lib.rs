pub mod backend;
pub mod config;
pub mod detector;
pub mod labels;
pub mod overlay;
pub mod processing;

// Re-export commonly used types for convenience
pub use backend::{InferenceBackend, InferenceOutput};
pub use config::{DetectorConfig, ExecutionProvider};
pub use detector::{Detector, ObjectDetector};
pub use labels::LabelMap;
pub use overlay::Overlay;
pub use processing::Detection;
