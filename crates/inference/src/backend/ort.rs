use super::{InferenceBackend, InferenceOutput};
use crate::{
    config::{DetectorConfig, ExecutionProvider},
    labels::LabelMap,
};
use ndarray::{Array, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::path::Path;

const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";
const METADATA_NAMES_KEY: &str = "names";
const MODEL_TYPE: &str = "yolo-onnx";

pub struct OrtBackend {
    session: Session,
    class_names: Option<LabelMap>,
}

impl OrtBackend {
    /// Load model with specified execution provider
    pub fn load_model_with_provider(
        path: &Path,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?;

        match provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path)?;

        let class_names = read_class_names(&session);

        tracing::info!(
            path = %path.display(),
            embedded_classes = class_names.as_ref().map(LabelMap::len),
            "Model loaded"
        );

        Ok(Self {
            session,
            class_names,
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn load_model(config: &DetectorConfig) -> anyhow::Result<Self> {
        Self::load_model_with_provider(&config.model_path, config.device, config.intra_threads)
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self.session.run(ort::inputs![
            INPUT_NAME => TensorRef::from_array_view(images.view())?
        ])?;

        let predictions = outputs[OUTPUT_NAME].try_extract_array::<f32>()?;

        Ok(InferenceOutput {
            predictions: predictions.into_owned(),
        })
    }

    fn class_names(&self) -> Option<LabelMap> {
        self.class_names.clone()
    }

    fn model_type(&self) -> &str {
        MODEL_TYPE
    }
}

fn read_class_names(session: &Session) -> Option<LabelMap> {
    let raw = match session.metadata().and_then(|meta| Ok(meta.custom(METADATA_NAMES_KEY))) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read model metadata");
            return None;
        }
    };

    match LabelMap::parse_model_metadata(&raw) {
        Ok(labels) => Some(labels),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unparseable class names in model metadata");
            None
        }
    }
}
