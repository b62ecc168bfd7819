pub mod post;
pub mod pre;

pub use post::{Detection, PostProcessor, TransformParams};
pub use pre::PreProcessor;
