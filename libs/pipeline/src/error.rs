use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no transform in the forward list matched `{entity_name}`")]
    UnmatchedTransform { entity_name: String },

    #[error("transform `{0}` not found")]
    TransformNotFound(String),
}
