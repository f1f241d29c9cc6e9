use thiserror::Error;

/// Errors raised while constructing or converting entities.
///
/// Accumulated into a `Vec<EntityError>` by [`crate::factory::Factory::create`];
/// a non-empty vector means construction failed and no entity is produced.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EntityError {
    #[error("missing required property `{property}` for entity `{entity}`")]
    MissingRequiredProperty { entity: String, property: String },

    #[error("unexpected property `{property}` for entity `{entity}`")]
    UnexpectedProperty { entity: String, property: String },

    #[error("cannot convert property `{property}` from {from} to {to}")]
    ConversionFailed {
        property: String,
        from: String,
        to: String,
    },

    #[error("value for `{property}` not in controlled vocabulary")]
    NotInVocabulary { property: String },

    #[error("cardinality violation for list `{property}`: expected {min}..{max}, got {actual}")]
    CardinalityViolation {
        property: String,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("structural violation: {0}")]
    Structural(String),

    #[error("no transform in the forward list matched entity `{entity_name}`")]
    UnmatchedTransform { entity_name: String },
}
