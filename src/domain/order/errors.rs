// ============================================================================
// Order Intake Validation Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: latitude {value} out of range [-90, 90]")]
    LatitudeOutOfRange { field: &'static str, value: f64 },

    #[error("{field}: longitude {value} out of range [-180, 180]")]
    LongitudeOutOfRange { field: &'static str, value: f64 },

    #[error("package weight must be positive, got {0}")]
    NonPositiveWeight(f64),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
