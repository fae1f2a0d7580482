/// Utility modules for error handling, validation and feature scaling
pub mod error;
pub mod scaling;
pub mod validate;

// Re-export commonly used types
pub use error::AnalysisError;
pub use scaling::{FeatureScaler, ScalingMethod};
pub use validate::{normalize_to_unit_sum, validate_cutoff, validate_fraction, validate_nonzero};
