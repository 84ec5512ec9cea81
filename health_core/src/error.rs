//! Error types for the health_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Rejection reported by the native health service.
///
/// These are surfaced to callers exactly as the bridge reported them.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Read or write access for the requested type was not granted
    #[error("authorization denied: {0}")]
    PermissionDenied(String),

    /// Health data is not available on this device
    #[error("health data unavailable: {0}")]
    Unavailable(String),

    /// Any other native failure, with the platform's code and message
    #[error("native error {code}: {message}")]
    Rejected { code: i64, message: String },
}

/// Core error type for health_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The native bridge rejected the call
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Identifier string that the registry does not know
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    /// Wire date string that is not valid ISO8601
    #[error("Invalid date '{value}': {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Interval whose end precedes its start
    #[error("Invalid interval: end {end} is before start {start}")]
    InvalidInterval { start: String, end: String },

    /// Explicit unit outside the identifier's unit family (strict mode)
    #[error("Unit '{unit}' is not valid for {identifier}")]
    UnitMismatch { identifier: String, unit: String },

    /// Structured metadata that does not belong to the identifier
    #[error("Metadata for {identifier} must be of shape {expected}")]
    MetadataMismatch { identifier: String, expected: String },

    /// Correlation constituent not allowed for the correlation type (strict mode)
    #[error("{constituent} cannot be part of a {correlation} correlation")]
    InvalidConstituent {
        correlation: String,
        constituent: String,
    },

    /// The service returned no preferred unit for the identifier
    #[error("No preferred unit reported for {0}")]
    MissingPreferredUnit(String),

    /// Raw value that cannot be decoded into its typed form
    #[error("Unexpected value for {field}: {value}")]
    UnexpectedValue { field: String, value: String },

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error came from the native side rather than local checks
    pub fn is_bridge(&self) -> bool {
        matches!(self, Error::Bridge(_))
    }
}
