//! Error types for the sync client

use thiserror::Error;

/// Core ARSYNC errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArError {
    // Frame declaration errors
    #[error("Invalid frame declaration: {0}")]
    InvalidFrame(String),

    #[error("Scale ratio denominator is zero")]
    ZeroDenominator,

    // Decode errors
    #[error("Malformed matrix: {rows}x{cols} with {len} values, expected 4x4 with 16")]
    MalformedMatrix { rows: u32, cols: u32, len: usize },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid mesh {name}: {reason}")]
    InvalidMesh { name: String, reason: String },

    #[error("Unknown enum value {value} for {kind}")]
    UnknownEnumValue { kind: &'static str, value: i32 },

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection to {target} failed after {attempts} attempt(s)")]
    ConnectionFailed { target: String, attempts: u32 },

    #[error("No channel available")]
    NoChannel,

    #[error("RPC failed ({code}): {message}")]
    Rpc { code: String, message: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No async runtime available: {0}")]
    NoRuntime(String),
}

/// Result type for ARSYNC operations
pub type ArResult<T> = Result<T, ArError>;
