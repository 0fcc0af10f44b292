// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for model construction and simulation.

use std::fmt;

/// Result type alias for dynamics operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug)]
pub enum Error {
    /// Construction-time validation failure
    Validation(ValidationError),
    /// Batched solve arguments of different lengths
    ShapeMismatch {
        argument: String,
        expected: usize,
        actual: usize,
    },
    /// Unknown method tag, or a method that cannot run on the given input
    UnsupportedMethod(String),
    /// Solver failure propagated from the stepper
    NumericalFailure(String),
    /// Configuration error
    Config(String),
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serialization(String),
}

impl Error {
    /// Shorthand for a field validation error.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(ValidationError::Field {
            field: field.into(),
            message: message.into(),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::ShapeMismatch {
                argument,
                expected,
                actual,
            } => write!(
                f,
                "Shape mismatch: {} has length {}, expected {}",
                argument, actual, expected
            ),
            Error::UnsupportedMethod(msg) => write!(f, "Unsupported method: {}", msg),
            Error::NumericalFailure(msg) => write!(f, "Numerical failure: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Validation errors raised while constructing models, frames and solvers.
#[derive(Debug)]
pub enum ValidationError {
    /// Field validation failed
    Field { field: String, message: String },
    /// Operators of incompatible shape
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },
    /// Two paired sequences of different length
    CountMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },
    /// Operator expected to be Hermitian
    NotHermitian(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Field { field, message } => {
                write!(f, "Field '{}': {}", field, message)
            }
            ValidationError::DimensionMismatch {
                what,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Dimension mismatch for {}: expected {}, got {}",
                    what, expected, actual
                )
            }
            ValidationError::CountMismatch {
                what,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Count mismatch for {}: expected {}, got {}",
                    what, expected, actual
                )
            }
            ValidationError::NotHermitian(what) => {
                write!(f, "{} must be Hermitian", what)
            }
        }
    }
}

impl std::error::Error for ValidationError {}
