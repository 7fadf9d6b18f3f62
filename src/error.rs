//! Typed errors for the converter, one variant per error kind in the
//! design's error-handling section. Every public fallible operation returns
//! `Result<_, ConvertError>`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConvertError {
    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("parse error at byte {offset}: {message}")]
    ParseError { offset: usize, message: String },

    #[error("transform error at record {record_index}: {message}")]
    TransformError {
        record_index: usize,
        message: String,
    },

    #[error("emit error: {message}")]
    EmitError { message: String },

    #[error("partial record of {actual_bytes} bytes exceeds the {limit_mb} MB limit")]
    ResourceExhausted {
        limit_mb: usize,
        actual_bytes: usize,
    },

    #[error("operation called after abort()")]
    Aborted,

    #[error("invalid state: {reason}")]
    State { reason: String },
}

impl ConvertError {
    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        ConvertError::ParseError {
            offset,
            message: message.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        ConvertError::ConfigInvalid {
            reason: reason.into(),
        }
    }

    pub fn emit(message: impl Into<String>) -> Self {
        ConvertError::EmitError {
            message: message.into(),
        }
    }

    pub fn transform(record_index: usize, message: impl Into<String>) -> Self {
        ConvertError::TransformError {
            record_index,
            message: message.into(),
        }
    }

    pub fn state(reason: impl Into<String>) -> Self {
        ConvertError::State {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
