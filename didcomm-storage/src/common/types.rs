use rst_common::with_errors::thiserror::{self, Error};

use prople_didcomm_core::engine::types::ProtocolError;

#[derive(Debug, PartialEq, Error)]
pub enum CommonError {
    #[error("valdation error: {0}")]
    ValidationError(String),

    #[error("db error: {0}")]
    DbError(String),

    #[error("config error: {0}")]
    ConfigError(String),
}

impl From<CommonError> for ProtocolError {
    fn from(value: CommonError) -> Self {
        match value {
            CommonError::ValidationError(msg) => ProtocolError::ValidationError(msg),
            CommonError::DbError(msg) => ProtocolError::StorageError(msg),
            CommonError::ConfigError(msg) => ProtocolError::StorageError(msg),
        }
    }
}

pub trait ToValidate {
    fn validate(&self) -> Result<(), CommonError>;
}
