//! Error types for the esptool backend

use fleetflash_core::TransportError;
use thiserror::Error;

/// Backend-specific errors
#[derive(Debug, Error)]
pub enum EsptoolError {
    /// The flashing tool could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that was executed
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A temporary file for staging data could not be used
    #[error("temporary file error: {0}")]
    TempFile(#[source] std::io::Error),

    /// Serial port error
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),
}

impl From<EsptoolError> for TransportError {
    fn from(e: EsptoolError) -> Self {
        match e {
            EsptoolError::SerialError(e) => TransportError::Disconnected(e.to_string()),
            other => TransportError::Io(other.to_string()),
        }
    }
}
