use thiserror::Error;

pub use color_eyre::eyre::eyre;

use crate::protocol::{packet::ErrPayloadBytes, response::ErrPayload};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Server Error: {0}")]
    ServerError(#[from] ErrPayload),

    #[error("Access denied: {0}")]
    AuthError(ErrPayload),

    #[error("Could not connect to {host}:{port} after {attempts} attempts")]
    ConnectError {
        host: String,
        port: u16,
        attempts: u32,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Bad config error: {0}")]
    BadConfigError(String),

    #[error("Invalid packet")]
    InvalidPacket,

    #[error("Unexpected end of packet")]
    UnexpectedEof,

    #[error("Packet of {length} bytes exceeds the receive capacity of {capacity} bytes")]
    PacketTooLarge { length: usize, capacity: usize },

    #[error("Query packet of {length} bytes exceeds the buffer capacity of {capacity} bytes")]
    QueryTooLarge { length: usize, capacity: usize },

    #[error("Row has {actual} values but the result set has {expected} columns")]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[error("Not connected")]
    NotConnected,

    #[error("Unsupported authentication plugin: {0}")]
    UnsupportedAuthPlugin(String),

    #[error("Library bug: {0}")]
    LibraryBug(color_eyre::Report),
}

impl Error {
    /// Whether the byte stream is no longer usable after this error.
    ///
    /// Everything else leaves the session ready for the next command.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::IoError(_) | Error::ConnectError { .. })
    }

    /// The server-side error, if any.
    pub fn server_error(&self) -> Option<&ErrPayload> {
        match self {
            Error::ServerError(err) | Error::AuthError(err) => Some(err),
            _ => None,
        }
    }
}

impl<'a> From<ErrPayloadBytes<'a>> for Error {
    fn from(value: ErrPayloadBytes) -> Self {
        match ErrPayload::try_from(value) {
            Ok(err_payload) => Error::ServerError(err_payload),
            Err(err) => err,
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

pub type Result<T> = std::result::Result<T, Error>;
