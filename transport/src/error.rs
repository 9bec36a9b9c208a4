use thiserror::Error;

use revpop_ws_core::error::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Login rejected")]
    LoginRejected,

    #[error("Database api unavailable")]
    DatabaseUnavailable,

    #[error("Request timed out")]
    Timeout,

    #[error("Client error: {0}")]
    Client(#[from] jsonrpsee::core::Error),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Map a failure while opening `url` into the public error kinds.
    pub fn into_connect_error(self, url: &str) -> Error {
        match self {
            TransportError::Timeout | TransportError::Client(jsonrpsee::core::Error::RequestTimeout) => {
                Error::ConnectTimeout(url.into())
            }
            e => Error::connect_failed(url, e),
        }
    }
}

impl From<TransportError> for Error {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Timeout => Error::RpcError("Request timed out".into()),
            e => Error::RpcError(e.to_string()),
        }
    }
}
