use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    #[error("Connection attempt timed out: {0}")]
    ConnectTimeout(String),

    #[error("Connection to {url} failed: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("No reachable endpoint among {0} candidates")]
    NoReachableEndpoint(usize),

    #[error("Api not available: {0}")]
    ApiUnavailable(String),

    #[error("Connection manager is closed")]
    AlreadyClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Api instance is not initialized")]
    NotInitialized,

    #[error("Api instance is bound to {current}, requested {requested}")]
    UrlMismatch { current: String, requested: String },

    #[error("Rpc error: {0}")]
    RpcError(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn connect_failed<U: Into<String>, R: ToString>(url: U, reason: R) -> Self {
        Error::ConnectFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::RpcError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
