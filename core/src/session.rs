//! The interfaces to a node.
//!
//! A [`ConnectorT`] opens sessions; a [`SessionT`] is one physical
//! connection to one endpoint, already past its handshake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{HandshakeInfo, OptionalApis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenParams {
    pub timeout: Duration,
    pub optional_apis: OptionalApis,
}

impl OpenParams {
    /// Parameters for a handshake-only connection.
    pub fn probe(timeout: Duration) -> Self {
        Self {
            timeout,
            optional_apis: OptionalApis::default(),
        }
    }
}

#[async_trait]
pub trait SessionT: Send + Sync {
    fn url(&self) -> &str;

    fn handshake(&self) -> &HandshakeInfo;

    fn is_connected(&self) -> bool;

    /// Call `method` in `namespace`.
    async fn call(&self, namespace: &str, method: &str, params: Vec<Value>) -> Result<Value>;

    /// Close the connection.  Closing twice is a no-op.
    async fn close(&self);

    /// Resolve once the connection is gone, whether closed locally or
    /// dropped by the remote side.
    async fn closed(&self);
}

#[async_trait]
pub trait ConnectorT: Send + Sync {
    /// Open a session to `url` and complete the handshake.  The
    /// caller enforces `params.timeout` as well; implementations should
    /// release any half-open resource when the returned future is dropped.
    async fn open(&self, url: &str, params: OpenParams) -> Result<Arc<dyn SessionT>>;
}
