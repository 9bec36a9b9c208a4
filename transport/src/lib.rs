//! Node sessions over WebSocket JSON-RPC.

pub mod error;
pub mod ws;

pub use error::{TransportError, TransportResult};
pub use ws::{WsConnector, WsSession};
