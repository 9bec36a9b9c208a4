//! This crate contains the basics shared by every part of the client
//! - Error type
//! - Endpoint, candidate set and latency report types
//! - Session and connector interfaces
//! - Known network table

pub mod chain_config;
pub mod error;
pub mod session;
pub mod types;

pub use crate::chain_config::{ChainConfig, NetworkInfo};
pub use crate::error::{Error, Result};
pub use crate::session::{ConnectorT, OpenParams, SessionT};
pub use crate::types::{
    ApiNamespace, CandidateSet, ConnectionState, Endpoint, HandshakeInfo, LatencyReport,
    OptionalApis, ProbeResult,
};
