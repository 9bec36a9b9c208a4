//! Resilient access to a node's WebSocket JSON-RPC api.
//!
//! - [`Manager`] picks a working endpoint, falls back in order and
//!   reconnects automatically when the session drops.
//! - [`Prober`] measures endpoint latency.
//! - [`ApiRegistry`] and [`ApiHandle`] expose the named api namespaces.

mod apis;
mod config;
mod listener;
mod manager;
mod prober;

pub use apis::{Api, ApiHandle, ApiRegistry};
pub use config::ManagerConfig;
pub use listener::{CloseCallback, ConnectCallback, ManagerEvent, UrlChangeCallback};
pub use manager::Manager;
pub use prober::Prober;
