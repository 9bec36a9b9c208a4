//! Change notifications of a [`crate::Manager`].
//!
//! Every transition is published once on a broadcast channel.  The
//! callbacks given in the config are registered listeners on the same
//! events and are invoked at most once per event.

use std::sync::Arc;

use revpop_ws_core::types::{ConnectionState, HandshakeInfo};
use tokio::sync::broadcast;
use tracing::debug;

pub type UrlChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;
/// Invoked with the handshake of every session the manager installs.
pub type ConnectCallback = Arc<dyn Fn(&HandshakeInfo) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    StateChanged(ConnectionState),
    /// A fallback switch completed, the new session is live.
    UrlChanged(String),
    /// The connection was lost and will not be re-established.
    Closed,
}

pub struct Listeners {
    tx: broadcast::Sender<ManagerEvent>,
    url_change: Option<UrlChangeCallback>,
    close: Option<CloseCallback>,
    connect: Option<ConnectCallback>,
}

impl Listeners {
    pub fn new(
        url_change: Option<UrlChangeCallback>,
        close: Option<CloseCallback>,
        connect: Option<ConnectCallback>,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(32);
        Self {
            tx,
            url_change,
            close,
            connect,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: ManagerEvent) {
        // No receiver is not an error.
        if self.tx.send(event.clone()).is_err() {
            debug!("No subscriber for {:?}", event);
        }
    }

    pub fn state_changed(&self, state: ConnectionState) {
        self.publish(ManagerEvent::StateChanged(state));
    }

    pub fn connected(&self, handshake: &HandshakeInfo) {
        if let Some(ref cb) = self.connect {
            cb(handshake);
        }
    }

    pub fn url_changed(&self, url: &str) {
        self.publish(ManagerEvent::UrlChanged(url.to_owned()));
        if let Some(ref cb) = self.url_change {
            cb(url);
        }
    }

    pub fn closed(&self) {
        self.publish(ManagerEvent::Closed);
        if let Some(ref cb) = self.close {
            cb();
        }
    }
}
