use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use revpop_ws_core::{
    chain_config::lookup_by_chain_id,
    error::{Error, Result},
    session::{ConnectorT, OpenParams, SessionT},
    types::{ApiNamespace, HandshakeInfo},
};

use crate::constants::REVPOP_CHAIN_ID;

/// How a scripted node answers an open attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBehavior {
    /// Completes the handshake after the given delay.
    Reachable(Duration),
    /// Refuses the connection after the given delay.
    Unreachable(Duration),
}

struct DummyNode {
    behavior: NodeBehavior,
    chain_id: String,
    supports_orders: bool,
    sessions: Vec<Arc<DummySession>>,
}

/// An in-memory connector over a set of scripted nodes.  Unknown URLs
/// are refused.
#[derive(Default)]
pub struct DummyConnector {
    nodes: Mutex<HashMap<String, DummyNode>>,
    attempts: Mutex<Vec<String>>,
}

impl DummyConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_node(&self, url: &str, behavior: NodeBehavior) -> &Self {
        self.nodes.lock().unwrap().insert(
            url.to_owned(),
            DummyNode {
                behavior,
                chain_id: REVPOP_CHAIN_ID.into(),
                supports_orders: true,
                sessions: vec![],
            },
        );
        self
    }

    pub fn add_reachable(&self, url: &str) -> &Self {
        self.add_node(url, NodeBehavior::Reachable(Duration::from_millis(5)))
    }

    pub fn add_unreachable(&self, url: &str) -> &Self {
        self.add_node(url, NodeBehavior::Unreachable(Duration::from_millis(5)))
    }

    pub fn add_slow(&self, url: &str, latency: Duration) -> &Self {
        self.add_node(url, NodeBehavior::Reachable(latency))
    }

    pub fn set_behavior(&self, url: &str, behavior: NodeBehavior) {
        if let Some(node) = self.nodes.lock().unwrap().get_mut(url) {
            node.behavior = behavior;
        }
    }

    pub fn set_chain_id(&self, url: &str, chain_id: &str) {
        if let Some(node) = self.nodes.lock().unwrap().get_mut(url) {
            node.chain_id = chain_id.to_owned();
        }
    }

    pub fn disable_orders(&self, url: &str) {
        if let Some(node) = self.nodes.lock().unwrap().get_mut(url) {
            node.supports_orders = false;
        }
    }

    /// Drop every live session to `url` from the remote side and make
    /// the node refuse new connections.
    pub fn kill(&self, url: &str) {
        let sessions = {
            let mut nodes = self.nodes.lock().unwrap();
            match nodes.get_mut(url) {
                Some(node) => {
                    node.behavior = NodeBehavior::Unreachable(Duration::from_millis(5));
                    std::mem::take(&mut node.sessions)
                }
                None => vec![],
            }
        };
        for s in sessions {
            s.terminate();
        }
    }

    /// Drop every live session to `url` but keep the node reachable.
    pub fn drop_sessions(&self, url: &str) {
        let sessions = match self.nodes.lock().unwrap().get_mut(url) {
            Some(node) => std::mem::take(&mut node.sessions),
            None => vec![],
        };
        for s in sessions {
            s.terminate();
        }
    }

    /// URLs of all open attempts, in the order they started.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn clear_attempts(&self) {
        self.attempts.lock().unwrap().clear();
    }

    /// Number of sessions handed out and not yet closed.
    pub fn live_sessions(&self) -> usize {
        self.nodes
            .lock()
            .unwrap()
            .values()
            .flat_map(|n| n.sessions.iter())
            .filter(|s| s.is_connected())
            .count()
    }
}

#[async_trait]
impl ConnectorT for DummyConnector {
    async fn open(&self, url: &str, params: OpenParams) -> Result<Arc<dyn SessionT>> {
        self.attempts.lock().unwrap().push(url.to_owned());
        let node = self
            .nodes
            .lock()
            .unwrap()
            .get(url)
            .map(|n| (n.behavior, n.chain_id.clone(), n.supports_orders));
        let Some((behavior, chain_id, supports_orders)) = node else {
            return Err(Error::connect_failed(url, "unknown host"));
        };

        match behavior {
            NodeBehavior::Unreachable(delay) => {
                tokio::time::sleep(delay).await;
                Err(Error::connect_failed(url, "connection refused"))
            }
            NodeBehavior::Reachable(latency) => {
                tokio::time::sleep(latency).await;
                let mut apis: BTreeSet<String> = ApiNamespace::DEFAULT
                    .iter()
                    .map(|ns| ns.as_str().to_owned())
                    .collect();
                if params.optional_apis.enable_orders && supports_orders {
                    apis.insert(ApiNamespace::Orders.as_str().to_owned());
                }
                let (network_name, network) = lookup_by_chain_id(&chain_id).unzip();
                let session = Arc::new(DummySession::new(
                    url,
                    HandshakeInfo {
                        chain_id,
                        network_name,
                        network,
                        apis,
                    },
                ));
                if let Some(node) = self.nodes.lock().unwrap().get_mut(url) {
                    node.sessions.push(session.clone());
                }
                Ok(session)
            }
        }
    }
}

pub struct DummySession {
    url: String,
    handshake: HandshakeInfo,
    closed_tx: watch::Sender<bool>,
}

impl DummySession {
    pub fn new(url: &str, handshake: HandshakeInfo) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            url: url.to_owned(),
            handshake,
            closed_tx,
        }
    }

    /// Simulate a remote disconnect.
    pub fn terminate(&self) {
        self.closed_tx.send_replace(true);
    }
}

#[async_trait]
impl SessionT for DummySession {
    fn url(&self) -> &str {
        &self.url
    }

    fn handshake(&self) -> &HandshakeInfo {
        &self.handshake
    }

    fn is_connected(&self) -> bool {
        !*self.closed_tx.borrow()
    }

    async fn call(&self, namespace: &str, method: &str, params: Vec<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        if !self.handshake.has_api(namespace) {
            return Err(Error::ApiUnavailable(namespace.to_owned()));
        }
        Ok(json!({
            "url": self.url,
            "namespace": namespace,
            "method": method,
            "params": params,
        }))
    }

    async fn close(&self) {
        self.closed_tx.send_replace(true);
    }

    async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await.is_ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    #[tokio::test]
    async fn test_dummy_connector() {
        let connector = DummyConnector::new();
        connector.add_reachable(NODE_A).add_unreachable(NODE_B);

        let params = OpenParams::probe(Duration::from_secs(1));
        let session = connector.open(NODE_A, params).await.unwrap();
        assert_eq!(session.handshake().core_asset(), Some("RVP"));
        assert!(!session.handshake().has_api("orders"));
        assert!(matches!(
            connector.open(NODE_B, params).await,
            Err(Error::ConnectFailed { .. })
        ));
        assert!(matches!(
            connector.open(NODE_D, params).await,
            Err(Error::ConnectFailed { .. })
        ));
        assert_eq!(connector.attempts(), vec![NODE_A, NODE_B, NODE_D]);
        assert_eq!(connector.live_sessions(), 1);

        connector.kill(NODE_A);
        session.closed().await;
        assert!(!session.is_connected());
        assert_eq!(connector.live_sessions(), 0);
    }
}
