//! A session is one WebSocket connection to one node.
//!
//! The node speaks the `call` convention: every request is
//! `call(api_id, method, params)`.  Api id 1 is the login api, which
//! hands out the ids of the other namespaces.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::{
    core::client::ClientT,
    rpc_params,
    ws_client::{WsClient, WsClientBuilder},
};
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use revpop_ws_core::{
    chain_config::lookup_by_chain_id,
    error::{Error, Result},
    session::{ConnectorT, OpenParams, SessionT},
    types::{ApiNamespace, HandshakeInfo, OptionalApis},
};

use crate::error::{TransportError, TransportResult};

const LOGIN_API_ID: u64 = 1;
const CALL_METHOD: &str = "call";

/// Opens [`WsSession`]s.
#[derive(Debug, Default, Clone)]
pub struct WsConnector {}

#[async_trait]
impl ConnectorT for WsConnector {
    async fn open(&self, url: &str, params: OpenParams) -> Result<Arc<dyn SessionT>> {
        let session = WsSession::open(url, params).await?;
        Ok(Arc::new(session))
    }
}

pub struct WsSession {
    url: String,
    client: RwLock<Option<Arc<WsClient>>>,
    api_ids: HashMap<String, u64>,
    handshake: HandshakeInfo,
    closed_tx: watch::Sender<bool>,
}

async fn build_rpc_client(url: &str, timeout: Duration) -> TransportResult<WsClient> {
    let client = WsClientBuilder::default()
        .connection_timeout(timeout)
        .request_timeout(timeout)
        .build(url)
        .await?;
    Ok(client)
}

async fn login(
    client: &WsClient,
    url: &str,
    optional_apis: OptionalApis,
) -> TransportResult<(HashMap<String, u64>, HandshakeInfo)> {
    let logged_in: bool = client
        .request(CALL_METHOD, rpc_params![LOGIN_API_ID, "login", vec!["", ""]])
        .await?;
    if !logged_in {
        return Err(TransportError::LoginRejected);
    }

    let mut api_ids = HashMap::new();
    for namespace in optional_apis.namespaces() {
        let res: std::result::Result<u64, _> = client
            .request(
                CALL_METHOD,
                rpc_params![LOGIN_API_ID, namespace.as_str(), Vec::<Value>::new()],
            )
            .await;
        match res {
            Ok(id) => {
                api_ids.insert(namespace.as_str().to_owned(), id);
            }
            Err(e) => warn!("Node {} does not provide api {}: {}", url, namespace, e),
        }
    }

    let db_id = api_ids
        .get(ApiNamespace::Database.as_str())
        .copied()
        .ok_or(TransportError::DatabaseUnavailable)?;
    let chain_id: String = client
        .request(
            CALL_METHOD,
            rpc_params![db_id, "get_chain_id", Vec::<Value>::new()],
        )
        .await?;
    let (network_name, network) = lookup_by_chain_id(&chain_id).unzip();

    let handshake = HandshakeInfo {
        chain_id,
        network_name,
        network,
        apis: api_ids.keys().cloned().collect::<BTreeSet<_>>(),
    };
    Ok((api_ids, handshake))
}

impl WsSession {
    /// Connect to `url` and complete the handshake within `params.timeout`.
    /// Dropping the client of a failed or timed out attempt closes its socket.
    pub async fn open(url: &str, params: OpenParams) -> Result<Self> {
        debug!("Open session to {}", url);
        let fut = async {
            let client = build_rpc_client(url, params.timeout).await?;
            let (api_ids, handshake) = login(&client, url, params.optional_apis).await?;
            Ok::<_, TransportError>((client, api_ids, handshake))
        };
        let (client, api_ids, handshake) = tokio::time::timeout(params.timeout, fut)
            .await
            .map_err(|_| TransportError::Timeout)
            .and_then(|r| r)
            .map_err(|e| e.into_connect_error(url))?;

        info!(
            "Connected to {}, chain id: {}, apis: {:?}",
            url, handshake.chain_id, handshake.apis
        );
        let (closed_tx, _) = watch::channel(false);
        Ok(Self {
            url: url.to_owned(),
            client: RwLock::new(Some(Arc::new(client))),
            api_ids,
            handshake,
            closed_tx,
        })
    }

    async fn client(&self) -> Result<Arc<WsClient>> {
        self.client.read().await.clone().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl SessionT for WsSession {
    fn url(&self) -> &str {
        &self.url
    }

    fn handshake(&self) -> &HandshakeInfo {
        &self.handshake
    }

    fn is_connected(&self) -> bool {
        match self.client.try_read() {
            Ok(client) => client.as_ref().map(|c| c.is_connected()).unwrap_or(false),
            Err(_) => !*self.closed_tx.borrow(),
        }
    }

    async fn call(&self, namespace: &str, method: &str, params: Vec<Value>) -> Result<Value> {
        let api_id = self
            .api_ids
            .get(namespace)
            .copied()
            .ok_or_else(|| Error::ApiUnavailable(namespace.to_owned()))?;
        let client = self.client().await?;
        client
            .request(CALL_METHOD, rpc_params![api_id, method, params])
            .await
            .map_err(|e| Error::RpcError(e.to_string()))
    }

    async fn close(&self) {
        // Dropping the last reference terminates the background task and the socket.
        if self.client.write().await.take().is_some() {
            debug!("Close session to {}", self.url);
        }
        self.closed_tx.send_replace(true);
    }

    async fn closed(&self) {
        let mut closed_rx = self.closed_tx.subscribe();
        let client = self.client.read().await.clone();
        let Some(client) = client else {
            return;
        };
        tokio::select! {
            _ = client.on_disconnect() => {
                info!("Session to {} disconnected", self.url);
            }
            _ = async { closed_rx.wait_for(|closed| *closed).await.is_ok() } => {}
        }
    }
}
