//! The api facade.
//!
//! An [`ApiRegistry`] holds at most one [`ApiHandle`]: created by the
//! first `instance` call with a URL, replaced wholesale by `reset`, torn
//! down by `close`.  [`ApiRegistry::global`] is the process-wide registry
//! over WebSocket sessions; tests construct their own registries.

use std::sync::{Arc, Mutex as SyncMutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use revpop_ws_core::{
    chain_config::ChainConfig,
    error::{Error, Result},
    session::ConnectorT,
    types::{ApiNamespace, HandshakeInfo, OptionalApis},
};
use revpop_ws_transport::WsConnector;

use crate::config::ManagerConfig;
use crate::manager::Manager;

/// One api namespace of the current session.
pub struct Api<'a> {
    handle: &'a ApiHandle,
    namespace: ApiNamespace,
}

impl Api<'_> {
    pub fn namespace(&self) -> ApiNamespace {
        self.namespace
    }

    pub async fn exec(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.handle
            .exec(self.namespace.as_str(), method, params)
            .await
    }
}

fn lock_chain_config(config: &SyncMutex<ChainConfig>) -> MutexGuard<'_, ChainConfig> {
    config.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A manager plus the network settings of the chain it is connected to.
/// The settings follow every session the manager installs, including
/// those of an automatic fallback.
#[derive(Clone)]
pub struct ApiHandle {
    url: String,
    manager: Manager,
    chain_config: Arc<SyncMutex<ChainConfig>>,
}

impl ApiHandle {
    fn new(mut config: ManagerConfig, connector: Arc<dyn ConnectorT>) -> Self {
        let chain_config = Arc::new(SyncMutex::new(ChainConfig::default()));
        let chain_config_c = chain_config.clone();
        let user_callback = config.connect_callback.take();
        config.connect_callback = Some(Arc::new(move |handshake: &HandshakeInfo| {
            lock_chain_config(&chain_config_c).set_chain_id(&handshake.chain_id);
            if let Some(ref cb) = user_callback {
                cb(handshake);
            }
        }));
        Self {
            url: config.url.clone(),
            manager: Manager::new(config, connector),
            chain_config,
        }
    }

    /// The URL this handle was created for.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn chain_config(&self) -> ChainConfig {
        lock_chain_config(&self.chain_config).clone()
    }

    /// Connect to the primary endpoint.
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<HandshakeInfo> {
        let session = self.manager.connect(timeout).await?;
        Ok(session.handshake().clone())
    }

    pub async fn connect_with_fallback(&self) -> Result<HandshakeInfo> {
        let session = self.manager.connect_with_fallback().await?;
        Ok(session.handshake().clone())
    }

    /// Handshake of the current session, if any.
    pub async fn handshake(&self) -> Option<HandshakeInfo> {
        self.manager
            .session()
            .await
            .map(|s| s.handshake().clone())
    }

    /// Call `method` in `namespace` on whichever session is current.
    pub async fn exec(&self, namespace: &str, method: &str, params: Vec<Value>) -> Result<Value> {
        let session = self.manager.session().await.ok_or(Error::NotConnected)?;
        if !session.handshake().has_api(namespace) {
            return Err(Error::ApiUnavailable(namespace.to_owned()));
        }
        session.call(namespace, method, params).await
    }

    fn api(&self, namespace: ApiNamespace) -> Api<'_> {
        Api {
            handle: self,
            namespace,
        }
    }

    pub fn db_api(&self) -> Api<'_> {
        self.api(ApiNamespace::Database)
    }

    pub fn network_api(&self) -> Api<'_> {
        self.api(ApiNamespace::NetworkBroadcast)
    }

    pub fn history_api(&self) -> Api<'_> {
        self.api(ApiNamespace::History)
    }

    pub fn crypto_api(&self) -> Api<'_> {
        self.api(ApiNamespace::Crypto)
    }

    pub fn orders_api(&self) -> Api<'_> {
        self.api(ApiNamespace::Orders)
    }

    async fn teardown(&self) {
        self.manager.close().await;
        lock_chain_config(&self.chain_config).reset();
    }
}

pub struct ApiRegistry {
    connector: Arc<dyn ConnectorT>,
    optional_apis: OptionalApis,
    slot: Mutex<Option<ApiHandle>>,
}

static GLOBAL_REGISTRY: OnceLock<ApiRegistry> = OnceLock::new();

impl ApiRegistry {
    pub fn new(connector: Arc<dyn ConnectorT>) -> Self {
        Self {
            connector,
            optional_apis: OptionalApis::default(),
            slot: Mutex::new(None),
        }
    }

    pub fn with_optional_apis(mut self, optional_apis: OptionalApis) -> Self {
        self.optional_apis = optional_apis;
        self
    }

    /// The process-wide registry.
    pub fn global() -> &'static ApiRegistry {
        GLOBAL_REGISTRY.get_or_init(|| ApiRegistry::new(Arc::new(WsConnector::default())))
    }

    /// Return the current handle, or create one for `url`.
    ///
    /// Without a URL the existing handle is returned.  Asking for a
    /// different URL than the current one is an error, use
    /// [`ApiRegistry::reset`] to switch.  With `connect_now` a handle
    /// that is not connected, new or existing, is connected before
    /// returning; a failed connect leaves the handle registered.
    pub async fn instance(
        &self,
        url: Option<&str>,
        connect_now: bool,
        timeout: Option<Duration>,
    ) -> Result<ApiHandle> {
        let mut config = None;
        if let Some(url) = url {
            let mut c = ManagerConfig::new(url).with_optional_apis(self.optional_apis);
            if let Some(timeout) = timeout {
                c = c.with_connect_timeout(timeout);
            }
            config = Some(c);
        }
        self.instance_with_config(config, connect_now).await
    }

    /// Like [`ApiRegistry::instance`] with a full manager config.
    pub async fn instance_with_config(
        &self,
        config: Option<ManagerConfig>,
        connect_now: bool,
    ) -> Result<ApiHandle> {
        let handle = {
            let mut slot = self.slot.lock().await;
            match (slot.clone(), config) {
                (Some(handle), Some(config)) if config.url != handle.url => {
                    return Err(Error::UrlMismatch {
                        current: handle.url,
                        requested: config.url,
                    });
                }
                (Some(handle), _) => handle,
                (None, None) => return Err(Error::NotInitialized),
                (None, Some(config)) => {
                    info!("Create api instance for {}", config.url);
                    let handle = ApiHandle::new(config, self.connector.clone());
                    *slot = Some(handle.clone());
                    handle
                }
            }
        };
        if connect_now && !handle.manager.is_connected().await {
            handle.connect(None).await?;
        }
        Ok(handle)
    }

    /// Tear down the current handle, forgetting the settings of its
    /// network, and create a new one for `url`.
    pub async fn reset(&self, url: &str, connect_now: bool) -> Result<ApiHandle> {
        let prev = self.slot.lock().await.take();
        if let Some(prev) = prev {
            info!("Reset api instance {} -> {}", prev.url, url);
            prev.teardown().await;
        }
        self.instance(Some(url), connect_now, None).await
    }

    /// Close the current handle and empty the slot.
    pub async fn close(&self) {
        let prev = self.slot.lock().await.take();
        if let Some(prev) = prev {
            prev.teardown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ManagerEvent;
    use revpop_ws_core::types::ConnectionState;
    use revpop_ws_test::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> (Arc<DummyConnector>, ApiRegistry) {
        let connector = DummyConnector::new();
        let registry = ApiRegistry::new(connector.clone());
        (connector, registry)
    }

    #[tokio::test]
    async fn test_instance_requires_url_first() {
        let (_, registry) = registry();
        assert!(matches!(
            registry.instance(None, false, None).await,
            Err(Error::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_instance_is_shared() {
        let (connector, registry) = registry();
        connector.add_reachable(NODE_A);

        let first = registry.instance(Some(NODE_A), false, None).await.unwrap();
        assert_eq!(first.url(), NODE_A);
        assert!(connector.attempts().is_empty());

        let second = registry.instance(None, false, None).await.unwrap();
        let third = registry.instance(Some(NODE_A), false, None).await.unwrap();
        assert_eq!(second.url(), NODE_A);
        assert_eq!(third.url(), NODE_A);

        first.connect(None).await.unwrap();
        assert!(second.manager().is_connected().await);

        match registry.instance(Some(NODE_B), false, None).await {
            Err(Error::UrlMismatch { current, requested }) => {
                assert_eq!(current, NODE_A);
                assert_eq!(requested, NODE_B);
            }
            _ => panic!("Expected url mismatch"),
        }
    }

    #[tokio::test]
    async fn test_connect_now_applies_chain_config() {
        let (connector, registry) = registry();
        connector.add_reachable(NODE_A);

        let api = registry.instance(Some(NODE_A), true, None).await.unwrap();
        let config = api.chain_config();
        assert_eq!(config.network_name.as_deref(), Some("RevPop"));
        assert_eq!(config.address_prefix, "RVP");
        let handshake = api.handshake().await.unwrap();
        assert_eq!(handshake.chain_id, REVPOP_CHAIN_ID);
    }

    #[tokio::test]
    async fn test_unknown_chain_keeps_defaults() {
        let (connector, registry) = registry();
        connector.add_reachable(NODE_A);
        connector.set_chain_id(NODE_A, UNKNOWN_CHAIN_ID);

        let api = registry.instance(Some(NODE_A), true, None).await.unwrap();
        assert_eq!(api.chain_config(), ChainConfig::default());
        assert!(api.manager().is_connected().await);
    }

    #[tokio::test]
    async fn test_exec() {
        let (connector, registry) = registry();
        connector.add_reachable(NODE_A);
        let api = registry.instance(Some(NODE_A), false, None).await.unwrap();

        assert_eq!(
            api.db_api().exec("get_objects", vec![json!(["2.1.0"])]).await,
            Err(Error::NotConnected)
        );

        api.connect(None).await.unwrap();
        let res = api
            .db_api()
            .exec("get_objects", vec![json!(["2.1.0"])])
            .await
            .unwrap();
        assert_eq!(res["namespace"], "database");
        assert_eq!(res["method"], "get_objects");
        assert_eq!(res["params"], json!([["2.1.0"]]));

        assert!(api.history_api().exec("get_account_history", vec![]).await.is_ok());
        assert_eq!(
            api.orders_api().exec("get_orders", vec![]).await,
            Err(Error::ApiUnavailable("orders".into()))
        );
    }

    #[tokio::test]
    async fn test_orders_api_when_enabled() {
        let connector = DummyConnector::new();
        connector.add_reachable(NODE_A);
        let registry = ApiRegistry::new(connector.clone())
            .with_optional_apis(OptionalApis { enable_orders: true });

        let api = registry.instance(Some(NODE_A), true, None).await.unwrap();
        assert_eq!(api.orders_api().namespace(), ApiNamespace::Orders);
        let res = api.orders_api().exec("get_orders", vec![]).await.unwrap();
        assert_eq!(res["namespace"], "orders");
    }

    #[tokio::test]
    async fn test_reset_replaces_instance() {
        let (connector, registry) = registry();
        connector.add_reachable(NODE_A).add_reachable(NODE_B);
        connector.set_chain_id(NODE_B, REVPOP_DEV_CHAIN_ID);

        let old = registry.instance(Some(NODE_A), true, None).await.unwrap();
        let new = registry.reset(NODE_B, true).await.unwrap();

        assert_eq!(old.manager().state().await, ConnectionState::Disconnected);
        assert_eq!(old.chain_config(), ChainConfig::default());
        assert_eq!(new.url(), NODE_B);
        assert_eq!(
            new.chain_config().network_name.as_deref(),
            Some("RevPopDev")
        );
        assert_eq!(registry.instance(None, false, None).await.unwrap().url(), NODE_B);
        assert_eq!(connector.live_sessions(), 1);
    }

    #[tokio::test]
    async fn test_close_empties_registry() {
        let (connector, registry) = registry();
        connector.add_reachable(NODE_A);

        let api = registry.instance(Some(NODE_A), true, None).await.unwrap();
        registry.close().await;
        registry.close().await;

        assert_eq!(api.manager().state().await, ConnectionState::Disconnected);
        assert_eq!(connector.live_sessions(), 0);
        assert!(matches!(
            registry.instance(None, false, None).await,
            Err(Error::NotInitialized)
        ));
        let api = registry.instance(Some(NODE_A), false, None).await.unwrap();
        assert_eq!(api.url(), NODE_A);
    }

    #[tokio::test]
    async fn test_failed_connect_keeps_instance() {
        let (connector, registry) = registry();
        connector.add_slow(NODE_A, Duration::from_secs(10));

        let res = registry
            .instance(Some(NODE_A), true, Some(Duration::from_millis(10)))
            .await;
        assert_eq!(res.err(), Some(Error::ConnectTimeout(NODE_A.into())));

        let api = registry.instance(None, false, None).await.unwrap();
        assert_eq!(api.manager().state().await, ConnectionState::Failed);
        assert_eq!(api.manager().connect_timeout(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_connect_now_on_existing_instance() {
        let (connector, registry) = registry();
        connector.add_reachable(NODE_A);

        registry.instance(Some(NODE_A), false, None).await.unwrap();
        let api = registry.instance(Some(NODE_A), true, None).await.unwrap();
        assert!(api.manager().is_connected().await);
        assert_eq!(connector.attempts(), vec![NODE_A]);

        // Already connected, nothing to do
        registry.instance(None, true, None).await.unwrap();
        assert_eq!(connector.attempts(), vec![NODE_A]);
    }

    #[tokio::test]
    async fn test_chain_config_follows_auto_fallback() {
        let (connector, registry) = registry();
        connector.add_reachable(NODE_A).add_reachable(NODE_C);
        connector.set_chain_id(NODE_C, REVPOP_DEV_CHAIN_ID);
        let config = ManagerConfig::new(NODE_A)
            .with_fallbacks([NODE_C])
            .with_auto_fallback(true);

        let api = registry.instance_with_config(Some(config), true).await.unwrap();
        assert_eq!(api.chain_config().network_name.as_deref(), Some("RevPop"));

        let mut rx = api.manager().subscribe();
        connector.kill(NODE_A);
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("Timed out waiting for fallback")
                .unwrap();
            if event == ManagerEvent::UrlChanged(NODE_C.into()) {
                break;
            }
        }
        assert_eq!(
            api.chain_config().network_name.as_deref(),
            Some("RevPopDev")
        );
        assert_eq!(api.handshake().await.unwrap().chain_id, REVPOP_DEV_CHAIN_ID);
    }

    #[tokio::test]
    async fn test_chain_config_follows_manager_reset() {
        let (connector, registry) = registry();
        connector.add_reachable(NODE_A).add_reachable(NODE_C);
        connector.set_chain_id(NODE_C, REVPOP_DEV_CHAIN_ID);

        let api = registry.instance(Some(NODE_A), true, None).await.unwrap();
        api.manager().reset(NODE_C, Some(vec![])).await.unwrap();
        assert_eq!(
            api.chain_config().network_name.as_deref(),
            Some("RevPopDev")
        );
    }

    #[tokio::test]
    async fn test_connect_callback_kept() {
        let (connector, registry) = registry();
        connector.add_reachable(NODE_A);
        let connects = Arc::new(AtomicUsize::new(0));
        let connects_c = connects.clone();
        let config = ManagerConfig::new(NODE_A).on_connect(move |handshake| {
            assert_eq!(handshake.chain_id, REVPOP_CHAIN_ID);
            connects_c.fetch_add(1, Ordering::SeqCst);
        });

        let api = registry.instance_with_config(Some(config), true).await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(api.chain_config().network_name.as_deref(), Some("RevPop"));
    }

    #[tokio::test]
    async fn test_orders_refused_by_node() {
        let connector = DummyConnector::new();
        connector.add_reachable(NODE_A);
        connector.disable_orders(NODE_A);
        let registry = ApiRegistry::new(connector.clone())
            .with_optional_apis(OptionalApis { enable_orders: true });

        let api = registry.instance(Some(NODE_A), true, None).await.unwrap();
        assert_eq!(
            api.orders_api().exec("get_orders", vec![]).await,
            Err(Error::ApiUnavailable("orders".into()))
        );
        assert!(api.db_api().exec("get_chain_id", vec![]).await.is_ok());
    }
}
