//! The connection manager owns the single active session to a node.
//!
//! Connection-establishing operations (`connect`, `connect_with_fallback`,
//! `reset` and the automatic fallback) are serialized by one in-flight
//! guard.  `close` does not wait for that guard; it bumps the epoch
//! instead, and an attempt that settles under an older epoch discards
//! its session rather than installing it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use revpop_ws_core::{
    error::{Error, Result},
    session::{ConnectorT, OpenParams, SessionT},
    types::{CandidateSet, ConnectionState, LatencyReport, OptionalApis},
};

use crate::config::ManagerConfig;
use crate::listener::{Listeners, ManagerEvent};
use crate::prober::Prober;

struct State {
    candidates: CandidateSet,
    url: String,
    connection_state: ConnectionState,
    session: Option<Arc<dyn SessionT>>,
    // Identifies the installed session, so a late close notification of
    // a replaced session is ignored.
    generation: u64,
    watcher: Option<JoinHandle<()>>,
}

struct Inner {
    connector: Arc<dyn ConnectorT>,
    prober: Prober,
    connect_timeout: Duration,
    optional_apis: OptionalApis,
    auto_fallback: AtomicBool,
    listeners: Listeners,
    connecting: Mutex<()>,
    epoch: AtomicU64,
    state: Mutex<State>,
}

/// How a successful attempt reports the winning URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrlNotice {
    Never,
    IfChanged,
    Always,
}

/// A cheap handle to a connection manager.  Clones share the same
/// state; separately constructed managers are independent.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

impl Manager {
    /// Create a manager.  Nothing is connected until one of the connect
    /// operations is called.
    pub fn new(config: ManagerConfig, connector: Arc<dyn ConnectorT>) -> Self {
        let candidates = config.candidates();
        let ManagerConfig {
            url,
            connect_timeout,
            auto_fallback,
            optional_apis,
            url_change_callback,
            close_cb,
            connect_callback,
            ..
        } = config;

        let inner = Inner {
            prober: Prober::new(connector.clone()),
            connector,
            connect_timeout,
            optional_apis,
            auto_fallback: AtomicBool::new(auto_fallback),
            listeners: Listeners::new(url_change_callback, close_cb, connect_callback),
            connecting: Mutex::new(()),
            epoch: AtomicU64::new(0),
            state: Mutex::new(State {
                candidates,
                url,
                connection_state: ConnectionState::Disconnected,
                session: None,
                generation: 0,
                watcher: None,
            }),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The URL of the current session, or of the primary endpoint if
    /// nothing has connected yet.
    pub async fn url(&self) -> String {
        self.inner.state.lock().await.url.clone()
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.state.lock().await.connection_state
    }

    pub async fn is_connected(&self) -> bool {
        let st = self.inner.state.lock().await;
        st.connection_state == ConnectionState::Connected
            && st.session.as_ref().map(|s| s.is_connected()).unwrap_or(false)
    }

    pub async fn session(&self) -> Option<Arc<dyn SessionT>> {
        self.inner.state.lock().await.session.clone()
    }

    pub async fn candidates(&self) -> CandidateSet {
        self.inner.state.lock().await.candidates.clone()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.inner.connect_timeout
    }

    pub fn auto_fallback(&self) -> bool {
        self.inner.auto_fallback.load(Ordering::SeqCst)
    }

    /// Takes effect on the next close event.  A reconnect already in
    /// progress runs to completion.
    pub fn set_auto_fallback(&self, auto_fallback: bool) {
        self.inner
            .auto_fallback
            .store(auto_fallback, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.listeners.subscribe()
    }

    /// Connect to the primary endpoint only.
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<Arc<dyn SessionT>> {
        let _guard = self.inner.connecting.lock().await;
        let epoch = self.epoch();
        let timeout = timeout.unwrap_or(self.inner.connect_timeout);
        let primary = self.inner.state.lock().await.candidates.primary.url.clone();

        self.transition(epoch, ConnectionState::Connecting).await;
        let res = self.open_one(&primary, timeout).await;
        self.settle(res, epoch, UrlNotice::Never).await
    }

    /// Try the primary endpoint, then every fallback in order.  The
    /// first session that opens wins.
    pub async fn connect_with_fallback(&self) -> Result<Arc<dyn SessionT>> {
        let _guard = self.inner.connecting.lock().await;
        let epoch = self.epoch();

        self.transition(epoch, ConnectionState::Connecting).await;
        let res = self.walk(epoch).await;
        self.settle(res, epoch, UrlNotice::IfChanged).await
    }

    /// Probe every candidate concurrently.  The active session is not
    /// touched.
    pub async fn check_connections(&self) -> LatencyReport {
        let urls = self.inner.state.lock().await.candidates.distinct_urls();
        self.inner
            .prober
            .probe_all(urls, self.inner.connect_timeout)
            .await
    }

    /// Replace the candidates and reconnect with fallback.  `fallbacks`
    /// of `None` keeps the current fallback list.  The current session
    /// stays usable until the new one is open.
    pub async fn reset(&self, url: &str, fallbacks: Option<Vec<String>>) -> Result<Manager> {
        let _guard = self.inner.connecting.lock().await;
        let epoch = self.epoch();
        {
            let mut st = self.inner.state.lock().await;
            let fallbacks = match fallbacks {
                Some(urls) => urls,
                None => st.candidates.fallbacks.iter().map(|e| e.url.clone()).collect(),
            };
            st.candidates = CandidateSet::new(url, fallbacks);
            st.url = url.to_owned();
        }
        info!("Reset connection manager to {}", url);

        self.transition(epoch, ConnectionState::Connecting).await;
        let res = self.walk(epoch).await;
        self.settle(res, epoch, UrlNotice::Never).await?;
        Ok(self.clone())
    }

    /// Close the active session.  Any attempt in flight is discarded
    /// when it settles.  Closing a closed manager is a no-op.
    pub async fn close(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let (session, watcher) = {
            let mut st = self.inner.state.lock().await;
            self.set_state(&mut st, ConnectionState::Disconnected);
            (st.session.take(), st.watcher.take())
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        if let Some(session) = session {
            info!("Close connection to {}", session.url());
            session.close().await;
        }
    }

    fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    fn set_state(&self, st: &mut State, state: ConnectionState) {
        if st.connection_state != state {
            debug!("Connection state: {} -> {}", st.connection_state, state);
            st.connection_state = state;
            self.inner.listeners.state_changed(state);
        }
    }

    /// Set the state unless `close` has been called since `epoch`.
    async fn transition(&self, epoch: u64, state: ConnectionState) -> bool {
        let mut st = self.inner.state.lock().await;
        if self.epoch() != epoch {
            return false;
        }
        self.set_state(&mut st, state);
        true
    }

    async fn open_one(&self, url: &str, timeout: Duration) -> Result<Arc<dyn SessionT>> {
        let params = OpenParams {
            timeout,
            optional_apis: self.inner.optional_apis,
        };
        match tokio::time::timeout(timeout, self.inner.connector.open(url, params)).await {
            Ok(res) => res,
            Err(_) => Err(Error::ConnectTimeout(url.to_owned())),
        }
    }

    /// Attempt every candidate strictly in order, one at a time.
    async fn walk(&self, epoch: u64) -> Result<Arc<dyn SessionT>> {
        let candidates = self.inner.state.lock().await.candidates.clone();
        let timeout = self.inner.connect_timeout;
        for endpoint in candidates.iter() {
            if self.epoch() != epoch {
                return Err(Error::AlreadyClosed);
            }
            match self.open_one(&endpoint.url, timeout).await {
                Ok(session) => return Ok(session),
                Err(e) => warn!("Failed to connect to {}: {}", endpoint.url, e),
            }
        }
        Err(Error::NoReachableEndpoint(candidates.len()))
    }

    async fn settle(
        &self,
        res: Result<Arc<dyn SessionT>>,
        epoch: u64,
        notice: UrlNotice,
    ) -> Result<Arc<dyn SessionT>> {
        match res {
            Ok(session) => self.install(session, epoch, notice).await,
            Err(Error::AlreadyClosed) => Err(Error::AlreadyClosed),
            Err(e) => {
                self.fail(epoch).await;
                Err(e)
            }
        }
    }

    /// Make `session` the active one, then close the one it replaces.
    async fn install(
        &self,
        session: Arc<dyn SessionT>,
        epoch: u64,
        notice: UrlNotice,
    ) -> Result<Arc<dyn SessionT>> {
        let (prev_session, prev_watcher, prev_url) = {
            let mut st = self.inner.state.lock().await;
            if self.epoch() != epoch {
                drop(st);
                info!("Discard session to {}, manager closed", session.url());
                session.close().await;
                return Err(Error::AlreadyClosed);
            }
            let prev_url = std::mem::replace(&mut st.url, session.url().to_owned());
            st.generation += 1;
            let watcher = self.spawn_watcher(session.clone(), st.generation);
            let prev_watcher = st.watcher.replace(watcher);
            let prev_session = st.session.replace(session.clone());
            self.set_state(&mut st, ConnectionState::Connected);
            // Under the state lock, so a concurrent `close` observes it.
            self.inner.listeners.connected(session.handshake());
            (prev_session, prev_watcher, prev_url)
        };

        if let Some(watcher) = prev_watcher {
            watcher.abort();
        }
        if let Some(prev) = prev_session {
            if !Arc::ptr_eq(&prev, &session) {
                prev.close().await;
            }
        }

        info!("Connected to {}", session.url());
        let changed = prev_url != session.url();
        if notice == UrlNotice::Always || (notice == UrlNotice::IfChanged && changed) {
            self.inner.listeners.url_changed(session.url());
        }
        Ok(session)
    }

    /// Every candidate failed: no session stays active.
    async fn fail(&self, epoch: u64) {
        let (session, watcher) = {
            let mut st = self.inner.state.lock().await;
            if self.epoch() != epoch {
                return;
            }
            self.set_state(&mut st, ConnectionState::Failed);
            (st.session.take(), st.watcher.take())
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        if let Some(session) = session {
            session.close().await;
        }
    }

    fn spawn_watcher(&self, session: Arc<dyn SessionT>, generation: u64) -> JoinHandle<()> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            session.closed().await;
            drop(session);
            if let Some(inner) = inner.upgrade() {
                Manager { inner }.on_session_closed(generation).await;
            }
        })
    }

    async fn on_session_closed(&self, generation: u64) {
        let url = {
            let mut st = self.inner.state.lock().await;
            if st.generation != generation || st.session.is_none() {
                return;
            }
            st.session = None;
            // Detach ourselves, `close` must not abort a reconnect halfway.
            st.watcher = None;
            st.url.clone()
        };
        warn!("Connection to {} lost", url);

        // An attempt in flight decides the outcome, whatever its result.
        let Ok(_guard) = self.inner.connecting.try_lock() else {
            info!("A connection attempt is in flight, leave it to settle");
            return;
        };
        let epoch = self.epoch();

        if !self.auto_fallback() {
            if self.transition(epoch, ConnectionState::Disconnected).await {
                self.inner.listeners.closed();
            }
            return;
        }

        if !self.transition(epoch, ConnectionState::Reconnecting).await {
            return;
        }
        let res = self.walk(epoch).await;
        match self.settle(res, epoch, UrlNotice::Always).await {
            Ok(session) => info!("Fallback to {} succeeded", session.url()),
            Err(Error::AlreadyClosed) => debug!("Fallback cancelled by close"),
            Err(e) => {
                warn!("Fallback failed: {}", e);
                if self.state().await == ConnectionState::Failed {
                    self.inner.listeners.closed();
                }
            }
        }
    }
}
