use std::sync::Arc;
use std::time::Duration;

use revpop_ws_core::{
    error::{Error, Result},
    types::{CandidateSet, HandshakeInfo, OptionalApis},
};
use revpop_ws_env::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT_MS};

use crate::listener::{CloseCallback, ConnectCallback, UrlChangeCallback};

/// Settings of a [`crate::Manager`].  Only `url` is required.
#[derive(Clone)]
pub struct ManagerConfig {
    pub url: String,
    pub urls: Vec<String>,
    pub connect_timeout: Duration,
    pub auto_fallback: bool,
    pub optional_apis: OptionalApis,
    pub url_change_callback: Option<UrlChangeCallback>,
    pub close_cb: Option<CloseCallback>,
    pub connect_callback: Option<ConnectCallback>,
}

impl ManagerConfig {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            urls: vec![],
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            auto_fallback: false,
            optional_apis: OptionalApis::default(),
            url_change_callback: None,
            close_cb: None,
            connect_callback: None,
        }
    }

    pub fn with_fallbacks<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_auto_fallback(mut self, auto_fallback: bool) -> Self {
        self.auto_fallback = auto_fallback;
        self
    }

    pub fn with_optional_apis(mut self, optional_apis: OptionalApis) -> Self {
        self.optional_apis = optional_apis;
        self
    }

    pub fn on_url_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.url_change_callback = Some(Arc::new(f));
        self
    }

    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.close_cb = Some(Arc::new(f));
        self
    }

    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn(&HandshakeInfo) + Send + Sync + 'static,
    {
        self.connect_callback = Some(Arc::new(f));
        self
    }

    pub fn candidates(&self) -> CandidateSet {
        CandidateSet::new(self.url.as_str(), self.urls.clone())
    }
}

impl TryFrom<&ConnectionConfig> for ManagerConfig {
    type Error = Error;

    fn try_from(value: &ConnectionConfig) -> Result<Self> {
        if value.url.trim().is_empty() {
            return Err(Error::InvalidConfig("missing primary url".into()));
        }
        Ok(ManagerConfig::new(value.url.clone())
            .with_fallbacks(value.urls.clone())
            .with_connect_timeout(Duration::from_millis(value.connect_timeout_ms))
            .with_auto_fallback(value.auto_fallback)
            .with_optional_apis(OptionalApis {
                enable_orders: value.enable_orders,
            }))
    }
}
