//! Latency probes.  A probe opens a handshake-only session, times it and
//! closes it right away.  Failures are reported as data, never raised.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info};

use revpop_ws_core::{
    error::Error,
    session::{ConnectorT, OpenParams},
    types::{LatencyReport, ProbeResult},
};

#[derive(Clone)]
pub struct Prober {
    connector: Arc<dyn ConnectorT>,
}

impl Prober {
    pub fn new(connector: Arc<dyn ConnectorT>) -> Self {
        Self { connector }
    }

    pub async fn probe(&self, url: &str, timeout: Duration) -> ProbeResult {
        let start = Instant::now();
        let res = tokio::time::timeout(timeout, self.connector.open(url, OpenParams::probe(timeout)))
            .await;
        match res {
            Ok(Ok(session)) => {
                let elapsed = start.elapsed();
                session.close().await;
                debug!("Probe {} took {:?}", url, elapsed);
                ProbeResult::Latency(elapsed)
            }
            Ok(Err(e)) => {
                debug!("Probe {} failed: {}", url, e);
                ProbeResult::Failed(e)
            }
            Err(_) => {
                debug!("Probe {} timed out after {:?}", url, timeout);
                ProbeResult::Failed(Error::ConnectTimeout(url.to_owned()))
            }
        }
    }

    /// Probe every distinct URL concurrently.  The report has exactly one
    /// entry per distinct URL.
    pub async fn probe_all<I, S>(&self, urls: I, timeout: Duration) -> LatencyReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.as_ref().to_owned())
            .filter(|u| seen.insert(u.clone()))
            .collect();

        let probes = urls.iter().map(|url| async move {
            let result = self.probe(url, timeout).await;
            (url.clone(), result)
        });
        let report: LatencyReport = join_all(probes).await.into_iter().collect();
        info!(
            "Probed {} endpoints, {} reachable",
            report.len(),
            report.ranked().len()
        );
        report
    }
}
