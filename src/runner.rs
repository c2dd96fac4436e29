//! Run pipeline shared by every analyzer.
//!
//! resolve header parameters -> TLP gate -> connect services -> execute.
//! Services that can touch the network only come into existence after the
//! gate has passed.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::analyzers::Analyzer;
use crate::artifact::Artifact;
use crate::errors::AnalyzerResult;
use crate::http::{ReqwestTransport, Transport};
use crate::policy::TlpGate;
use crate::proxy::ProxyConfig;

/// Blocking pause used by polling adapters.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Side-effecting collaborators handed to an analyzer.
pub struct Services {
    pub http: Box<dyn Transport>,
    pub sleeper: Box<dyn Sleeper>,
}

/// Builds [`Services`] for one run.
pub trait Connector {
    fn connect(&self, proxy: &ProxyConfig) -> AnalyzerResult<Services>;
}

/// Production connector: reqwest client + real sleeps.
pub struct LiveConnector;

impl Connector for LiveConnector {
    fn connect(&self, proxy: &ProxyConfig) -> AnalyzerResult<Services> {
        Ok(Services {
            http: Box::new(ReqwestTransport::new(proxy)?),
            sleeper: Box::new(TokioSleeper),
        })
    }
}

/// Run `analyzer` against `artifact`.
pub async fn run<A: Analyzer>(
    analyzer: &A,
    artifact: &Artifact,
    connector: &dyn Connector,
) -> AnalyzerResult<Value> {
    let params = analyzer.resolve(artifact)?;

    TlpGate::from_artifact(artifact, analyzer.default_max_tlp())?.check()?;

    let proxy = ProxyConfig::from_artifact(artifact)?;
    let services = connector.connect(&proxy)?;

    log::info!("Running {} analyzer", analyzer.name());
    analyzer.execute(params, artifact, &services).await
}
