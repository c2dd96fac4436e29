//! Outbound proxy configuration taken from the artifact.

use crate::artifact::Artifact;
use crate::errors::AnalyzerResult;

/// Proxy URLs for outbound HTTP and HTTPS traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxyConfig {
    pub fn from_artifact(artifact: &Artifact) -> AnalyzerResult<Self> {
        Ok(Self {
            http: artifact.get_str("config.proxy.http")?.map(str::to_string),
            https: artifact.get_str("config.proxy.https")?.map(str::to_string),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none()
    }
}
