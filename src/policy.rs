//! TLP policy gate.

use crate::artifact::Artifact;
use crate::errors::{AnalyzerError, AnalyzerResult};

/// TLP applied when the artifact carries none (amber).
pub const DEFAULT_TLP: i64 = 2;

/// The classification of the datum and the ceiling the analyzer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlpGate {
    pub tlp: i64,
    pub max_tlp: i64,
}

impl TlpGate {
    /// Read `tlp` and `config.max_tlp` from the artifact.
    pub fn from_artifact(artifact: &Artifact, default_max_tlp: i64) -> AnalyzerResult<Self> {
        Ok(Self {
            tlp: artifact.int_or("tlp", DEFAULT_TLP)?,
            max_tlp: artifact.int_or("config.max_tlp", default_max_tlp)?,
        })
    }

    pub fn check(&self) -> AnalyzerResult<()> {
        if self.tlp > self.max_tlp {
            log::warn!("Refusing artifact with tlp {} above max_tlp {}", self.tlp, self.max_tlp);
            return Err(AnalyzerError::TlpPolicy {
                tlp: self.tlp,
                max_tlp: self.max_tlp,
            });
        }
        Ok(())
    }
}
