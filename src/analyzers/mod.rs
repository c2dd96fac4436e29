//! Analyzer adapters.
//!
//! Every analyzer resolves its header parameters from the artifact, declares
//! the TLP ceiling it applies when `config.max_tlp` is absent, and performs
//! its work in `execute` once the runner has let it through.

pub mod dnsdb;
pub mod domaintools;
pub mod file_info;
pub mod hippocampe;
pub mod maxmind;
pub mod msg_parser;
pub mod olevba;
pub mod otx;
pub mod pe_info;
pub mod phishtank;
pub mod urlcategory;
pub mod virustotal;

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::artifact::Artifact;
use crate::cli::AnalyzerKind;
use crate::errors::AnalyzerResult;
use crate::runner::{self, Connector, Services};

pub(crate) const MISSING_DATA_TYPE: &str = "Missing dataType field";
pub(crate) const MISSING_DATA: &str = "Missing data field";
pub(crate) const MISSING_SERVICE: &str = "Service parameter is missing";
pub(crate) const MISSING_FILE: &str = "File is missing";
pub(crate) const DATA_IS_MISSING: &str = "Data is missing";
pub(crate) const DEFAULT_ATTACHMENT_NAME: &str = "noname.ext";

/// One stdin -> stdout adapter.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Parameters read before the TLP gate.
    type Params: Send;

    fn name(&self) -> &'static str;

    /// Ceiling used when the artifact has no `config.max_tlp`.
    fn default_max_tlp(&self) -> i64;

    /// Read the header parameters. Must not touch the network or filesystem.
    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<Self::Params>;

    async fn execute(
        &self,
        params: Self::Params,
        artifact: &Artifact,
        services: &Services,
    ) -> AnalyzerResult<Value>;
}

/// Run the analyzer selected on the command line.
pub async fn dispatch(
    kind: AnalyzerKind,
    artifact: &Artifact,
    connector: &dyn Connector,
) -> AnalyzerResult<Value> {
    match kind {
        AnalyzerKind::Dnsdb => runner::run(&dnsdb::Dnsdb, artifact, connector).await,
        AnalyzerKind::Domaintools => runner::run(&domaintools::DomainTools, artifact, connector).await,
        AnalyzerKind::Virustotal => runner::run(&virustotal::VirusTotal, artifact, connector).await,
        AnalyzerKind::Otx => runner::run(&otx::Otx, artifact, connector).await,
        AnalyzerKind::Phishtank => runner::run(&phishtank::PhishTank, artifact, connector).await,
        AnalyzerKind::Urlcategory => runner::run(&urlcategory::UrlCategory, artifact, connector).await,
        AnalyzerKind::Hippocampe => runner::run(&hippocampe::Hippocampe, artifact, connector).await,
        AnalyzerKind::Maxmind => runner::run(&maxmind::MaxMind, artifact, connector).await,
        AnalyzerKind::FileInfo => runner::run(&file_info::FileInfo, artifact, connector).await,
        AnalyzerKind::PeInfo => runner::run(&pe_info::PeInfo, artifact, connector).await,
        AnalyzerKind::MsgParser => runner::run(&msg_parser::MsgParser, artifact, connector).await,
        AnalyzerKind::Olevba => runner::run(&olevba::Olevba, artifact, connector).await,
    }
}

/// `dataType`, `data` and `config.service`, the header most network
/// analyzers share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHeader {
    pub data_type: String,
    pub data: String,
    pub service: String,
}

impl ServiceHeader {
    pub fn resolve(artifact: &Artifact) -> AnalyzerResult<Self> {
        Ok(Self {
            data_type: artifact.require_str("dataType", MISSING_DATA_TYPE)?.to_string(),
            data: artifact.require_str("data", MISSING_DATA)?.to_string(),
            service: artifact.require_str("config.service", MISSING_SERVICE)?.to_string(),
        })
    }
}

/// `dataType`, `config.service` and an API key; `data` is read later,
/// depending on the data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedHeader {
    pub data_type: String,
    pub service: String,
    pub key: String,
}

impl KeyedHeader {
    pub fn resolve(artifact: &Artifact, missing_key: &str) -> AnalyzerResult<Self> {
        Ok(Self {
            data_type: artifact.require_str("dataType", MISSING_DATA_TYPE)?.to_string(),
            service: artifact.require_str("config.service", MISSING_SERVICE)?.to_string(),
            key: artifact.require_str("config.key", missing_key)?.to_string(),
        })
    }
}

/// `file` and `attachmentName`, the header of the file analyzers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub file: PathBuf,
    pub name: String,
}

impl FileHeader {
    pub fn resolve(artifact: &Artifact) -> AnalyzerResult<Self> {
        Ok(Self {
            file: PathBuf::from(artifact.require_str("file", MISSING_FILE)?),
            name: artifact.str_or("attachmentName", DEFAULT_ATTACHMENT_NAME)?.to_string(),
        })
    }
}

/// First 64-character entry of `attachment.hashes`.
pub(crate) fn attachment_sha256(artifact: &Artifact) -> AnalyzerResult<String> {
    let hashes = artifact.require("attachment.hashes", "Hash is missing")?;
    hashes
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|h| h.len() == 64)
        .map(str::to_string)
        .ok_or_else(|| crate::errors::AnalyzerError::missing("Hash is missing"))
}
