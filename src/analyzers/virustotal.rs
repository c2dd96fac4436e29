//! VirusTotal public API (v2) adapter: report lookups and scan submission
//! with fixed-interval polling.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{attachment_sha256, Analyzer, KeyedHeader, DATA_IS_MISSING, MISSING_FILE};
use crate::artifact::Artifact;
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::http::{FilePart, HttpRequest, ServiceError, Transport};
use crate::runner::{Services, Sleeper};

const API_BASE: &str = "https://www.virustotal.com/vtapi/v2";

/// Report status meaning the analysis is complete.
const READY: i64 = 1;

const FILE_POLL_INTERVAL: Duration = Duration::from_secs(10);
const URL_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct VirusTotal;

/// Kind of report endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    File,
    Url,
    Domain,
    Ip,
}

impl ReportKind {
    fn endpoint(self) -> (&'static str, &'static str) {
        match self {
            Self::File => ("file/report", "resource"),
            Self::Url => ("url/report", "resource"),
            Self::Domain => ("domain/report", "domain"),
            Self::Ip => ("ip-address/report", "ip"),
        }
    }

    /// Delay between two polls of a pending report.
    pub fn poll_interval(self) -> Duration {
        match self {
            Self::Url => URL_POLL_INTERVAL,
            _ => FILE_POLL_INTERVAL,
        }
    }
}

pub struct VirusTotalClient<'a> {
    key: &'a str,
    transport: &'a dyn Transport,
}

impl<'a> VirusTotalClient<'a> {
    pub fn new(key: &'a str, transport: &'a dyn Transport) -> Self {
        Self { key, transport }
    }

    pub async fn report(&self, kind: ReportKind, value: &str) -> AnalyzerResult<Value> {
        let (path, param) = kind.endpoint();
        let request = HttpRequest::get(format!("{}/{}", API_BASE, path))
            .query(param, value)
            .query("apikey", self.key);
        self.call(request).await
    }

    pub async fn scan_file(&self, file_name: &str, bytes: Vec<u8>) -> AnalyzerResult<Value> {
        let request = HttpRequest::post(format!("{}/file/scan", API_BASE)).multipart(
            vec![("apikey".to_string(), self.key.to_string())],
            FilePart {
                field: "file".to_string(),
                file_name: file_name.to_string(),
                bytes,
            },
        );
        self.call(request).await
    }

    pub async fn scan_url(&self, url: &str) -> AnalyzerResult<Value> {
        let request = HttpRequest::post(format!("{}/url/scan", API_BASE)).form(vec![
            ("url".to_string(), url.to_string()),
            ("apikey".to_string(), self.key.to_string()),
        ]);
        self.call(request).await
    }

    /// Poll `kind` for `resource` until the report is ready.
    ///
    /// There is no retry ceiling; the orchestrator's process timeout bounds
    /// the wait.
    pub async fn wait_report(&self, kind: ReportKind, resource: &str, sleeper: &dyn Sleeper) -> AnalyzerResult<Value> {
        let mut attempt: u64 = 1;
        loop {
            let report = self.report(kind, resource).await?;
            if response_code(&report) == Some(READY) {
                return Ok(report);
            }
            log::info!(
                "Report for {} not ready (attempt {}), retrying in {}s",
                resource,
                attempt,
                kind.poll_interval().as_secs()
            );
            sleeper.sleep(kind.poll_interval()).await;
            attempt += 1;
        }
    }

    async fn call(&self, request: HttpRequest) -> AnalyzerResult<Value> {
        let response = self.transport.execute(request).await?;
        // 204 is how the public API signals an exhausted quota
        if response.status == 204 || response.body.is_empty() {
            return Err(ServiceError::Unavailable(format!("bad status : {}", response.status)).into());
        }
        let results = response.json()?;
        if let Some(message) = results.get("verbose_msg").and_then(Value::as_str) {
            log::info!("{}", message);
        }
        Ok(results)
    }
}

fn response_code(results: &Value) -> Option<i64> {
    results.get("response_code").and_then(Value::as_i64)
}

/// Scan id of an accepted submission, or "Scan not found".
fn accepted_scan_id(results: &Value) -> AnalyzerResult<String> {
    match (response_code(results), results.get("scan_id")) {
        (Some(READY), Some(Value::String(id))) => Ok(id.clone()),
        (Some(READY), Some(id)) if !id.is_null() => Ok(id.to_string()),
        _ => Err(AnalyzerError::analysis("Scan not found")),
    }
}

#[async_trait]
impl Analyzer for VirusTotal {
    type Params = KeyedHeader;

    fn name(&self) -> &'static str {
        "VirusTotal"
    }

    fn default_max_tlp(&self) -> i64 {
        1
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<KeyedHeader> {
        KeyedHeader::resolve(artifact, "Missing VirusTotal API key")
    }

    async fn execute(&self, header: KeyedHeader, artifact: &Artifact, services: &Services) -> AnalyzerResult<Value> {
        let client = VirusTotalClient::new(&header.key, services.http.as_ref());

        match header.service.as_str() {
            "scan" => match header.data_type.as_str() {
                "file" => {
                    let file_name = artifact.str_or("attachment.name", "noname.ext")?.to_string();
                    let path = PathBuf::from(artifact.require_str("file", MISSING_FILE)?);
                    let bytes = tokio::fs::read(&path)
                        .await
                        .map_err(|e| AnalyzerError::io(e, path.clone()))?;
                    let scan = client.scan_file(&file_name, bytes).await?;
                    let scan_id = accepted_scan_id(&scan)?;
                    client.wait_report(ReportKind::File, &scan_id, services.sleeper.as_ref()).await
                }
                "url" => {
                    let data = artifact.require_str("data", DATA_IS_MISSING)?;
                    let scan = client.scan_url(data).await?;
                    let scan_id = accepted_scan_id(&scan)?;
                    client.wait_report(ReportKind::Url, &scan_id, services.sleeper.as_ref()).await
                }
                _ => Err(AnalyzerError::invalid("Invalid data type")),
            },
            "get" => match header.data_type.as_str() {
                "domain" => {
                    let data = artifact.require_str("data", DATA_IS_MISSING)?;
                    client.report(ReportKind::Domain, data).await
                }
                "ip" => {
                    let data = artifact.require_str("data", DATA_IS_MISSING)?;
                    client.report(ReportKind::Ip, data).await
                }
                "file" => {
                    let hash = attachment_sha256(artifact)?;
                    client.report(ReportKind::File, &hash).await
                }
                "hash" => {
                    let data = artifact.require_str("data", DATA_IS_MISSING)?;
                    client.report(ReportKind::File, data).await
                }
                _ => Err(AnalyzerError::invalid("Invalid data type")),
            },
            _ => Err(AnalyzerError::invalid("Invalid service")),
        }
    }
}
