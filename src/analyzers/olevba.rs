//! VBA macro extraction and triage for Office documents.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::{Analyzer, FileHeader};
use crate::artifact::Artifact;
use crate::binary::Sample;
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::ole::scanner::{self, Category, Finding, BASE64_STRINGS, HEX_STRINGS};
use crate::ole::{extract_macros, MacroSource};
use crate::runner::Services;

pub const MACROS_FOUND: &str = "VBA Macros found";
pub const NO_MACROS_FOUND: &str = "No VBA Macros found";

pub struct Olevba;

#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "OLE stream")]
    pub ole_stream: String,
    #[serde(rename = "VBA filename")]
    pub vba_filename: String,
    #[serde(rename = "VBA code")]
    pub vba_code: String,
    pub scan_result: Vec<Finding>,
}

impl From<MacroSource> for StreamReport {
    fn from(source: MacroSource) -> Self {
        Self {
            scan_result: scanner::scan(&source.code),
            filename: source.container,
            ole_stream: source.stream_path,
            vba_filename: source.vba_filename,
            vba_code: source.code,
        }
    }
}

/// Summary flags plus the per-module reports.
pub fn report(sources: Vec<MacroSource>) -> Value {
    let streams: Vec<StreamReport> = sources.into_iter().map(StreamReport::from).collect();
    let findings = || streams.iter().flat_map(|s| s.scan_result.iter());

    let mut out = json!({
        "Suspicious": findings().any(|f| f.category == Category::Suspicious),
        "Base64 Strings": findings().any(|f| f.keyword == BASE64_STRINGS),
        "Hex Strings": findings().any(|f| f.keyword == HEX_STRINGS),
        "Version": env!("CARGO_PKG_VERSION"),
    });
    if streams.is_empty() {
        out["vba"] = json!(NO_MACROS_FOUND);
    } else {
        out["vba"] = json!(MACROS_FOUND);
        out["streams"] = json!(streams);
    }
    out
}

#[async_trait]
impl Analyzer for Olevba {
    type Params = FileHeader;

    fn name(&self) -> &'static str {
        "Olevba"
    }

    fn default_max_tlp(&self) -> i64 {
        10
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<FileHeader> {
        FileHeader::resolve(artifact)
    }

    async fn execute(&self, params: FileHeader, _artifact: &Artifact, _services: &Services) -> AnalyzerResult<Value> {
        let sample = Sample::read(&params.file).await?;
        let sources = extract_macros(sample.bytes, &params.name)
            .map_err(|e| AnalyzerError::analysis(format!("{}: {}", params.name, e)))?
            .ok_or_else(|| {
                AnalyzerError::analysis(format!(
                    "{} is not a supported file type, cannot extract VBA Macros.",
                    params.name
                ))
            })?;

        log::info!("{} VBA modules extracted from {}", sources.len(), params.name);
        Ok(report(sources))
    }
}
