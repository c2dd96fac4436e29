//! Full PE report. Unlike `file-info`, a file that does not parse as PE is
//! an error.

use async_trait::async_trait;
use serde_json::Value;

use super::file_info::{add_pe, base_report};
use super::{Analyzer, FileHeader};
use crate::artifact::Artifact;
use crate::binary::{PeReport, Sample};
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::runner::Services;

pub struct PeInfo;

#[async_trait]
impl Analyzer for PeInfo {
    type Params = FileHeader;

    fn name(&self) -> &'static str {
        "PE_Info"
    }

    fn default_max_tlp(&self) -> i64 {
        10
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<FileHeader> {
        FileHeader::resolve(artifact)
    }

    async fn execute(&self, params: FileHeader, _artifact: &Artifact, _services: &Services) -> AnalyzerResult<Value> {
        let sample = Sample::read(&params.file).await?;
        let pe = PeReport::parse(&sample.bytes).map_err(|e| AnalyzerError::analysis(e.to_string()))?;

        let mut report = base_report(&sample, &params.name);
        add_pe(&mut report, &pe);
        Ok(Value::Object(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner;
    use crate::testing::{tiny_pe, PanicConnector, StubConnector};
    use serde_json::json;
    use std::io::Write;

    fn sample_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[tokio::test]
    async fn test_pe_report() {
        let file = sample_file(&tiny_pe());
        let artifact = Artifact::new(json!({ "file": file.path().to_str().unwrap(), "attachmentName": "a.exe" }));
        let report = runner::run(&PeInfo, &artifact, &StubConnector::new(vec![])).await.unwrap();

        assert_eq!(report["Magic"], "PE32 executable (GUI) Intel 80386, for MS Windows");
        assert_eq!(report["Identification"]["OperatingSystem"], "5.1");
        assert_eq!(report["Identification"]["impash"], "");
        assert_eq!(
            report["Identification"]["pehash"],
            "b4dd63472c73712927c1ecd4af65d31a4ff6b2ff77e1c63a3ede09d124de35a2"
        );
        assert_eq!(report["BasicInformation"]["FileSize"], 0x400);
        assert_eq!(report["BasicInformation"]["FileInfo"], json!([]));
        assert_eq!(report["ImportAdressTable"], json!([]));
    }

    #[tokio::test]
    async fn test_not_a_pe() {
        let file = sample_file(b"just text");
        let artifact = Artifact::new(json!({ "file": file.path().to_str().unwrap() }));
        let err = runner::run(&PeInfo, &artifact, &StubConnector::new(vec![])).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Analysis(_)));
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn test_tlp_gate() {
        let artifact = Artifact::new(json!({ "file": "/tmp/x", "tlp": 3, "config": { "max_tlp": 1 } }));
        let err = runner::run(&PeInfo, &artifact, &PanicConnector).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::TlpPolicy { .. }));
    }
}
