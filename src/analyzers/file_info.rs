//! Generic file report: type, digests and embedded metadata, plus the PE
//! block for Windows executables.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{Analyzer, FileHeader};
use crate::artifact::Artifact;
use crate::binary::{identify, ssdeep, Digests, PeReport, Sample, DOS_EXECUTABLE};
use crate::errors::AnalyzerResult;
use crate::metadata;
use crate::runner::Services;

pub struct FileInfo;

/// `Mimetype`, `Magic`, `Exif` and the digest part of `Identification`.
pub(crate) fn base_report(sample: &Sample, name: &str) -> Map<String, Value> {
    let file_type = identify(&sample.bytes, name);
    let digests = Digests::compute(&sample.bytes);

    let mut report = Map::new();
    report.insert("Mimetype".to_string(), json!(file_type.mime));
    report.insert("Magic".to_string(), json!(file_type.description));
    report.insert("Exif".to_string(), json!(metadata::extract(&sample.bytes)));
    report.insert(
        "Identification".to_string(),
        json!({
            "MD5": digests.md5,
            "SHA1": digests.sha1,
            "SHA256": digests.sha256,
            "ssdeep": ssdeep(&sample.bytes),
        }),
    );
    report
}

/// Merge the PE members into a base report.
pub(crate) fn add_pe(report: &mut Map<String, Value>, pe: &PeReport) {
    report.insert("Magic".to_string(), json!(pe.description));
    if let Some(Value::Object(identification)) = report.get_mut("Identification") {
        identification.extend(pe.identification());
    }
    report.extend(pe.details());
}

#[async_trait]
impl Analyzer for FileInfo {
    type Params = FileHeader;

    fn name(&self) -> &'static str {
        "File_Info"
    }

    fn default_max_tlp(&self) -> i64 {
        10
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<FileHeader> {
        FileHeader::resolve(artifact)
    }

    async fn execute(&self, params: FileHeader, _artifact: &Artifact, _services: &Services) -> AnalyzerResult<Value> {
        let sample = Sample::read(&params.file).await?;
        let mut report = base_report(&sample, &params.name);

        if report["Mimetype"] == DOS_EXECUTABLE {
            match PeReport::parse(&sample.bytes) {
                Ok(pe) => add_pe(&mut report, &pe),
                Err(e) => log::warn!("{} looks like a DOS executable but is not a PE: {}", params.name, e),
            }
        }
        Ok(Value::Object(report))
    }
}
