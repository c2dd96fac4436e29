//! Outlook `.msg` parser.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{Analyzer, MISSING_DATA_TYPE, MISSING_FILE};
use crate::artifact::Artifact;
use crate::binary::Sample;
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::ole::OleFile;
use crate::runner::Services;

const ROOT: &str = "/";
const ATTACHMENT_PREFIX: &str = "__attach";

const SUBJECT: &str = "0037";
const RECEIVED_BY: &str = "0040";
const SENT_REPRESENTING: &str = "0042";
const SENDER: &str = "0065";
const TOPIC: &str = "0070";
const TRANSPORT_HEADERS: &str = "007D";
const BCC: &str = "0E02";
const DISPLAY_TO: &str = "0E04";
const BODY: &str = "1000";
const ATTACH_EXTENSION: &str = "3703";
const ATTACH_LONG_FILENAME: &str = "3707";
const ATTACH_MIME_TAG: &str = "370E";

pub struct MsgParser;

#[derive(Debug, Clone)]
pub struct MsgParams {
    data_type: String,
    file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentSummary {
    pub filename: Option<String>,
    pub mime: Option<String>,
    pub extension: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub subject: Option<String>,
    pub date: Option<String>,
    pub receivers: Option<String>,
    pub display_from: Option<String>,
    pub sender: Option<String>,
    pub topic: Option<String>,
    pub bcc: Option<String>,
    pub display_to: Option<String>,
    pub headers: Option<String>,
    pub body: Option<String>,
    pub attachments: Vec<AttachmentSummary>,
}

/// Value of the first `name` header, with folded continuation lines joined.
pub fn header_value(headers: &str, name: &str) -> Option<String> {
    let mut lines = headers.lines();
    while let Some(line) = lines.next() {
        if line.is_empty() {
            break;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        if !field.trim().eq_ignore_ascii_case(name) {
            continue;
        }
        let mut value = value.trim().to_string();
        for continuation in lines.clone().take_while(|l| l.starts_with([' ', '\t'])) {
            value.push(' ');
            value.push_str(continuation.trim());
        }
        return Some(value);
    }
    None
}

impl MessageSummary {
    pub fn parse(data: Vec<u8>) -> io::Result<Self> {
        let mut msg = OleFile::open(data)?;
        let headers = msg.string_property(ROOT, TRANSPORT_HEADERS)?;

        let mut attachments = Vec::new();
        for storage in msg.storages(ROOT, ATTACHMENT_PREFIX)? {
            attachments.push(AttachmentSummary {
                filename: msg.string_property(&storage, ATTACH_LONG_FILENAME)?,
                mime: msg.string_property(&storage, ATTACH_MIME_TAG)?,
                extension: msg.string_property(&storage, ATTACH_EXTENSION)?,
            });
        }

        Ok(Self {
            subject: msg.string_property(ROOT, SUBJECT)?,
            date: headers.as_deref().and_then(|h| header_value(h, "date")),
            receivers: msg.string_property(ROOT, RECEIVED_BY)?,
            display_from: msg.string_property(ROOT, SENT_REPRESENTING)?,
            sender: msg.string_property(ROOT, SENDER)?,
            topic: msg.string_property(ROOT, TOPIC)?,
            bcc: msg.string_property(ROOT, BCC)?,
            display_to: msg.string_property(ROOT, DISPLAY_TO)?,
            headers,
            body: msg.string_property(ROOT, BODY)?,
            attachments,
        })
    }
}

#[async_trait]
impl Analyzer for MsgParser {
    type Params = MsgParams;

    fn name(&self) -> &'static str {
        "MsgParser"
    }

    fn default_max_tlp(&self) -> i64 {
        10
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<MsgParams> {
        Ok(MsgParams {
            file: PathBuf::from(artifact.require_str("file", MISSING_FILE)?),
            data_type: artifact.require_str("dataType", MISSING_DATA_TYPE)?.to_string(),
        })
    }

    async fn execute(&self, params: MsgParams, _artifact: &Artifact, _services: &Services) -> AnalyzerResult<Value> {
        if params.data_type != "file" {
            return Err(AnalyzerError::invalid("Invalid data type"));
        }
        let unexpected = |e: &dyn std::fmt::Display| AnalyzerError::analysis(format!("An unexpected error occurred: {}", e));

        let sample = Sample::read(&params.file).await.map_err(|e| unexpected(&e))?;
        let summary = MessageSummary::parse(sample.bytes).map_err(|e| unexpected(&e))?;
        log::debug!("Parsed message with {} attachments", summary.attachments.len());
        Ok(serde_json::to_value(summary)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::tests::compound_file;
    use crate::runner;
    use crate::testing::StubConnector;
    use serde_json::json;
    use std::io::Write;

    fn utf16(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    const HEADERS: &str = "Received: from mx.example.com\r\nDate: Mon, 13 Jul 2009 23:41:03\r\n +0000\r\nFrom: alice@example.com\r\n\r\n";

    fn sample_msg() -> Vec<u8> {
        compound_file(&[
            ("/__substg1.0_0037001F", utf16("Invoice")),
            ("/__substg1.0_0065001E", b"alice@example.com".to_vec()),
            ("/__substg1.0_007D001F", utf16(HEADERS)),
            ("/__substg1.0_1000001F", utf16("Please see attached.")),
            ("/__attach_version1.0_#00000000/__substg1.0_3707001F", utf16("invoice.pdf")),
            ("/__attach_version1.0_#00000000/__substg1.0_370E001F", utf16("application/pdf")),
            ("/__attach_version1.0_#00000000/__substg1.0_3703001F", utf16(".pdf")),
        ])
    }

    #[test]
    fn test_header_value() {
        assert_eq!(header_value(HEADERS, "date").as_deref(), Some("Mon, 13 Jul 2009 23:41:03 +0000"));
        assert_eq!(header_value(HEADERS, "FROM").as_deref(), Some("alice@example.com"));
        assert_eq!(header_value(HEADERS, "subject"), None);
        // body lines after the blank separator are not headers
        assert_eq!(header_value("A: 1\r\n\r\nDate: x\r\n", "date"), None);
    }

    #[test]
    fn test_parse_message() {
        let summary = MessageSummary::parse(sample_msg()).unwrap();
        assert_eq!(summary.subject.as_deref(), Some("Invoice"));
        assert_eq!(summary.sender.as_deref(), Some("alice@example.com"));
        assert_eq!(summary.date.as_deref(), Some("Mon, 13 Jul 2009 23:41:03 +0000"));
        assert_eq!(summary.bcc, None);
        assert_eq!(
            summary.attachments,
            vec![AttachmentSummary {
                filename: Some("invoice.pdf".into()),
                mime: Some("application/pdf".into()),
                extension: Some(".pdf".into()),
            }]
        );
    }

    #[tokio::test]
    async fn test_run_outputs_field_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&sample_msg()).unwrap();
        let artifact = Artifact::new(json!({ "dataType": "file", "file": file.path().to_str().unwrap() }));
        let out = runner::run(&MsgParser, &artifact, &StubConnector::new(vec![])).await.unwrap();
        assert_eq!(out["subject"], "Invoice");
        assert_eq!(out["displayTo"], Value::Null);
        assert_eq!(out["body"], "Please see attached.");
        assert_eq!(out["attachments"][0]["filename"], "invoice.pdf");
    }

    #[tokio::test]
    async fn test_garbage_is_unexpected_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a message").unwrap();
        let artifact = Artifact::new(json!({ "dataType": "file", "file": file.path().to_str().unwrap() }));
        let err = runner::run(&MsgParser, &artifact, &StubConnector::new(vec![])).await.unwrap_err();
        assert!(err.to_string().starts_with("An unexpected error occurred: "));
    }

    #[tokio::test]
    async fn test_header_order() {
        let err = runner::run(&MsgParser, &Artifact::new(json!({ "dataType": "file" })), &StubConnector::new(vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), MISSING_FILE);

        let artifact = Artifact::new(json!({ "dataType": "mail", "file": "/tmp/x.msg" }));
        let err = runner::run(&MsgParser, &artifact, &StubConnector::new(vec![])).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid data type");
    }
}
