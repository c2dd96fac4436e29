//! AlienVault OTX indicator queries.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{attachment_sha256, Analyzer, KeyedHeader, DATA_IS_MISSING};
use crate::artifact::{resolve, Artifact};
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::http::{quote_plus, HttpRequest, Transport};
use crate::runner::Services;

const API_BASE: &str = "https://otx.alienvault.com:443/api/v1/indicators";
const API_ERROR: &str = "API Error! Please verify data type is correct.";

pub struct Otx;

/// Indicator families understood by OTX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Ip,
    Domain,
    File,
    Url,
}

impl Indicator {
    fn path(self) -> &'static str {
        match self {
            Self::Ip => "IPv4",
            Self::Domain => "domain",
            Self::File => "file",
            Self::Url => "url",
        }
    }

    pub fn sections(self) -> &'static [&'static str] {
        match self {
            Self::Ip => &["general", "reputation", "geo", "malware", "url_list", "passive_dns"],
            Self::Domain => &["general", "geo", "malware", "url_list", "passive_dns"],
            Self::File => &["general", "analysis"],
            Self::Url => &["general", "url_list"],
        }
    }
}

/// Output field -> (section, path inside the section).
type FieldMap = [(&'static str, &'static str, &'static [&'static str])];

const PULSES: [(&str, &str, &[&str]); 2] = [
    ("pulse_count", "general", &["pulse_info", "count"]),
    ("pulses", "general", &["pulse_info", "pulses"]),
];

const GEO: [(&str, &str, &[&str]); 5] = [
    ("continent_code", "geo", &["continent_code"]),
    ("country_code", "geo", &["country_code"]),
    ("country_name", "geo", &["country_name"]),
    ("city", "geo", &["city"]),
    ("asn", "geo", &["asn"]),
];

const NETWORK_TAIL: [(&str, &str, &[&str]); 4] = [
    ("whois", "general", &["whois"]),
    ("malware_samples", "malware", &["result"]),
    ("url_list", "url_list", &["url_list"]),
    ("passive_dns", "passive_dns", &["passive_dns"]),
];

const IP_COORDINATES: [(&str, &str, &[&str]); 2] = [
    ("longitude", "general", &["longitude"]),
    ("latitude", "general", &["latitude"]),
];

const URL_FIELDS: [(&str, &str, &[&str]); 3] = [
    ("alexa", "general", &["alexa"]),
    ("whois", "general", &["whois"]),
    ("url_list", "url_list", &["url_list"]),
];

const FILE_FIELDS: [(&str, &str, &[&str]); 9] = [
    ("malware", "analysis", &["malware"]),
    ("page_type", "analysis", &["page_type"]),
    ("sha1", "analysis", &["analysis", "info", "results", "sha1"]),
    ("sha256", "analysis", &["analysis", "info", "results", "sha256"]),
    ("md5", "analysis", &["analysis", "info", "results", "md5"]),
    ("file_class", "analysis", &["analysis", "info", "results", "file_class"]),
    ("file_type", "analysis", &["analysis", "info", "results", "file_type"]),
    ("filesize", "analysis", &["analysis", "info", "results", "filesize"]),
    ("ssdeep", "analysis", &["analysis", "info", "results", "ssdeep"]),
];

type Sections = BTreeMap<&'static str, Value>;

fn pick(sections: &Sections, fields: &FieldMap, out: &mut Map<String, Value>) {
    for (name, section, path) in fields {
        let value = sections
            .get(section)
            .and_then(|tree| resolve(tree, path))
            .cloned()
            .unwrap_or(Value::Null);
        out.insert(name.to_string(), value);
    }
}

/// Shape the fetched sections into the analyzer report.
pub fn normalize(indicator: Indicator, sections: &Sections) -> Value {
    let mut out = Map::new();
    pick(sections, &PULSES, &mut out);

    match indicator {
        Indicator::Ip => {
            pick(sections, &GEO, &mut out);
            pick(sections, &IP_COORDINATES, &mut out);
            pick(sections, &NETWORK_TAIL, &mut out);
        }
        Indicator::Domain => {
            pick(sections, &GEO, &mut out);
            pick(sections, &NETWORK_TAIL, &mut out);
        }
        Indicator::Url => pick(sections, &URL_FIELDS, &mut out),
        Indicator::File => {
            let analysed = sections
                .get("analysis")
                .and_then(|a| a.get("analysis"))
                .is_some_and(is_truthy);
            if analysed {
                pick(sections, &FILE_FIELDS, &mut out);
            } else {
                out.insert(
                    "errortext".to_string(),
                    json!("File has not previously been analyzed by OTX!"),
                );
            }
        }
    }
    Value::Object(out)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Object(m) => !m.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
    }
}

async fn fetch(transport: &dyn Transport, key: &str, indicator: Indicator, value: &str) -> AnalyzerResult<Sections> {
    let value = match indicator {
        Indicator::Url => quote_plus(value),
        _ => value.to_string(),
    };
    let base = format!("{}/{}/{}", API_BASE, indicator.path(), value);

    let mut sections = Sections::new();
    for section in indicator.sections() {
        let request = HttpRequest::get(format!("{}/{}", base, section))
            .header("X-OTX-API-KEY", key)
            .header("Accept", "application/json");
        let document = transport
            .execute(request)
            .await
            .and_then(|response| response.json())
            .map_err(|e| {
                log::debug!("OTX {} section failed: {}", section, e);
                AnalyzerError::analysis(API_ERROR)
            })?;
        sections.insert(section, document);
    }
    Ok(sections)
}

#[async_trait]
impl Analyzer for Otx {
    type Params = KeyedHeader;

    fn name(&self) -> &'static str {
        "OTX"
    }

    fn default_max_tlp(&self) -> i64 {
        1
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<KeyedHeader> {
        KeyedHeader::resolve(artifact, "Missing OTX API key")
    }

    async fn execute(&self, header: KeyedHeader, artifact: &Artifact, services: &Services) -> AnalyzerResult<Value> {
        if header.service != "query" {
            return Err(AnalyzerError::invalid("Invalid service"));
        }

        let (indicator, value) = match header.data_type.as_str() {
            "file" => (Indicator::File, attachment_sha256(artifact)?),
            "hash" => (Indicator::File, artifact.require_str("data", DATA_IS_MISSING)?.to_string()),
            "url" => (Indicator::Url, artifact.require_str("data", DATA_IS_MISSING)?.to_string()),
            "domain" => (Indicator::Domain, artifact.require_str("data", DATA_IS_MISSING)?.to_string()),
            "ip" => (Indicator::Ip, artifact.require_str("data", DATA_IS_MISSING)?.to_string()),
            _ => return Err(AnalyzerError::invalid("Invalid data type")),
        };

        let sections = fetch(services.http.as_ref(), &header.key, indicator, &value).await?;
        Ok(normalize(indicator, &sections))
    }
}
