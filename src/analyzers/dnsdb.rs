//! Farsight DNSDB passive DNS lookups.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::{json, Map, Value};

use super::{Analyzer, ServiceHeader};
use crate::artifact::Artifact;
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::http::{quote, HttpRequest, ServiceError, Transport};
use crate::runner::Services;

/// Record fields holding UNIX timestamps that are rendered as text.
const TIME_FIELDS: [&str; 2] = ["time_first", "time_last"];

/// Seconds per week, day, hour, minute and second of a relative time.
const RELATIVE_UNITS: [i64; 5] = [604_800, 86_400, 3_600, 60, 1];

pub struct Dnsdb;

#[derive(Debug, Clone)]
pub struct DnsdbParams {
    header: ServiceHeader,
    server: String,
    key: String,
}

/// Which DNSDB lookup to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Rrset(String),
    RdataIp(String),
    RdataName(String),
}

impl Lookup {
    /// Pick the lookup for a service name / data type pair.
    pub fn route(service: &str, data_type: &str, data: &str) -> AnalyzerResult<Self> {
        match (service, data_type) {
            ("domain_name", "domain") => Ok(Self::Rrset(data.to_string())),
            ("ip_history", "ip") => Ok(Self::RdataIp(data.to_string())),
            ("name_history", "fqdn") => Ok(Self::RdataName(data.to_string())),
            _ => Err(AnalyzerError::invalid("Unknown DNSDB service or invalid data type")),
        }
    }
}

/// Optional lookup refinements from `config`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: Option<i64>,
    pub rrtype: Option<String>,
    pub bailiwick: Option<String>,
    pub before: Option<i64>,
    pub after: Option<i64>,
}

impl QueryOptions {
    pub fn from_artifact(artifact: &Artifact) -> AnalyzerResult<Self> {
        let limit = artifact.int_or("config.limit", 0)?;
        Ok(Self {
            limit: (limit > 0).then_some(limit),
            rrtype: artifact.get_str("config.rrtype")?.map(str::to_string),
            bailiwick: artifact.get_str("config.bailiwick")?.map(str::to_string),
            before: time_param(artifact, "config.before")?,
            after: time_param(artifact, "config.after")?,
        })
    }

    fn time_filters(&self) -> Vec<(String, String)> {
        match (self.before, self.after) {
            (Some(before), Some(after)) => vec![
                ("time_first_after".to_string(), after.to_string()),
                ("time_last_before".to_string(), before.to_string()),
            ],
            (Some(before), None) => vec![("time_first_before".to_string(), before.to_string())],
            (None, Some(after)) => vec![("time_last_after".to_string(), after.to_string())],
            (None, None) => Vec::new(),
        }
    }
}

fn time_param(artifact: &Artifact, path: &str) -> AnalyzerResult<Option<i64>> {
    match artifact.get(path) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| AnalyzerError::invalid(format!("Invalid time: \"{}\"", n))),
        Some(Value::String(s)) => parse_time(s).map(Some),
        Some(other) => Err(AnalyzerError::invalid(format!("Invalid time: \"{}\"", other))),
    }
}

/// Parse a DNSDB time filter.
///
/// Accepts a UNIX timestamp, `%Y-%m-%d`, `%Y-%m-%d %H:%M:%S` (UTC), or a
/// BIND-style relative duration such as `1w2d`, returned as a negative
/// number of seconds.
pub fn parse_time(value: &str) -> AnalyzerResult<i64> {
    let value = value.trim();
    if let Ok(epoch) = value.parse::<i64>() {
        return Ok(epoch);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp());
        }
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(datetime.and_utc().timestamp());
    }

    let invalid = || AnalyzerError::invalid(format!("Invalid time: \"{}\"", value));
    let relative = Regex::new(r"(?i)^(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s?)?$")
        .map_err(|e| AnalyzerError::analysis(e.to_string()))?;
    if value.starts_with(|c: char| c.is_ascii_digit()) {
        if let Some(caps) = relative.captures(value) {
            let mut seconds: i64 = 0;
            for (idx, scale) in RELATIVE_UNITS.into_iter().enumerate() {
                let Some(group) = caps.get(idx + 1) else {
                    continue;
                };
                let count: i64 = group.as_str().parse().map_err(|_| invalid())?;
                seconds = count
                    .checked_mul(scale)
                    .and_then(|part| seconds.checked_add(part))
                    .ok_or_else(invalid)?;
            }
            return Ok(-seconds);
        }
    }

    Err(invalid())
}

/// Minimal DNSDB API client.
pub struct DnsdbClient<'a> {
    server: String,
    key: &'a str,
    transport: &'a dyn Transport,
}

impl<'a> DnsdbClient<'a> {
    pub fn new(server: &str, key: &'a str, transport: &'a dyn Transport) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            key,
            transport,
        }
    }

    fn path(lookup: &Lookup, options: &QueryOptions) -> String {
        match lookup {
            Lookup::Rrset(name) => match (&options.rrtype, &options.bailiwick) {
                (rrtype, Some(bailiwick)) => format!(
                    "rrset/name/{}/{}/{}",
                    quote(name),
                    rrtype.as_deref().unwrap_or("ANY"),
                    quote(bailiwick)
                ),
                (Some(rrtype), None) => format!("rrset/name/{}/{}", quote(name), rrtype),
                (None, None) => format!("rrset/name/{}", quote(name)),
            },
            Lookup::RdataName(name) => match &options.rrtype {
                Some(rrtype) => format!("rdata/name/{}/{}", quote(name), rrtype),
                None => format!("rdata/name/{}", quote(name)),
            },
            Lookup::RdataIp(ip) => format!("rdata/ip/{}", ip.replace('/', ",")),
        }
    }

    pub fn request(&self, lookup: &Lookup, options: &QueryOptions) -> HttpRequest {
        let url = format!("{}/lookup/{}", self.server, Self::path(lookup, options));
        let mut request = HttpRequest::get(url)
            .header("Accept", "application/json")
            .header("X-Api-Key", self.key);
        if let Some(limit) = options.limit {
            request = request.query("limit", limit.to_string());
        }
        for (key, value) in options.time_filters() {
            request = request.query(key, value);
        }
        request
    }

    /// Run a lookup and decode the newline-delimited JSON answer.
    pub async fn lookup(&self, lookup: &Lookup, options: &QueryOptions) -> Result<Vec<Value>, ServiceError> {
        let response = self.transport.execute(self.request(lookup, options)).await?;
        response
            .text()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| ServiceError::Malformed(e.to_string())))
            .collect()
    }
}

/// Render `field` as `%Y%m%dT%H%M%S+0000` when it holds a UNIX timestamp.
pub fn update_date(field: &str, mut row: Value) -> Value {
    if let Some(object) = row.as_object_mut() {
        reformat(field, object);
    }
    row
}

fn reformat(field: &str, object: &mut Map<String, Value>) {
    let Some(seconds) = object.get(field).and_then(Value::as_i64) else {
        return;
    };
    if let Some(time) = DateTime::from_timestamp(seconds, 0) {
        object.insert(
            field.to_string(),
            Value::String(format!("{}+0000", time.format("%Y%m%dT%H%M%S"))),
        );
    }
}

#[async_trait]
impl Analyzer for Dnsdb {
    type Params = DnsdbParams;

    fn name(&self) -> &'static str {
        "DNSDB"
    }

    fn default_max_tlp(&self) -> i64 {
        2
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<DnsdbParams> {
        let header = ServiceHeader::resolve(artifact)?;
        Ok(DnsdbParams {
            header,
            server: artifact.require_str("config.server", "Missing DNSDB server name")?.to_string(),
            key: artifact.require_str("config.key", "Missing DNSDB API key")?.to_string(),
        })
    }

    async fn execute(&self, params: DnsdbParams, artifact: &Artifact, services: &Services) -> AnalyzerResult<Value> {
        let header = &params.header;
        let lookup = Lookup::route(&header.service, &header.data_type, &header.data)?;
        let options = QueryOptions::from_artifact(artifact)?;
        let client = DnsdbClient::new(&params.server, &params.key, services.http.as_ref());

        match client.lookup(&lookup, &options).await {
            Ok(records) => {
                log::debug!("DNSDB returned {} records", records.len());
                let records: Vec<Value> = records
                    .into_iter()
                    .map(|row| TIME_FIELDS.iter().fold(row, |row, field| update_date(field, row)))
                    .collect();
                Ok(json!({ "records": records }))
            }
            Err(ServiceError::NotFound) => Ok(json!({})),
            Err(e) => Err(e.into()),
        }
    }
}
