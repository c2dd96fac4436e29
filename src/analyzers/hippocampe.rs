//! Hippocampe threat-feed aggregator client.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Analyzer, ServiceHeader, MISSING_DATA, MISSING_DATA_TYPE, MISSING_SERVICE};
use crate::artifact::Artifact;
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::http::{HttpRequest, ServiceError};
use crate::runner::Services;

pub struct Hippocampe;

#[derive(Debug, Clone)]
pub struct HippocampeParams {
    header: ServiceHeader,
    url: String,
}

/// Build the request for `service`; `url` is the API prefix the service
/// name is appended to.
pub fn build_request(url: &str, service: &str, data_type: &str, data: &str) -> AnalyzerResult<HttpRequest> {
    let endpoint = format!("{}{}", url, service);
    match service {
        "hipposcore" | "more" => {
            let mut kind = Map::new();
            kind.insert("type".to_string(), Value::String(data_type.to_string()));
            let mut body = Map::new();
            body.insert(data.to_string(), Value::Object(kind));
            Ok(HttpRequest::post(endpoint)
                .header("Content-Type", "application/json")
                .json(Value::Object(body)))
        }
        "shadowbook" => Ok(HttpRequest::get(endpoint)),
        _ => Err(AnalyzerError::invalid("Unknown Hippocampe service")),
    }
}

fn failure(err: ServiceError) -> AnalyzerError {
    match err {
        ServiceError::Unavailable(_) => AnalyzerError::analysis("Hippocampe: service is not available"),
        ServiceError::Malformed(_) => AnalyzerError::analysis(format!("An unexpected error occurred: {}", err)),
        other => AnalyzerError::analysis(format!("Hippocampe: {}", other)),
    }
}

#[async_trait]
impl Analyzer for Hippocampe {
    type Params = HippocampeParams;

    fn name(&self) -> &'static str {
        "Hippocampe"
    }

    fn default_max_tlp(&self) -> i64 {
        10
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<HippocampeParams> {
        let data_type = artifact.require_str("dataType", MISSING_DATA_TYPE)?.to_string();
        let data = artifact.require_str("data", MISSING_DATA)?.to_string();
        let url = artifact.require_str("config.url", "Missing URL for Hippocampe API")?.to_string();
        let service = artifact.require_str("config.service", MISSING_SERVICE)?.to_string();
        Ok(HippocampeParams {
            header: ServiceHeader { data_type, data, service },
            url,
        })
    }

    async fn execute(&self, params: HippocampeParams, _artifact: &Artifact, services: &Services) -> AnalyzerResult<Value> {
        let header = &params.header;
        let request = build_request(&params.url, &header.service, &header.data_type, &header.data)?;
        services
            .http
            .execute(request)
            .await
            .and_then(|response| response.json())
            .map_err(failure)
    }
}
