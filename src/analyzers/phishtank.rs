//! PhishTank URL check.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{Analyzer, KeyedHeader, DATA_IS_MISSING};
use crate::artifact::Artifact;
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::http::{HttpRequest, ServiceError};
use crate::runner::Services;

const CHECK_URL: &str = "http://checkurl.phishtank.com/checkurl/";

pub struct PhishTank;

/// Reduce a checkurl answer to the analyzer report.
pub fn summarize(document: &Value) -> AnalyzerResult<Value> {
    let status = document
        .pointer("/meta/status")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::Malformed("missing meta.status".to_string()))?;

    if !status.contains("success") {
        return Ok(json!({ "errortext": document.get("errortext").cloned().unwrap_or(Value::Null) }));
    }

    let results = document.get("results").cloned().unwrap_or_else(|| json!({}));
    let in_database = results.get("in_database").cloned().unwrap_or(Value::Bool(false));
    if !matches!(in_database, Value::Bool(true)) {
        // historical wire value, kept as a string
        return Ok(json!({ "in_database": "False" }));
    }

    let mut out = Map::new();
    out.insert("in_database".to_string(), in_database);
    out.insert(
        "phish_detail_page".to_string(),
        results.get("phish_detail_page").cloned().unwrap_or(Value::Null),
    );
    if let Some(verified) = results.get("verified") {
        out.insert("verified".to_string(), verified.clone());
        out.insert(
            "verified_at".to_string(),
            results.get("verified_at").cloned().unwrap_or(Value::Null),
        );
    }
    Ok(Value::Object(out))
}

#[async_trait]
impl Analyzer for PhishTank {
    type Params = KeyedHeader;

    fn name(&self) -> &'static str {
        "PhishTank"
    }

    fn default_max_tlp(&self) -> i64 {
        1
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<KeyedHeader> {
        KeyedHeader::resolve(artifact, "Missing PhishTank API key")
    }

    async fn execute(&self, header: KeyedHeader, artifact: &Artifact, services: &Services) -> AnalyzerResult<Value> {
        if header.service != "query" {
            return Err(AnalyzerError::invalid("Invalid service"));
        }
        if header.data_type != "url" {
            return Err(AnalyzerError::invalid("Invalid data type"));
        }
        let data = artifact.require_str("data", DATA_IS_MISSING)?;

        let request = HttpRequest::post(CHECK_URL).form(vec![
            ("url".to_string(), data.to_string()),
            ("format".to_string(), "json".to_string()),
            ("app_key".to_string(), header.key.clone()),
        ]);
        let document = services.http.execute(request).await?.json()?;
        summarize(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Body;
    use crate::runner;
    use crate::testing::{json_response, StubConnector};

    fn artifact() -> Artifact {
        Artifact::new(json!({
            "dataType": "url", "data": "http://phish.test/login", "tlp": 1,
            "config": { "service": "query", "key": "PTKEY" }
        }))
    }

    #[tokio::test]
    async fn test_verified_phish() {
        let connector = StubConnector::new(vec![json_response(json!({
            "meta": { "status": "success" },
            "results": {
                "in_database": true,
                "phish_detail_page": "http://www.phishtank.com/phish_detail.php?phish_id=1",
                "verified": true,
                "verified_at": "2016-01-01T00:00:00+00:00"
            }
        }))]);
        let result = runner::run(&PhishTank, &artifact(), &connector).await.unwrap();
        assert_eq!(result["in_database"], true);
        assert_eq!(result["verified"], true);
        assert_eq!(result["verified_at"], "2016-01-01T00:00:00+00:00");

        let request = &connector.requests()[0];
        assert_eq!(request.url, CHECK_URL);
        match &request.body {
            Body::Form(fields) => {
                assert!(fields.contains(&("app_key".to_string(), "PTKEY".to_string())));
                assert!(fields.contains(&("url".to_string(), "http://phish.test/login".to_string())));
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_unverified_and_absent() {
        let listed = summarize(&json!({
            "meta": { "status": "success" },
            "results": { "in_database": true, "phish_detail_page": "p" }
        }))
        .unwrap();
        assert_eq!(listed, json!({ "in_database": true, "phish_detail_page": "p" }));

        let absent = summarize(&json!({
            "meta": { "status": "success" },
            "results": { "in_database": false }
        }))
        .unwrap();
        assert_eq!(absent, json!({ "in_database": "False" }));
    }

    #[test]
    fn test_vendor_failure_text() {
        let result = summarize(&json!({ "meta": { "status": "error" }, "errortext": "Invalid app_key" })).unwrap();
        assert_eq!(result, json!({ "errortext": "Invalid app_key" }));
    }

    #[tokio::test]
    async fn test_only_urls() {
        let artifact = Artifact::new(json!({
            "dataType": "domain", "data": "phish.test", "tlp": 1,
            "config": { "service": "query", "key": "PTKEY" }
        }));
        let err = runner::run(&PhishTank, &artifact, &StubConnector::new(vec![])).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid data type");
    }
}
