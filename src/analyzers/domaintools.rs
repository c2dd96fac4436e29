//! DomainTools API adapter.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha1::Sha1;

use super::{Analyzer, ServiceHeader};
use crate::artifact::Artifact;
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::http::{HttpRequest, ServiceError};
use crate::runner::Services;

const DEFAULT_HOST: &str = "api.domaintools.com";

pub struct DomainTools;

/// A routed DomainTools call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub service: String,
    pub domain: String,
    pub options: Vec<(String, String)>,
}

impl Call {
    /// Map service name and data type to a call, or reject the combination.
    pub fn route(service: &str, data_type: &str, data: &str) -> AnalyzerResult<Self> {
        let service = if service == "reverse-ip" && data_type == "ip" {
            "host-domains"
        } else {
            service
        };

        let allowed = matches!(
            (service, data_type),
            ("reverse-ip", "domain")
                | ("host-domains", "ip")
                | ("name-server-domains", "domain")
                | ("whois/history", "domain")
                | ("whois/parsed", "domain")
                | ("reverse-whois", _)
                | ("whois", "ip")
        );
        if !allowed {
            return Err(AnalyzerError::invalid("Unknown DomainTools service or invalid data type"));
        }

        if service == "reverse-whois" {
            return Ok(Self {
                service: service.to_string(),
                domain: String::new(),
                options: vec![
                    ("terms".to_string(), data.to_string()),
                    ("mode".to_string(), "purchase".to_string()),
                ],
            });
        }

        Ok(Self {
            service: service.to_string(),
            domain: data.to_string(),
            options: Vec::new(),
        })
    }

    /// `/{version}[/{domain}]/{service}`
    fn uri(&self, version: &str) -> String {
        if self.domain.trim().is_empty() {
            format!("/{}/{}", version, self.service)
        } else {
            format!("/{}/{}/{}", version, self.domain, self.service)
        }
    }
}

/// Client settings read from `config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainToolsConfig {
    pub username: String,
    pub key: String,
    pub host: String,
    pub port: String,
    pub version: String,
    pub secure_auth: bool,
}

impl DomainToolsConfig {
    pub fn from_artifact(artifact: &Artifact) -> AnalyzerResult<Self> {
        let username = artifact.str_or("config.username", "")?;
        if username.trim().is_empty() {
            return Err(AnalyzerError::invalid("Empty API username"));
        }
        let key = artifact.str_or("config.key", "")?;
        if key.trim().is_empty() {
            return Err(AnalyzerError::invalid("Empty API key"));
        }

        let host = artifact.str_or("config.host", DEFAULT_HOST)?;
        let host = if artifact.bool_or("config.use_free_api", false) {
            format!("free{}", host)
        } else {
            host.to_string()
        };

        let port = match artifact.get("config.port") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => return Err(AnalyzerError::invalid("config.port must be a port number")),
            None => "80".to_string(),
        };

        Ok(Self {
            username: username.to_string(),
            key: key.to_string(),
            host,
            port,
            version: artifact.str_or("config.version", "v1")?.to_string(),
            secure_auth: artifact.bool_or("config.secure_auth", true),
        })
    }

    /// Build the signed request for `call` at `timestamp`.
    pub fn request(&self, call: &Call, timestamp: &str) -> AnalyzerResult<HttpRequest> {
        let uri = call.uri(&self.version);
        let url = format!("http://{}:{}{}", self.host, self.port, uri);

        let mut request = HttpRequest::get(url);
        for (name, value) in &call.options {
            request = request.query(name.as_str(), value.as_str());
        }
        request = request
            .query("format", "json")
            .query("api_username", self.username.as_str());

        if self.secure_auth {
            let signature = sign(&self.key, &format!("{}{}{}", self.username, timestamp, uri))?;
            request = request.query("timestamp", timestamp).query("signature", signature);
        } else {
            request = request.query("api_key", self.key.as_str());
        }
        Ok(request)
    }
}

/// Hex HMAC-SHA1 of `message` keyed with the API key.
pub fn sign(key: &str, message: &str) -> AnalyzerResult<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|e| AnalyzerError::analysis(format!("Invalid signing key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn service_failure(data_type: &str, err: ServiceError) -> AnalyzerError {
    match err {
        ServiceError::NotFound => AnalyzerError::analysis(format!("{} not found", capitalize(data_type))),
        ServiceError::NotAuthorized => AnalyzerError::analysis("An authorization error occurred"),
        other => AnalyzerError::analysis(format!("An unexpected error occurred: {}", other)),
    }
}

#[async_trait]
impl Analyzer for DomainTools {
    type Params = ServiceHeader;

    fn name(&self) -> &'static str {
        "DomainTools"
    }

    fn default_max_tlp(&self) -> i64 {
        2
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<ServiceHeader> {
        ServiceHeader::resolve(artifact)
    }

    async fn execute(&self, header: ServiceHeader, artifact: &Artifact, services: &Services) -> AnalyzerResult<Value> {
        let call = Call::route(&header.service, &header.data_type, &header.data)?;
        let config = DomainToolsConfig::from_artifact(artifact)
            .map_err(|e| AnalyzerError::analysis(format!("An unexpected error occurred: {}", e)))?;

        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let request = config.request(&call, &timestamp)?;

        let document = services
            .http
            .execute(request)
            .await
            .and_then(|response| response.json())
            .map_err(|e| service_failure(&header.data_type, e))?;

        if let Some(response) = document.get("response") {
            return Ok(response.clone());
        }
        if let Some(message) = document.get("error").and_then(|e| e.get("message")) {
            let message = match message {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(AnalyzerError::analysis(message));
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use crate::runner;
    use crate::testing::{json_response, StubConnector};
    use serde_json::json;

    fn artifact(service: &str, data_type: &str, data: &str) -> Artifact {
        Artifact::new(json!({
            "dataType": data_type,
            "data": data,
            "config": { "service": service, "username": "alice", "key": "secret" }
        }))
    }

    #[test]
    fn test_routing() {
        let call = Call::route("reverse-ip", "ip", "8.8.8.8").unwrap();
        assert_eq!(call.service, "host-domains");
        assert_eq!(call.domain, "8.8.8.8");

        let call = Call::route("reverse-whois", "mail", "acme").unwrap();
        assert_eq!(call.domain, "");
        assert_eq!(call.options[0], ("terms".to_string(), "acme".to_string()));
        assert_eq!(call.options[1], ("mode".to_string(), "purchase".to_string()));

        assert!(Call::route("whois/parsed", "domain", "example.com").is_ok());
        let err = Call::route("whois/parsed", "ip", "1.1.1.1").unwrap_err();
        assert_eq!(err.to_string(), "Unknown DomainTools service or invalid data type");
    }

    #[test]
    fn test_signed_request() {
        let config = DomainToolsConfig::from_artifact(&artifact("whois", "ip", "1.2.3.4")).unwrap();
        let call = Call::route("whois", "ip", "1.2.3.4").unwrap();
        let request = config.request(&call, "2017-01-01T00:00:00Z").unwrap();

        assert_eq!(request.url, "http://api.domaintools.com:80/v1/1.2.3.4/whois");
        assert_eq!(request.query_value("format"), Some("json"));
        assert_eq!(request.query_value("api_username"), Some("alice"));
        assert_eq!(request.query_value("timestamp"), Some("2017-01-01T00:00:00Z"));
        let expected = sign("secret", "alice2017-01-01T00:00:00Z/v1/1.2.3.4/whois").unwrap();
        assert_eq!(request.query_value("signature"), Some(expected.as_str()));
        assert_eq!(request.query_value("api_key"), None);
    }

    #[test]
    fn test_hmac_sha1_known_vector() {
        // RFC 2202 test case 2
        assert_eq!(
            sign("Jefe", "what do ya want for nothing?").unwrap(),
            "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
    }

    #[test]
    fn test_plain_auth_and_free_api() {
        let artifact = Artifact::new(json!({
            "config": {
                "username": "alice", "key": "secret", "secure_auth": false,
                "use_free_api": true, "port": 8080, "version": "v2"
            }
        }));
        let config = DomainToolsConfig::from_artifact(&artifact).unwrap();
        let call = Call::route("reverse-whois", "other", "acme").unwrap();
        let request = config.request(&call, "ignored").unwrap();
        assert_eq!(request.url, "http://freeapi.domaintools.com:8080/v2/reverse-whois");
        assert_eq!(request.query_value("api_key"), Some("secret"));
        assert_eq!(request.query_value("signature"), None);
        assert_eq!(request.query_value("terms"), Some("acme"));
    }

    #[test]
    fn test_empty_credentials() {
        let artifact = Artifact::new(json!({ "config": { "username": " ", "key": "k" } }));
        assert_eq!(
            DomainToolsConfig::from_artifact(&artifact).unwrap_err().to_string(),
            "Empty API username"
        );
        let artifact = Artifact::new(json!({ "config": { "username": "u" } }));
        assert_eq!(DomainToolsConfig::from_artifact(&artifact).unwrap_err().to_string(), "Empty API key");
    }

    #[tokio::test]
    async fn test_response_member_is_emitted() {
        let connector = StubConnector::new(vec![json_response(json!({
            "response": { "ip_addresses": { "domain_count": 2 } }
        }))]);
        let result = runner::run(&DomainTools, &artifact("host-domains", "ip", "8.8.8.8"), &connector)
            .await
            .unwrap();
        assert_eq!(result, json!({ "ip_addresses": { "domain_count": 2 } }));
    }

    #[tokio::test]
    async fn test_vendor_error_message() {
        let connector = StubConnector::new(vec![json_response(json!({
            "error": { "code": 206, "message": "Query limit exceeded" }
        }))]);
        let err = runner::run(&DomainTools, &artifact("whois/history", "domain", "example.com"), &connector)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Query limit exceeded");
    }

    #[tokio::test]
    async fn test_status_errors() {
        let connector = StubConnector::new(vec![HttpResponse::new(404, "")]);
        let err = runner::run(&DomainTools, &artifact("whois/parsed", "domain", "nope.test"), &connector)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Domain not found");

        let connector = StubConnector::new(vec![HttpResponse::new(403, "")]);
        let err = runner::run(&DomainTools, &artifact("whois", "ip", "1.2.3.4"), &connector)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "An authorization error occurred");

        let connector = StubConnector::new(vec![HttpResponse::new(500, "boom")]);
        let err = runner::run(&DomainTools, &artifact("whois", "ip", "1.2.3.4"), &connector)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "An unexpected error occurred: HTTP Error 500: boom");
    }
}
