//! reqwest-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::{Body, HttpRequest, HttpResponse, Method, ServiceError, Transport};
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::proxy::ProxyConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Live HTTP client. Proxies are fixed at construction for the whole run.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(proxy: &ProxyConfig) -> AnalyzerResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("cortex-analyzers/", env!("CARGO_PKG_VERSION")));

        if let Some(url) = &proxy.http {
            log::debug!("Routing http traffic through {}", url);
            let http = reqwest::Proxy::http(url)
                .map_err(|e| AnalyzerError::invalid(format!("Invalid http proxy '{}': {}", url, e)))?;
            builder = builder.proxy(http);
        }
        if let Some(url) = &proxy.https {
            log::debug!("Routing https traffic through {}", url);
            let https = reqwest::Proxy::https(url)
                .map_err(|e| AnalyzerError::invalid(format!("Invalid https proxy '{}': {}", url, e)))?;
            builder = builder.proxy(https);
        }

        let client = builder
            .build()
            .map_err(|e| AnalyzerError::analysis(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ServiceError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, request.url.as_str());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Body::Empty => builder,
            Body::Form(fields) => builder.form(&fields),
            Body::Json(value) => builder.json(&value),
            Body::Multipart { fields, file } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                let part = Part::bytes(file.bytes).file_name(file.file_name);
                builder.multipart(form.part(file.field, part))
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_without_proxy() {
        assert!(ReqwestTransport::new(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_garbage_proxy() {
        let proxy = ProxyConfig {
            http: Some("http://[::1".to_string()),
            https: None,
        };
        assert!(matches!(
            ReqwestTransport::new(&proxy),
            Err(AnalyzerError::InvalidParameter(_))
        ));
    }
}
