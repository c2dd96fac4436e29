//! Fortinet web-filter category lookup.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use super::{Analyzer, DATA_IS_MISSING, MISSING_DATA_TYPE, MISSING_SERVICE};
use crate::artifact::Artifact;
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::http::HttpRequest;
use crate::runner::Services;

const LOOKUP_URL: &str = "http://www.fortiguard.com/iprep";

pub struct UrlCategory;

#[derive(Debug, Clone)]
pub struct UrlCategoryParams {
    data_type: String,
    service: String,
}

/// First `Category: <words>` match of the lookup page.
pub fn extract_category(page: &str) -> AnalyzerResult<Option<String>> {
    let pattern = Regex::new(r"Category: ([\w\s]+)").map_err(|e| AnalyzerError::analysis(e.to_string()))?;
    Ok(pattern.captures(page).map(|caps| caps[1].to_string()))
}

#[async_trait]
impl Analyzer for UrlCategory {
    type Params = UrlCategoryParams;

    fn name(&self) -> &'static str {
        "URLCategory"
    }

    fn default_max_tlp(&self) -> i64 {
        1
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<UrlCategoryParams> {
        Ok(UrlCategoryParams {
            data_type: artifact.require_str("dataType", MISSING_DATA_TYPE)?.to_string(),
            service: artifact.require_str("config.service", MISSING_SERVICE)?.to_string(),
        })
    }

    async fn execute(&self, params: UrlCategoryParams, artifact: &Artifact, services: &Services) -> AnalyzerResult<Value> {
        if params.service != "query" {
            return Err(AnalyzerError::invalid("Invalid service"));
        }
        if !matches!(params.data_type.as_str(), "url" | "domain") {
            return Err(AnalyzerError::invalid("Invalid data type"));
        }
        let data = artifact.require_str("data", DATA_IS_MISSING)?;

        let request = HttpRequest::get(LOOKUP_URL).query("data", data).query("lookup", "Lookup");
        let page = services.http.execute(request).await?.text();

        match extract_category(&page)? {
            Some(category) => Ok(json!({ "fortinet_category": category })),
            None => Err(AnalyzerError::analysis("Fortinet category not found")),
        }
    }
}
