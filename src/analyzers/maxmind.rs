//! MaxMind GeoIP2/GeoLite2 city lookup from a local `.mmdb` database.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use maxminddb::{MaxMindDBError, Reader};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Analyzer, MISSING_DATA, MISSING_DATA_TYPE};
use crate::artifact::Artifact;
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::runner::Services;

const DEFAULT_CITY_DATABASE: &str = "GeoLite2-City.mmdb";
const LOCALE: &str = "en";

pub struct MaxMind;

#[derive(Debug, Clone)]
pub struct MaxMindParams {
    data_type: String,
    data: String,
}

type Names = BTreeMap<String, String>;

#[derive(Debug, Default, Deserialize)]
pub struct Place {
    pub code: Option<String>,
    pub iso_code: Option<String>,
    pub geoname_id: Option<u32>,
    pub confidence: Option<u16>,
    #[serde(default)]
    pub names: Names,
}

#[derive(Debug, Default, Deserialize)]
pub struct Location {
    pub accuracy_radius: Option<u16>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub metro_code: Option<u16>,
    pub time_zone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Traits {
    pub autonomous_system_number: Option<u32>,
    pub autonomous_system_organization: Option<String>,
    pub domain: Option<String>,
    #[serde(default)]
    pub is_anonymous_proxy: bool,
    #[serde(default)]
    pub is_satellite_provider: bool,
    pub isp: Option<String>,
    pub organization: Option<String>,
    pub user_type: Option<String>,
}

/// The subset of a city record that the report exposes.
#[derive(Debug, Default, Deserialize)]
pub struct CityRecord {
    #[serde(default)]
    pub city: Place,
    #[serde(default)]
    pub continent: Place,
    #[serde(default)]
    pub country: Place,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub registered_country: Place,
    #[serde(default)]
    pub represented_country: Place,
    #[serde(default)]
    pub subdivisions: Vec<Place>,
    #[serde(default)]
    pub traits: Traits,
}

impl Place {
    fn name(&self) -> Option<&str> {
        self.names.get(LOCALE).map(String::as_str)
    }

    fn dump_city(&self) -> Value {
        json!({
            "confidence": self.confidence,
            "geoname_id": self.geoname_id,
            "name": self.name(),
            "names": self.names,
        })
    }

    fn dump_continent(&self) -> Value {
        json!({
            "code": self.code,
            "geoname_id": self.geoname_id,
            "name": self.name(),
            "names": self.names,
        })
    }

    fn dump_country(&self) -> Value {
        json!({
            "confidence": self.confidence,
            "geoname_id": self.geoname_id,
            "iso_code": self.iso_code,
            "name": self.name(),
            "names": self.names,
        })
    }
}

impl CityRecord {
    /// Render the record; `ip` is reported as the traits' address.
    pub fn report(&self, ip: IpAddr) -> Value {
        let most_specific = self.subdivisions.last();
        json!({
            "city": self.city.dump_city(),
            "continent": self.continent.dump_continent(),
            "country": self.country.dump_country(),
            "location": {
                "accuracy_radius": self.location.accuracy_radius,
                "latitude": self.location.latitude,
                "longitude": self.location.longitude,
                "metro_code": self.location.metro_code,
                "time_zone": self.location.time_zone,
            },
            "registered_country": self.registered_country.dump_country(),
            "represented_country": self.represented_country.dump_country(),
            "subdivisions": most_specific.map(Place::dump_country).unwrap_or_else(|| Place::default().dump_country()),
            "traits": {
                "autonomous_system_number": self.traits.autonomous_system_number,
                "autonomous_system_organization": self.traits.autonomous_system_organization,
                "domain": self.traits.domain,
                "ip_address": ip.to_string(),
                "is_anonymous_proxy": self.traits.is_anonymous_proxy,
                "is_satellite_provider": self.traits.is_satellite_provider,
                "isp": self.traits.isp,
                "organization": self.traits.organization,
                "user_type": self.traits.user_type,
            },
        })
    }
}

/// Look `ip` up in the database at `path`.
pub fn lookup(path: &PathBuf, ip: IpAddr) -> AnalyzerResult<CityRecord> {
    let reader = Reader::open_readfile(path).map_err(|e| match e {
        MaxMindDBError::IoError(message) => {
            AnalyzerError::analysis(format!("Cannot open database {}: {}", path.display(), message))
        }
        other => AnalyzerError::analysis(format!("Invalid database {}: {}", path.display(), other)),
    })?;

    reader.lookup::<CityRecord>(ip).map_err(|e| match e {
        MaxMindDBError::AddressNotFoundError(_) => AnalyzerError::analysis("IP address not found in database"),
        other => AnalyzerError::analysis(format!("Database lookup failed: {}", other)),
    })
}

#[async_trait]
impl Analyzer for MaxMind {
    type Params = MaxMindParams;

    fn name(&self) -> &'static str {
        "MaxMind"
    }

    fn default_max_tlp(&self) -> i64 {
        10
    }

    fn resolve(&self, artifact: &Artifact) -> AnalyzerResult<MaxMindParams> {
        Ok(MaxMindParams {
            data_type: artifact.require_str("dataType", MISSING_DATA_TYPE)?.to_string(),
            data: artifact.require_str("data", MISSING_DATA)?.to_string(),
        })
    }

    async fn execute(&self, params: MaxMindParams, artifact: &Artifact, _services: &Services) -> AnalyzerResult<Value> {
        if params.data_type != "ip" {
            return Err(AnalyzerError::invalid("Invalid data type"));
        }
        let ip: IpAddr = params.data.trim().parse().map_err(|_| {
            AnalyzerError::invalid(format!("'{}' does not appear to be an IPv4 or IPv6 address", params.data))
        })?;
        let path = PathBuf::from(artifact.str_or("config.city_database", DEFAULT_CITY_DATABASE)?);

        log::debug!("Looking up {} in {}", ip, path.display());
        let record = lookup(&path, ip)?;
        Ok(record.report(ip))
    }
}
