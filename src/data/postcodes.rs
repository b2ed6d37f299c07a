//! Postcode to coordinate lookup via a postcodes.io-compatible API.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::Coordinates;
use crate::error::ValuationError;

pub const DEFAULT_POSTCODE_API: &str = "https://api.postcodes.io";
pub const DEFAULT_POSTCODE_TIMEOUT_SECS: u64 = 5;

const ENV_API: &str = "HV_POSTCODE_API";
const ENV_TIMEOUT: &str = "HV_POSTCODE_TIMEOUT_SECS";

/// A postcode resolved to a point plus descriptive area names.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub postcode: String,
    pub location: Coordinates,
    pub region: String,
    pub district: Option<String>,
}

impl ResolvedLocation {
    /// `"Portsmouth, PO1 3AX (South East)"`, or without the district when unknown.
    pub fn display(&self) -> String {
        match self.district.as_deref().filter(|d| !d.is_empty()) {
            Some(d) => format!("{d}, {} ({})", self.postcode, self.region),
            None => format!("{} ({})", self.postcode, self.region),
        }
    }
}

/// Turns a postcode into coordinates.
pub trait CoordinateResolver {
    /// Fails with [`ValuationError::LocationUnresolved`] when the postcode is
    /// unknown or the lookup could not complete.
    fn resolve(&self, postcode: &str) -> Result<ResolvedLocation, ValuationError>;
}

pub struct PostcodesIoClient {
    client: Client,
    base_url: String,
}

impl PostcodesIoClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ValuationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValuationError::Io(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Reads `HV_POSTCODE_API` and `HV_POSTCODE_TIMEOUT_SECS` (also from `.env`).
    pub fn from_env() -> Result<Self, ValuationError> {
        dotenvy::dotenv().ok();
        let base_url = std::env::var(ENV_API).unwrap_or_else(|_| DEFAULT_POSTCODE_API.to_string());
        let timeout = match std::env::var(ENV_TIMEOUT) {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|_| {
                ValuationError::InvalidInput(format!("{ENV_TIMEOUT} must be whole seconds, got '{raw}'"))
            })?,
            Err(_) => DEFAULT_POSTCODE_TIMEOUT_SECS,
        };
        Self::new(base_url, Duration::from_secs(timeout))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl CoordinateResolver for PostcodesIoClient {
    fn resolve(&self, postcode: &str) -> Result<ResolvedLocation, ValuationError> {
        let clean = postcode.trim().to_ascii_uppercase();
        let unresolved = || ValuationError::LocationUnresolved {
            postcode: clean.clone(),
        };
        if clean.is_empty() {
            return Err(unresolved());
        }

        let url = format!("{}/postcodes/{}", self.base_url, clean);
        let resp = self.client.get(&url).send().map_err(|e| {
            warn!(postcode = %clean, error = %e, "postcode lookup failed");
            unresolved()
        })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(postcode = %clean, "postcode not found");
            return Err(unresolved());
        }
        if !status.is_success() {
            warn!(postcode = %clean, %status, "postcode lookup returned an error status");
            return Err(unresolved());
        }

        let body: LookupResponse = resp.json().map_err(|e| {
            warn!(postcode = %clean, error = %e, "unreadable postcode lookup response");
            unresolved()
        })?;
        body.into_location().ok_or_else(unresolved)
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    status: u16,
    result: Option<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    postcode: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    region: Option<String>,
    country: Option<String>,
    admin_district: Option<String>,
}

impl LookupResponse {
    fn into_location(self) -> Option<ResolvedLocation> {
        if self.status != 200 {
            return None;
        }
        let r = self.result?;
        let location = Coordinates::new(r.latitude?, r.longitude?);
        if !location.is_finite() {
            return None;
        }
        Some(ResolvedLocation {
            postcode: r.postcode,
            location,
            region: r.region.or(r.country).unwrap_or_else(|| "UK".to_string()),
            district: r.admin_district,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lookup_response() {
        let body = r#"{
            "status": 200,
            "result": {
                "postcode": "PO1 3AX",
                "latitude": 50.7986,
                "longitude": -1.0919,
                "region": "South East",
                "country": "England",
                "admin_district": "Portsmouth"
            }
        }"#;
        let parsed: LookupResponse = serde_json::from_str(body).unwrap();
        let loc = parsed.into_location().unwrap();
        assert_eq!(loc.postcode, "PO1 3AX");
        assert_eq!(loc.location, Coordinates::new(50.7986, -1.0919));
        assert_eq!(loc.display(), "Portsmouth, PO1 3AX (South East)");
    }

    #[test]
    fn missing_region_falls_back_to_country() {
        let body = r#"{"status":200,"result":{"postcode":"EH1 1AA","latitude":55.95,"longitude":-3.19,"region":null,"country":"Scotland","admin_district":null}}"#;
        let loc: LookupResponse = serde_json::from_str(body).unwrap();
        let loc = loc.into_location().unwrap();
        assert_eq!(loc.region, "Scotland");
        assert_eq!(loc.display(), "EH1 1AA (Scotland)");
    }

    #[test]
    fn terminated_postcode_without_coordinates_is_unresolved() {
        let body = r#"{"status":200,"result":{"postcode":"XX1 1XX","latitude":null,"longitude":null}}"#;
        let parsed: LookupResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.into_location().is_none());
    }

    #[test]
    fn empty_postcode_is_unresolved_without_a_request() {
        let client = PostcodesIoClient::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        match client.resolve("   ") {
            Err(ValuationError::LocationUnresolved { postcode }) => assert!(postcode.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unreachable_service_is_unresolved_not_retried() {
        // Port 9 (discard) refuses connections on loopback.
        let client = PostcodesIoClient::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        let started = std::time::Instant::now();
        match client.resolve(" po1 3ax ") {
            Err(ValuationError::LocationUnresolved { postcode }) => assert_eq!(postcode, "PO1 3AX"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
