//! JSON request/response boundary.
//!
//! A request names a location either by postcode (resolved through a
//! [`CoordinateResolver`]) or by a legacy `address_id` in the address
//! directory. The postcode wins when both are present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ValuationService;
use crate::data::{AddressDirectory, CoordinateResolver};
use crate::domain::{PropertyType, ValuationQuery};
use crate::error::ValuationError;

pub const DEFAULT_PROPERTY_TYPE: &str = "semi-detached";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValuationRequest {
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub address_id: Option<u64>,
    pub beds: i64,
    pub baths: i64,
    #[serde(default)]
    pub property_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResponse {
    pub address: String,
    pub postcode: String,
    pub beds: u32,
    pub baths: u32,
    pub property_type: String,
    pub min_value: i64,
    pub avg_value: i64,
    pub max_value: i64,
    pub predicted_rent: i64,
    pub model_loaded: bool,
    pub model_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ValuationService {
    /// Validate, resolve the location, predict and assemble the response.
    pub fn handle(
        &self,
        request: &ValuationRequest,
        resolver: &dyn CoordinateResolver,
        directory: Option<&dyn AddressDirectory>,
    ) -> Result<ValuationResponse, ValuationError> {
        let beds = count_field("beds", request.beds)?;
        let baths = count_field("baths", request.baths)?;
        let type_label = request
            .property_type
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_PROPERTY_TYPE.to_string());
        let property_type = PropertyType::from_label(&type_label);

        let mut warnings = Vec::new();
        let postcode = request
            .postcode
            .as_deref()
            .map(|p| p.trim().to_ascii_uppercase())
            .filter(|p| !p.is_empty());

        let (location, address, postcode) = if let Some(pc) = postcode {
            let resolved = resolver.resolve(&pc)?;
            (resolved.location, resolved.display(), pc)
        } else if let Some(id) = request.address_id {
            match directory.and_then(|d| d.get(id)) {
                Some(entry) => (entry.location(), entry.display(), entry.postcode.clone()),
                None => {
                    let fallback = self.config().fallback_location;
                    warn!(address_id = id, "address id not found; using the default location");
                    warnings.push(format!(
                        "address id {id} not found; valued at the default location ({:.4}, {:.4})",
                        fallback.latitude, fallback.longitude
                    ));
                    (fallback, String::new(), String::new())
                }
            }
        } else {
            return Err(ValuationError::InvalidInput(
                "must provide a postcode".to_string(),
            ));
        };

        let result = self.predict(&ValuationQuery {
            bedrooms: beds,
            bathrooms: baths,
            property_type,
            location,
        })?;
        if !result.model_loaded {
            warnings.push("no trained model is loaded; this is a fallback estimate".to_string());
        }

        Ok(ValuationResponse {
            address,
            postcode,
            beds,
            baths,
            property_type: type_label,
            min_value: result.min_value,
            avg_value: result.avg_value,
            max_value: result.max_value,
            predicted_rent: result.predicted_rent,
            model_loaded: result.model_loaded,
            model_type: self.model_type(),
            timestamp: Utc::now(),
            warnings,
        })
    }
}

fn count_field(name: &str, v: i64) -> Result<u32, ValuationError> {
    if v < 1 {
        return Err(ValuationError::InvalidInput(format!(
            "`{name}` must be at least 1, got {v}"
        )));
    }
    u32::try_from(v).map_err(|_| ValuationError::InvalidInput(format!("`{name}` is too large: {v}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CsvAddressDirectory, ResolvedLocation};
    use crate::domain::{Coordinates, InferenceConfig};
    use crate::inference::service::tests::constant_bundle;

    /// Knows exactly one postcode.
    struct OnePostcode;

    impl CoordinateResolver for OnePostcode {
        fn resolve(&self, postcode: &str) -> Result<ResolvedLocation, ValuationError> {
            if postcode == "PO1 3AX" {
                Ok(ResolvedLocation {
                    postcode: "PO1 3AX".to_string(),
                    location: Coordinates::new(50.7986, -1.0919),
                    region: "South East".to_string(),
                    district: Some("Portsmouth".to_string()),
                })
            } else {
                Err(ValuationError::LocationUnresolved {
                    postcode: postcode.to_string(),
                })
            }
        }
    }

    fn request(json: &str) -> ValuationRequest {
        serde_json::from_str(json).unwrap()
    }

    fn degraded() -> ValuationService {
        ValuationService::new(None, InferenceConfig::default()).unwrap()
    }

    #[test]
    fn postcode_request_round_trip() {
        let svc = ValuationService::new(Some(constant_bundle(250_000.5)), InferenceConfig::default()).unwrap();
        let resp = svc
            .handle(&request(r#"{"postcode":" po1 3ax ","beds":3,"baths":2}"#), &OnePostcode, None)
            .unwrap();
        assert_eq!(resp.address, "Portsmouth, PO1 3AX (South East)");
        assert_eq!(resp.postcode, "PO1 3AX");
        assert_eq!(resp.property_type, "semi-detached");
        assert_eq!(resp.avg_value, 250_000);
        assert!(resp.model_loaded);
        assert!(resp.warnings.is_empty());

        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("warnings").is_none());
        assert_eq!(json["model_type"], "Ridge Regression");
    }

    #[test]
    fn degraded_response_carries_a_warning() {
        let resp = degraded()
            .handle(&request(r#"{"postcode":"PO1 3AX","beds":3,"baths":2}"#), &OnePostcode, None)
            .unwrap();
        assert!(!resp.model_loaded);
        assert_eq!(resp.avg_value, 300_000);
        assert_eq!(resp.warnings.len(), 1);
    }

    #[test]
    fn unknown_postcode_names_it() {
        let err = degraded()
            .handle(&request(r#"{"postcode":"ZZ99 9ZZ","beds":3,"baths":2}"#), &OnePostcode, None)
            .unwrap_err();
        assert_eq!(
            err,
            ValuationError::LocationUnresolved {
                postcode: "ZZ99 9ZZ".to_string()
            }
        );
        assert!(err.to_string().contains("ZZ99 9ZZ"));
    }

    #[test]
    fn rejects_zero_beds_and_missing_location() {
        let svc = degraded();
        let err = svc
            .handle(&request(r#"{"postcode":"PO1 3AX","beds":0,"baths":2}"#), &OnePostcode, None)
            .unwrap_err();
        assert!(matches!(err, ValuationError::InvalidInput(_)));

        let err = svc
            .handle(&request(r#"{"beds":3,"baths":2}"#), &OnePostcode, None)
            .unwrap_err();
        assert!(err.to_string().contains("postcode"));
    }

    #[test]
    fn address_id_lookup_and_fallback() {
        let dir = CsvAddressDirectory::from_reader(
            "id,address,postcode,latitude,longitude,region\n7,12 High Street,PO1 3AX,50.7986,-1.0919,South East\n"
                .as_bytes(),
        )
        .unwrap();
        let svc = degraded();

        let found = svc
            .handle(&request(r#"{"address_id":7,"beds":2,"baths":1}"#), &OnePostcode, Some(&dir))
            .unwrap();
        assert_eq!(found.address, "12 High Street (PO1 3AX)");
        assert_eq!(found.postcode, "PO1 3AX");

        let missing = svc
            .handle(&request(r#"{"address_id":99,"beds":2,"baths":1}"#), &OnePostcode, Some(&dir))
            .unwrap();
        assert!(missing.warnings.iter().any(|w| w.contains("address id 99")));
    }

    #[test]
    fn postcode_takes_precedence_over_address_id() {
        let resp = degraded()
            .handle(
                &request(r#"{"postcode":"PO1 3AX","address_id":99,"beds":2,"baths":1,"property_type":"Flat"}"#),
                &OnePostcode,
                None,
            )
            .unwrap();
        assert_eq!(resp.postcode, "PO1 3AX");
        assert_eq!(resp.property_type, "flat");
        assert!(!resp.warnings.iter().any(|w| w.contains("address id")));
    }
}
