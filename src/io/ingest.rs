//! CSV ingest.
//!
//! Two layouts are accepted:
//!
//! - **Land Registry**: the headerless price-paid export, 16 positional columns
//!   (`id, price, date, postcode, type, old/new, duration, PAON, SAON, street,
//!   locality, town, district, county, category, status`). Rows carry no
//!   structure or coordinates, so bedrooms and bathrooms are imputed from the
//!   property type and coordinates come from the offline prefix geocoder.
//! - **Listings**: a headed sold-listings export
//!   (`address, postcode, property_type, bedrooms, bathrooms, lat, lon, price,
//!   date_sold`).
//!
//! Ingest only parses; it never drops a row for semantic reasons. That is the
//! normalizer's job. Rows the CSV reader cannot parse become [`RowError`]s.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::data::geo::{self, GeoMatch};
use crate::domain::{InputLayout, PropertyType, RawTransaction};
use crate::error::ValuationError;

/// Minimum positional columns needed from a Land Registry row (through town).
const LR_MIN_COLUMNS: usize = 12;
const LR_ID: usize = 0;
const LR_PRICE: usize = 1;
const LR_DATE: usize = 2;
const LR_POSTCODE: usize = 3;
const LR_TYPE: usize = 4;
const LR_TOWN: usize = 11;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Ingest output.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub rows: Vec<RawTransaction>,
    /// The layout actually used (never `Auto`).
    pub layout: InputLayout,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    /// Land Registry rows whose postcode matched no district prefix.
    pub geo_fallbacks: usize,
}

/// Open `path` and parse it with `layout`.
pub fn load_transactions(path: &Path, layout: InputLayout) -> Result<IngestedData, ValuationError> {
    let file = File::open(path).map_err(|e| {
        ValuationError::InvalidInput(format!("failed to open CSV '{}': {e}", path.display()))
    })?;
    let data = read_transactions(file, layout)?;
    info!(
        path = %path.display(),
        layout = ?data.layout,
        rows_read = data.rows_read,
        rows = data.rows.len(),
        row_errors = data.row_errors.len(),
        "ingested transactions"
    );
    Ok(data)
}

/// Parse transactions from any reader.
pub fn read_transactions<R: Read>(reader: R, layout: InputLayout) -> Result<IngestedData, ValuationError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = reader.into_records();
    let first = match records.next() {
        Some(Ok(r)) => r,
        Some(Err(e)) => {
            return Err(ValuationError::InvalidInput(format!(
                "failed to read the first CSV row: {e}"
            )));
        }
        None => return Err(ValuationError::NoUsableRecords("input CSV is empty".to_string())),
    };

    let layout = match layout {
        InputLayout::Auto => detect_layout(&first),
        forced => forced,
    };

    let mut out = IngestedData {
        rows: Vec::new(),
        layout,
        row_errors: Vec::new(),
        rows_read: 0,
        geo_fallbacks: 0,
    };

    match layout {
        InputLayout::Listings => {
            let header_map = build_header_map(&first);
            ensure_listing_columns(&header_map)?;
            // Data starts on line 2.
            for (idx, result) in records.enumerate() {
                let line = idx + 2;
                out.rows_read += 1;
                match result {
                    Ok(record) => match parse_listing_row(&record, &header_map) {
                        Ok(row) => out.rows.push(row),
                        Err(message) => out.row_errors.push(RowError {
                            line,
                            id: get_optional(&record, &header_map, "address").map(str::to_string),
                            message,
                        }),
                    },
                    Err(e) => out.row_errors.push(RowError {
                        line,
                        id: None,
                        message: format!("CSV parse error: {e}"),
                    }),
                }
            }
        }
        InputLayout::LandRegistry | InputLayout::Auto => {
            let all = std::iter::once(Ok(first)).chain(records);
            for (idx, result) in all.enumerate() {
                let line = idx + 1;
                out.rows_read += 1;
                let record = match result {
                    Ok(r) => r,
                    Err(e) => {
                        out.row_errors.push(RowError {
                            line,
                            id: None,
                            message: format!("CSV parse error: {e}"),
                        });
                        continue;
                    }
                };
                match parse_land_registry_row(&record, line) {
                    Ok((row, how)) => {
                        if how == Some(GeoMatch::Fallback) {
                            out.geo_fallbacks += 1;
                        }
                        out.rows.push(row);
                    }
                    Err(message) => out.row_errors.push(RowError {
                        line,
                        id: record.get(LR_ID).map(clean_id),
                        message,
                    }),
                }
            }
            if out.geo_fallbacks > 0 {
                warn!(
                    rows = out.geo_fallbacks,
                    "postcodes matched no district prefix; placed near the national centre"
                );
            }
        }
    }

    if out.rows_read == 0 {
        return Err(ValuationError::NoUsableRecords(
            "input CSV has a header but no data rows".to_string(),
        ));
    }

    Ok(out)
}

/// A headed listings file names `postcode` and `price` in its first row; a
/// Land Registry row has a numeric price in column 1.
pub fn detect_layout(first: &StringRecord) -> InputLayout {
    let names: Vec<String> = first.iter().map(normalize_header_name).collect();
    let has = |n: &str| names.iter().any(|h| h == n);
    if has("postcode") && has("price") {
        InputLayout::Listings
    } else {
        InputLayout::LandRegistry
    }
}

fn parse_land_registry_row(
    record: &StringRecord,
    line: usize,
) -> Result<(RawTransaction, Option<GeoMatch>), String> {
    if record.len() < LR_MIN_COLUMNS {
        return Err(format!(
            "expected at least {LR_MIN_COLUMNS} positional columns, found {}",
            record.len()
        ));
    }
    let field = |i: usize| record.get(i).map(str::trim).filter(|s| !s.is_empty());

    let id = field(LR_ID).map(clean_id);
    let price = parse_price(field(LR_PRICE))?;
    let property_type = PropertyType::from_code(field(LR_TYPE).unwrap_or(""));
    let postcode = field(LR_POSTCODE).map(str::to_string);

    let seed_key = id.clone().unwrap_or_else(|| format!("line-{line}"));
    let (bedrooms, bathrooms) = impute_structure(property_type, &seed_key);

    let (location, how) = match postcode.as_deref() {
        Some(pc) => {
            let (c, how) = geo::approximate_location(pc);
            (Some(c), Some(how))
        }
        None => (None, None),
    };

    Ok((
        RawTransaction {
            id,
            price,
            sale_date: field(LR_DATE).map(str::to_string),
            postcode,
            property_type: Some(property_type),
            locality: field(LR_TOWN).map(str::to_string),
            bedrooms: Some(bedrooms),
            bathrooms: Some(bathrooms),
            location,
        },
        how,
    ))
}

fn parse_listing_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> Result<RawTransaction, String> {
    let address = get_optional(record, header_map, "address").map(str::to_string);
    let price = parse_price(get_optional(record, header_map, "price"))?;

    let lat = parse_opt_f64(get_optional(record, header_map, "lat"));
    let lon = parse_opt_f64(get_optional(record, header_map, "lon"));
    let location = match (lat, lon) {
        (Some(lat), Some(lon)) => Some(crate::domain::Coordinates::new(lat, lon)),
        _ => None,
    };

    Ok(RawTransaction {
        id: address.clone(),
        price,
        sale_date: get_optional(record, header_map, "date_sold").map(str::to_string),
        postcode: get_optional(record, header_map, "postcode").map(str::to_string),
        property_type: get_optional(record, header_map, "property_type").map(PropertyType::from_label),
        locality: address,
        bedrooms: parse_opt_count(get_optional(record, header_map, "bedrooms")),
        bathrooms: parse_opt_count(get_optional(record, header_map, "bathrooms")),
        location,
    })
}

/// Deterministic `(bedrooms, bathrooms)` guess for a Land Registry row.
///
/// Bedrooms are drawn from a per-type range; bathrooms follow as
/// `max(1, floor(beds / 2.5 + u))` with `u ~ U(0, 1)`. The draw is seeded from
/// `key` (the transaction id), so re-ingesting a file gives the same values.
pub fn impute_structure(property_type: PropertyType, key: &str) -> (u32, u32) {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let mut rng = StdRng::seed_from_u64(hasher.finish());

    let choices: &[u32] = match property_type {
        PropertyType::Detached => &[3, 4, 5],
        PropertyType::SemiDetached => &[2, 3],
        PropertyType::Terraced => &[2, 3, 4],
        PropertyType::Flat => &[1, 2],
        PropertyType::Other => &[3],
    };
    let beds = choices.choose(&mut rng).copied().unwrap_or(3);
    let u: f64 = rng.gen_range(0.0..1.0);
    let baths = ((f64::from(beds) / 2.5 + u).floor() as u32).max(1);
    (beds, baths)
}

fn ensure_listing_columns(header_map: &HashMap<String, usize>) -> Result<(), ValuationError> {
    for name in ["postcode", "price", "date_sold"] {
        if !header_map.contains_key(name) {
            return Err(ValuationError::InvalidInput(format!(
                "missing required column: `{name}`"
            )));
        }
    }
    Ok(())
}

/// Land Registry ids are wrapped in braces: `{4E95D757-...}`.
fn clean_id(s: &str) -> String {
    s.trim().trim_start_matches('{').trim_end_matches('}').to_string()
}

/// Empty is `None`; present but unparseable is an error.
fn parse_price(s: Option<&str>) -> Result<Option<f64>, String> {
    match s {
        None => Ok(None),
        Some(raw) => {
            let cleaned: String = raw.chars().filter(|c| !matches!(c, '£' | ',' | ' ')).collect();
            parse_opt_f64(Some(&cleaned))
                .map(Some)
                .ok_or_else(|| format!("invalid price '{raw}'"))
        }
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let s = s?;
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

/// Counts may be written as `3` or `3.0`.
fn parse_opt_count(s: Option<&str>) -> Option<u32> {
    let v = parse_opt_f64(s)?;
    if v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX) {
        Some(v as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LR_ROWS: &str = "\
\"{AAA-1}\",\"250000\",\"2019-06-14 00:00\",\"PO4 9QA\",\"S\",\"N\",\"F\",\"12\",\"\",\"HIGH ST\",\"\",\"PORTSMOUTH\",\"PORTSMOUTH\",\"PORTSMOUTH\",\"A\",\"A\"
\"{AAA-2}\",\"410000\",\"2021-02-01 00:00\",\"SW1A 1AA\",\"F\",\"N\",\"L\",\"4\",\"\",\"MALL\",\"\",\"LONDON\",\"WESTMINSTER\",\"GREATER LONDON\",\"A\",\"A\"
\"{AAA-3}\",\"oops\",\"2021-02-01 00:00\",\"SW1A 1AA\",\"F\",\"N\",\"L\",\"4\",\"\",\"MALL\",\"\",\"LONDON\",\"WESTMINSTER\",\"GREATER LONDON\",\"A\",\"A\"
\"{AAA-4}\",\"100000\",\"2021-02-01\"
";

    const LISTINGS: &str = "\u{feff}address,postcode,property_type,bedrooms,bathrooms,lat,lon,price,date_sold
\"1 Albert Rd, Southsea\",PO5 2SE,Semi-Detached,3,1,50.786,-1.083,\"£325,000\",2023-04-12
\"Flat 2, Elm Grove\",PO5 1JT,Apartment,1.0,1,50.790,-1.088,180000,12/01/2022
\"5 Some St\",PO1 1AA,Terraced,,1,,,200000,2022-01-01
";

    #[test]
    fn detects_land_registry_layout() {
        let data = read_transactions(LR_ROWS.as_bytes(), InputLayout::Auto).unwrap();
        assert_eq!(data.layout, InputLayout::LandRegistry);
        assert_eq!(data.rows_read, 4);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.row_errors.len(), 2);
        assert_eq!(data.row_errors[0].id.as_deref(), Some("AAA-3"));

        let row = &data.rows[0];
        assert_eq!(row.id.as_deref(), Some("AAA-1"));
        assert_eq!(row.price, Some(250_000.0));
        assert_eq!(row.locality.as_deref(), Some("PORTSMOUTH"));
        assert_eq!(row.property_type, Some(PropertyType::SemiDetached));
        assert!(matches!(row.bedrooms, Some(2 | 3)));
        let loc = row.location.unwrap();
        assert!((loc.latitude - 50.7989).abs() < 0.05);
    }

    #[test]
    fn detects_listings_layout() {
        let data = read_transactions(LISTINGS.as_bytes(), InputLayout::Auto).unwrap();
        assert_eq!(data.layout, InputLayout::Listings);
        assert_eq!(data.rows.len(), 3);
        assert!(data.row_errors.is_empty());

        let first = &data.rows[0];
        assert_eq!(first.price, Some(325_000.0));
        assert_eq!(first.property_type, Some(PropertyType::SemiDetached));
        assert_eq!(first.locality.as_deref(), Some("1 Albert Rd, Southsea"));
        assert_eq!(data.rows[1].bedrooms, Some(1));
        assert_eq!(data.rows[1].property_type, Some(PropertyType::Flat));

        // Missing structure is left for the normalizer to count.
        assert_eq!(data.rows[2].bedrooms, None);
        assert_eq!(data.rows[2].location, None);
    }

    #[test]
    fn listings_require_core_columns() {
        let csv = "address,postcode,price\nx,PO1 1AA,1\n";
        let err = read_transactions(csv.as_bytes(), InputLayout::Listings).unwrap_err();
        assert!(err.to_string().contains("date_sold"));
    }

    #[test]
    fn imputation_is_deterministic_and_in_range() {
        for i in 0..200 {
            let key = format!("id-{i}");
            let (beds, baths) = impute_structure(PropertyType::Detached, &key);
            assert!((3..=5).contains(&beds));
            assert!(baths >= 1 && baths <= 3);
            assert_eq!((beds, baths), impute_structure(PropertyType::Detached, &key));

            let (beds, baths) = impute_structure(PropertyType::Flat, &key);
            assert!((1..=2).contains(&beds));
            assert_eq!(baths, 1);
        }
        assert_eq!(impute_structure(PropertyType::Other, "x").0, 3);
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = read_transactions("".as_bytes(), InputLayout::Auto).unwrap_err();
        assert!(matches!(err, ValuationError::NoUsableRecords(_)));
    }
}
