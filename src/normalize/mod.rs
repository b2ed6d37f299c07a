//! Record normalization: turn raw transaction rows into clean, inflation-adjusted
//! training records.
//!
//! Steps, in order:
//! 1. drop rows missing price, postcode, sale date or locality
//! 2. drop rows outside the plausible price band
//! 3. de-duplicate on `(postcode, price, sale date)`, keeping the first row
//! 4. parse sale dates (unparseable rows are dropped)
//! 5. drop rows without structure (beds/baths) or coordinates
//! 6. apply the recency window ladder (10y, 20y, unbounded by default)
//! 7. adjust prices to the target epoch with compound inflation
//!
//! Bad rows are counted in [`CleanReport`], never fatal.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::domain::{
    NormalizeConfig, NormalizedTransaction, RawTransaction, RecencyWindow, TransactionRecord,
    DAYS_PER_YEAR,
};
use crate::error::ValuationError;

/// Per-reason drop counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub rows_in: usize,
    pub missing_fields: usize,
    pub out_of_band: usize,
    pub duplicates: usize,
    pub bad_dates: usize,
    pub missing_structure: usize,
    pub outside_window: usize,
    pub rows_out: usize,
}

impl CleanReport {
    pub fn dropped(&self) -> usize {
        self.rows_in - self.rows_out
    }
}

/// Normalizer output.
#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub records: Vec<NormalizedTransaction>,
    /// The recency window that was actually applied.
    pub window: RecencyWindow,
    pub report: CleanReport,
}

/// Clean raw rows and adjust their prices to the target epoch.
pub fn clean(raw: &[RawTransaction], config: &NormalizeConfig) -> Result<CleanOutcome, ValuationError> {
    if !(config.price_min.is_finite() && config.price_max.is_finite() && config.price_max > config.price_min) {
        return Err(ValuationError::InvalidInput(format!(
            "invalid price band {}..{}",
            config.price_min, config.price_max
        )));
    }
    if !(config.annual_rate.is_finite() && config.annual_rate > -1.0) {
        return Err(ValuationError::InvalidInput(format!(
            "invalid annual inflation rate {}",
            config.annual_rate
        )));
    }
    let epoch = config.target_epoch().ok_or_else(|| {
        ValuationError::InvalidInput(format!("invalid target year {}", config.target_year))
    })?;
    if config.recency_ladder.is_empty() {
        return Err(ValuationError::InvalidInput("recency window ladder is empty".to_string()));
    }

    let mut report = CleanReport {
        rows_in: raw.len(),
        ..CleanReport::default()
    };

    let mut seen: HashSet<(String, u64, String)> = HashSet::new();
    let mut dated: Vec<TransactionRecord> = Vec::with_capacity(raw.len());

    for row in raw {
        let (Some(price), Some(postcode), Some(date_str), Some(_locality)) = (
            row.price.filter(|p| p.is_finite()),
            row.postcode.as_deref().map(normalize_postcode).filter(|p| !p.is_empty()),
            row.sale_date.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            row.locality.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        ) else {
            report.missing_fields += 1;
            continue;
        };

        if price < config.price_min || price > config.price_max {
            report.out_of_band += 1;
            continue;
        }

        if !seen.insert((postcode.clone(), price.to_bits(), date_str.to_string())) {
            report.duplicates += 1;
            continue;
        }

        let Some(sale_date) = parse_sale_date(date_str) else {
            report.bad_dates += 1;
            continue;
        };

        let (Some(bedrooms), Some(bathrooms), Some(location)) = (
            row.bedrooms,
            row.bathrooms,
            row.location.filter(|c| c.is_finite()),
        ) else {
            report.missing_structure += 1;
            continue;
        };

        dated.push(TransactionRecord {
            postcode,
            property_type: row.property_type.unwrap_or(crate::domain::PropertyType::Other),
            bedrooms,
            bathrooms,
            latitude: location.latitude,
            longitude: location.longitude,
            sale_price: price,
            sale_date,
        });
    }

    let (window, kept) = apply_recency_ladder(dated, config)?;
    report.outside_window = kept.1;
    let records: Vec<NormalizedTransaction> = kept
        .0
        .into_iter()
        .map(|record| {
            let years = years_since(record.sale_date, epoch);
            NormalizedTransaction {
                adjusted_price: adjust_for_inflation(record.sale_price, years, config.annual_rate),
                years_since_sale: years,
                record,
            }
        })
        .collect();
    report.rows_out = records.len();

    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        missing = report.missing_fields,
        out_of_band = report.out_of_band,
        duplicates = report.duplicates,
        bad_dates = report.bad_dates,
        missing_structure = report.missing_structure,
        outside_window = report.outside_window,
        window = %window,
        "cleaned transaction records"
    );

    Ok(CleanOutcome {
        records,
        window,
        report,
    })
}

/// Try each recency window in order and keep the first non-empty result.
///
/// Returns the window used plus `(kept records, number dropped by the window)`.
fn apply_recency_ladder(
    records: Vec<TransactionRecord>,
    config: &NormalizeConfig,
) -> Result<(RecencyWindow, (Vec<TransactionRecord>, usize)), ValuationError> {
    if records.is_empty() {
        return Err(ValuationError::NoUsableRecords(
            "no rows survived field, price, duplicate and date checks".to_string(),
        ));
    }

    let total = records.len();
    for (step, &window) in config.recency_ladder.iter().enumerate() {
        let cutoff = window.cutoff(config.reference_date);
        let count = records
            .iter()
            .filter(|r| cutoff.is_none_or(|c| r.sale_date >= c))
            .count();
        if count > 0 {
            if step > 0 {
                warn!(window = %window, "narrower recency windows removed every record; widened");
            }
            let kept: Vec<TransactionRecord> = records
                .into_iter()
                .filter(|r| cutoff.is_none_or(|c| r.sale_date >= c))
                .collect();
            return Ok((window, (kept, total - count)));
        }
        warn!(window = %window, "recency window removed every record");
    }

    Err(ValuationError::NoUsableRecords(
        "every recency window removed all records".to_string(),
    ))
}

/// `price * (1 + rate)^years`.
pub fn adjust_for_inflation(price: f64, years: f64, annual_rate: f64) -> f64 {
    price * (1.0 + annual_rate).powf(years)
}

/// Fractional years from `sale_date` to `epoch` on an act/365.25 basis, floored at 0.
pub fn years_since(sale_date: NaiveDate, epoch: NaiveDate) -> f64 {
    let days = (epoch - sale_date).num_days() as f64;
    (days / DAYS_PER_YEAR).max(0.0)
}

/// Upper-case, single-spaced postcode.
pub fn normalize_postcode(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Parse a sale date.
///
/// Land Registry exports use `YYYY-MM-DD HH:MM`; listing exports use ISO dates or
/// `DD/MM/YYYY`.
pub fn parse_sale_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date_part = s.split_whitespace().next().unwrap_or(s);
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    FMTS.iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}
