//! Formatted terminal output.
//!
//! Formatting lives in one place so the pipeline code stays clean and output
//! changes stay localized.

use crate::data::AddressEntry;
use crate::fit::Selection;
use crate::inference::FeatureImportance;
use crate::io::ingest::IngestedData;
use crate::normalize::CleanOutcome;

use super::HoldoutPrediction;

/// Widest importance bar, in characters.
pub const IMPORTANCE_BAR_WIDTH: usize = 40;

/// Ingest and cleaning counts.
pub fn format_clean_summary(ingest: &IngestedData, clean: &CleanOutcome) -> String {
    let r = &clean.report;
    let mut out = String::new();
    out.push_str("=== hv - training data ===\n");
    out.push_str(&format!(
        "Input: layout={:?} rows={} parse_errors={}\n",
        ingest.layout,
        ingest.rows_read,
        ingest.row_errors.len()
    ));
    if ingest.geo_fallbacks > 0 {
        out.push_str(&format!(
            "Geocoding: {} rows placed at the national fallback\n",
            ingest.geo_fallbacks
        ));
    }
    out.push_str(&format!(
        "Cleaning: {} in -> {} out ({} dropped)\n",
        r.rows_in,
        r.rows_out,
        r.dropped()
    ));
    let reasons = [
        ("missing fields", r.missing_fields),
        ("outside price band", r.out_of_band),
        ("duplicates", r.duplicates),
        ("bad dates", r.bad_dates),
        ("no structure/coordinates", r.missing_structure),
        ("outside recency window", r.outside_window),
    ];
    for (label, n) in reasons.iter().filter(|(_, n)| *n > 0) {
        out.push_str(&format!("  - {label}: {n}\n"));
    }
    out.push_str(&format!("Recency window: {}\n", clean.window));
    out
}

/// Ranked candidates; `top_n = 0` prints every row.
pub fn format_leaderboard(selection: &Selection, top_n: usize) -> String {
    let mut out = String::new();
    out.push_str("\nLeaderboard (held-out MAE):\n");
    out.push_str(
        format!(
            "{:>4} {:<14} {:<12} {:<24} {:>6} {:>12} {:>12} {:>8}",
            "rank", "features", "config", "family", "trees", "test_mae", "median_ae", "r2"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<4} {:-<14} {:-<12} {:-<24} {:-<6} {:-<12} {:-<12} {:-<8}",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    let limit = if top_n == 0 { selection.leaderboard.len() } else { top_n };
    for e in selection.leaderboard.iter().take(limit) {
        let chosen = if e.rank == 1 { "*" } else { " " };
        out.push_str(&format!(
            "{:>3}{chosen} {:<14} {:<12} {:<24} {:>6} {:>12} {:>12} {:>8.4}\n",
            e.rank,
            e.feature_set.name(),
            truncate(&e.hyperparam_name, 12),
            e.family.display_name(),
            e.n_estimators,
            fmt_money(e.metrics.test_mae),
            fmt_money(e.metrics.test_median_ae),
            e.metrics.test_r2,
        ));
    }
    if selection.leaderboard.len() > limit {
        out.push_str(&format!(
            "  ... {} more\n",
            selection.leaderboard.len() - limit
        ));
    }
    for s in &selection.skipped {
        out.push_str(&format!(
            "  (skipped {}/{}) {}\n",
            s.feature_set.name(),
            s.hyperparam_name,
            s.reason
        ));
    }

    let best = &selection.best;
    out.push_str("\nChosen model:\n");
    out.push_str(&format!(
        "- {} / {} ({})\n",
        best.feature_set.name(),
        best.hyperparam_name,
        best.model.family().display_name()
    ));
    out.push_str(&format!(
        "- test MAE {} | median AE {} | R2 {:.4} (train MAE {}, R2 {:.4})\n",
        fmt_money(best.metrics.test_mae),
        fmt_money(best.metrics.test_median_ae),
        best.metrics.test_r2,
        fmt_money(best.metrics.train_mae),
        best.metrics.train_r2,
    ));
    out.push_str(&format!(
        "- n_train={} n_test={}\n",
        best.metrics.n_train, best.metrics.n_test
    ));
    out
}

/// Horizontal `#` bars scaled to the largest importance.
pub fn format_importances(importances: &[FeatureImportance]) -> String {
    let mut out = String::new();
    out.push_str("Feature importance:\n");
    let max = importances
        .iter()
        .map(|f| f.importance)
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    let name_width = importances
        .iter()
        .map(|f| f.feature.len())
        .max()
        .unwrap_or(0);
    for f in importances {
        let len = if max > 0.0 && f.importance.is_finite() {
            ((f.importance / max) * IMPORTANCE_BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        out.push_str(
            format!(
                "  {:<name_width$} {:>6.2}% {}",
                f.feature,
                100.0 * f.importance,
                "#".repeat(len)
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Held-out estimates next to the (inflation-adjusted) sale prices.
pub fn format_holdout(rows: &[HoldoutPrediction]) -> String {
    let mut out = String::new();
    out.push_str("\nSample predictions (held-out):\n");
    out.push_str(
        format!(
            "{:<10} {:<14} {:>4} {:>5} {:>12} {:>12} {:>8}",
            "postcode", "type", "beds", "baths", "actual", "predicted", "error"
        )
        .trim_end(),
    );
    out.push('\n');
    for r in rows {
        out.push_str(&format!(
            "{:<10} {:<14} {:>4} {:>5} {:>12} {:>12} {:>7.1}%\n",
            truncate(&r.postcode, 10),
            r.property_type.label(),
            r.bedrooms,
            r.bathrooms,
            fmt_money(r.actual),
            fmt_money(r.predicted),
            r.pct_error(),
        ));
    }
    out
}

pub fn format_search_results(hits: &[&AddressEntry]) -> String {
    if hits.is_empty() {
        return "No matching addresses.\n".to_string();
    }
    let mut out = String::new();
    for e in hits {
        out.push_str(&format!(
            "{:>6}  {:<40} {:<9} {}\n",
            e.id,
            truncate(&e.address, 40),
            e.postcode,
            e.region
        ));
    }
    out
}

/// `£1,234,567` (rounded to whole pounds).
pub fn fmt_money(v: f64) -> String {
    if !v.is_finite() {
        return "n/a".to_string();
    }
    let whole = v.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        format!("-£{grouped}")
    } else {
        format!("£{grouped}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_grouping() {
        assert_eq!(fmt_money(0.0), "£0");
        assert_eq!(fmt_money(999.4), "£999");
        assert_eq!(fmt_money(1_000.0), "£1,000");
        assert_eq!(fmt_money(250_000.0), "£250,000");
        assert_eq!(fmt_money(-1_234_567.0), "-£1,234,567");
        assert_eq!(fmt_money(f64::NAN), "n/a");
    }

    #[test]
    fn importance_bars_scale_to_largest() {
        let imps = vec![
            FeatureImportance {
                feature: "lat".to_string(),
                importance: 0.5,
            },
            FeatureImportance {
                feature: "bedrooms".to_string(),
                importance: 0.25,
            },
            FeatureImportance {
                feature: "flat".to_string(),
                importance: 0.0,
            },
        ];
        let text = format_importances(&imps);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1].matches('#').count(), IMPORTANCE_BAR_WIDTH);
        assert_eq!(lines[2].matches('#').count(), IMPORTANCE_BAR_WIDTH / 2);
        assert_eq!(lines[3].matches('#').count(), 0);
        assert!(lines[2].contains("25.00%"));
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long street name", 8), "a very .");
    }
}
