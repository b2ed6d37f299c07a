//! Feature Builder.
//!
//! A schema is an ordered list of named derivations. The four schemas nest:
//! `base ⊂ geo_expanded ⊂ interactions ⊂ temporal`, so a column's position never
//! depends on which larger schema it ends up in.
//!
//! The same derivations serve training (from a [`NormalizedTransaction`]) and
//! inference (from a [`ValuationQuery`]); at inference time there is no sale date,
//! so the temporal terms use the service year and a zero offset.

use crate::domain::{
    Coordinates, FeatureSetKind, NormalizedTransaction, PropertyType, ValuationQuery,
};
use crate::error::ValuationError;

/// Inputs shared by every derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureInput {
    pub bedrooms: f64,
    pub bathrooms: f64,
    pub property_type: PropertyType,
    pub latitude: f64,
    pub longitude: f64,
    pub sale_year: f64,
    pub years_since_sale: f64,
}

impl FeatureInput {
    pub fn from_transaction(tx: &NormalizedTransaction) -> Self {
        use chrono::Datelike;
        let r = &tx.record;
        Self {
            bedrooms: f64::from(r.bedrooms),
            bathrooms: f64::from(r.bathrooms),
            property_type: r.property_type,
            latitude: r.latitude,
            longitude: r.longitude,
            sale_year: f64::from(r.sale_date.year()),
            years_since_sale: tx.years_since_sale,
        }
    }

    /// Query mode: "sold" in `service_year`, zero years ago.
    pub fn from_query(query: &ValuationQuery, service_year: i32) -> Self {
        Self {
            bedrooms: f64::from(query.bedrooms),
            bathrooms: f64::from(query.bathrooms),
            property_type: query.property_type,
            latitude: query.location.latitude,
            longitude: query.location.longitude,
            sale_year: f64::from(service_year),
            years_since_sale: 0.0,
        }
    }
}

/// Values a derivation may need that are not part of the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureContext {
    pub reference_point: Coordinates,
}

/// One named column.
pub struct FeatureDef {
    pub name: &'static str,
    pub derive: fn(&FeatureInput, &FeatureContext) -> f64,
}

impl std::fmt::Debug for FeatureDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureDef").field("name", &self.name).finish()
    }
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

const BASE: &[FeatureDef] = &[
    FeatureDef { name: "bedrooms", derive: |x, _| x.bedrooms },
    FeatureDef { name: "bathrooms", derive: |x, _| x.bathrooms },
    FeatureDef {
        name: "detached",
        derive: |x, _| flag(x.property_type == PropertyType::Detached),
    },
    FeatureDef {
        name: "semi_detached",
        derive: |x, _| flag(x.property_type == PropertyType::SemiDetached),
    },
    FeatureDef {
        name: "terraced",
        derive: |x, _| flag(x.property_type == PropertyType::Terraced),
    },
    FeatureDef {
        name: "flat",
        derive: |x, _| flag(x.property_type == PropertyType::Flat),
    },
    FeatureDef { name: "lat", derive: |x, _| x.latitude },
    FeatureDef { name: "lon", derive: |x, _| x.longitude },
];

const GEO: &[FeatureDef] = &[
    FeatureDef { name: "lat2", derive: |x, _| x.latitude * x.latitude },
    FeatureDef { name: "lon2", derive: |x, _| x.longitude * x.longitude },
    FeatureDef { name: "lat_lon", derive: |x, _| x.latitude * x.longitude },
    FeatureDef {
        name: "dist_ref",
        derive: |x, ctx| {
            let dlat = x.latitude - ctx.reference_point.latitude;
            let dlon = x.longitude - ctx.reference_point.longitude;
            (dlat * dlat + dlon * dlon).sqrt()
        },
    },
];

const INTERACTIONS: &[FeatureDef] = &[
    FeatureDef { name: "beds_x_baths", derive: |x, _| x.bedrooms * x.bathrooms },
    FeatureDef {
        name: "beds_x_detached",
        derive: |x, _| x.bedrooms * flag(x.property_type == PropertyType::Detached),
    },
    FeatureDef { name: "total_rooms", derive: |x, _| x.bedrooms + x.bathrooms },
];

const TEMPORAL: &[FeatureDef] = &[
    FeatureDef { name: "sale_year", derive: |x, _| x.sale_year },
    FeatureDef { name: "years_since_sale", derive: |x, _| x.years_since_sale },
];

const BASE_SET: &[&[FeatureDef]] = &[BASE];
const GEO_SET: &[&[FeatureDef]] = &[BASE, GEO];
const INTERACTIONS_SET: &[&[FeatureDef]] = &[BASE, GEO, INTERACTIONS];
const TEMPORAL_SET: &[&[FeatureDef]] = &[BASE, GEO, INTERACTIONS, TEMPORAL];

/// The derivation groups that make up `kind`, in column order.
fn groups(kind: FeatureSetKind) -> &'static [&'static [FeatureDef]] {
    match kind {
        FeatureSetKind::Base => BASE_SET,
        FeatureSetKind::GeoExpanded => GEO_SET,
        FeatureSetKind::Interactions => INTERACTIONS_SET,
        FeatureSetKind::Temporal => TEMPORAL_SET,
    }
}

fn schema(kind: FeatureSetKind) -> impl Iterator<Item = &'static FeatureDef> {
    groups(kind).iter().flat_map(|g| g.iter())
}

fn lookup(name: &str) -> Option<&'static FeatureDef> {
    schema(FeatureSetKind::Temporal).find(|d| d.name == name)
}

/// Ordered column names for a schema.
pub fn column_names(kind: FeatureSetKind) -> Vec<String> {
    schema(kind).map(|d| d.name.to_string()).collect()
}

/// An ordered, named feature row.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fail unless this vector's names are exactly `columns`, in order.
    pub fn ensure_matches(&self, columns: &[String]) -> Result<(), ValuationError> {
        if self.names.len() != columns.len() || self.values.len() != columns.len() {
            return Err(ValuationError::FeatureMismatch(format!(
                "expected {} columns, got {}",
                columns.len(),
                self.values.len()
            )));
        }
        if let Some((i, (got, want))) = self
            .names
            .iter()
            .zip(columns)
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(ValuationError::FeatureMismatch(format!(
                "column {i} is '{got}', model expects '{want}'"
            )));
        }
        Ok(())
    }
}

/// Build the feature row for `kind`.
pub fn build(input: &FeatureInput, kind: FeatureSetKind, ctx: &FeatureContext) -> FeatureVector {
    let (names, values) = schema(kind)
        .map(|d| (d.name.to_string(), (d.derive)(input, ctx)))
        .unzip();
    FeatureVector { names, values }
}

/// Build a row following a persisted column list.
pub fn build_for_columns(
    input: &FeatureInput,
    columns: &[String],
    ctx: &FeatureContext,
) -> Result<FeatureVector, ValuationError> {
    let mut values = Vec::with_capacity(columns.len());
    for name in columns {
        let def = lookup(name).ok_or_else(|| {
            ValuationError::CorruptArtifact(format!("unknown feature column '{name}'"))
        })?;
        values.push((def.derive)(input, ctx));
    }
    Ok(FeatureVector {
        names: columns.to_vec(),
        values,
    })
}

/// Design matrix rows for a batch of training records.
pub fn build_matrix(
    records: &[NormalizedTransaction],
    kind: FeatureSetKind,
    ctx: &FeatureContext,
) -> Vec<Vec<f64>> {
    records
        .iter()
        .map(|tx| build(&FeatureInput::from_transaction(tx), kind, ctx).values)
        .collect()
}
