//! Address directory: a small CSV of known addresses with coordinates.
//!
//! Columns: `id,address,postcode,latitude,longitude,region`.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::Coordinates;
use crate::error::ValuationError;

/// Upper bound on search results.
pub const MAX_SEARCH_RESULTS: usize = 50;
/// Shorter queries return nothing.
pub const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub id: u64,
    pub address: String,
    pub postcode: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub region: String,
}

impl AddressEntry {
    pub fn location(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// `"12 High St (PO1 3AX)"`.
    pub fn display(&self) -> String {
        format!("{} ({})", self.address, self.postcode)
    }
}

pub trait AddressDirectory {
    fn get(&self, id: u64) -> Option<&AddressEntry>;

    /// Case-insensitive substring match on address or postcode, ordered by
    /// address, at most `limit` results.
    fn search(&self, query: &str, limit: usize) -> Vec<&AddressEntry>;
}

/// In-memory directory loaded from CSV.
#[derive(Debug, Clone, Default)]
pub struct CsvAddressDirectory {
    entries: Vec<AddressEntry>,
    by_id: HashMap<u64, usize>,
}

impl CsvAddressDirectory {
    pub fn load(path: &Path) -> Result<Self, ValuationError> {
        let file = File::open(path).map_err(|e| {
            ValuationError::InvalidInput(format!(
                "failed to open address directory '{}': {e}",
                path.display()
            ))
        })?;
        let dir = Self::from_reader(file)?;
        info!(path = %path.display(), entries = dir.len(), "loaded address directory");
        Ok(dir)
    }

    /// Rows that fail to parse are skipped with a warning.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ValuationError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries: Vec<AddressEntry> = Vec::new();
        let mut seen = HashSet::new();
        let mut skipped = 0usize;
        let mut duplicates = 0usize;
        for result in reader.deserialize::<AddressEntry>() {
            match result {
                // First row in the file wins on duplicate ids.
                Ok(entry) if entry.location().is_finite() => {
                    if seen.insert(entry.id) {
                        entries.push(entry);
                    } else {
                        duplicates += 1;
                    }
                }
                Ok(_) | Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "skipped unreadable address directory rows");
        }
        if duplicates > 0 {
            warn!(duplicates, "ignored address directory rows with a repeated id");
        }

        entries.sort_by(|a, b| a.address.cmp(&b.address).then(a.id.cmp(&b.id)));
        let by_id = entries.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
        Ok(Self { entries, by_id })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AddressDirectory for CsvAddressDirectory {
    fn get(&self, id: u64) -> Option<&AddressEntry> {
        self.by_id.get(&id).map(|&i| &self.entries[i])
    }

    fn search(&self, query: &str, limit: usize) -> Vec<&AddressEntry> {
        let needle = query.trim().to_lowercase();
        if needle.chars().count() < MIN_QUERY_LEN {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| {
                e.address.to_lowercase().contains(&needle) || e.postcode.to_lowercase().contains(&needle)
            })
            .take(limit.min(MAX_SEARCH_RESULTS))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
id,address,postcode,latitude,longitude,region
3,12 High Street,PO1 3AX,50.7986,-1.0919,South East
1,Flat 4 Albert Road,PO5 2SE,50.7862,-1.0830,South East
2,7 Elm Grove,PO5 1JT,50.7901,-1.0884,South East
9,Broken Row,PO1 1AA,not-a-number,-1.0,South East
";

    fn dir() -> CsvAddressDirectory {
        CsvAddressDirectory::from_reader(CSV.as_bytes()).unwrap()
    }

    #[test]
    fn loads_and_looks_up_by_id() {
        let d = dir();
        assert_eq!(d.len(), 3);
        let e = d.get(2).unwrap();
        assert_eq!(e.address, "7 Elm Grove");
        assert_eq!(e.display(), "7 Elm Grove (PO5 1JT)");
        assert!(d.get(9).is_none());
    }

    #[test]
    fn search_is_case_insensitive_and_ordered() {
        let d = dir();
        let hits: Vec<u64> = d.search("po5", 50).iter().map(|e| e.id).collect();
        assert_eq!(hits, vec![2, 1]);
        let hits = d.search("HIGH", 50);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 3);
    }

    #[test]
    fn search_limits_and_short_queries() {
        let d = dir();
        assert_eq!(d.search("po", 1).len(), 1);
        assert!(d.search("p", 50).is_empty());
        assert_eq!(d.search("po", 500).len(), 3);
    }

    #[test]
    fn first_row_in_file_wins_on_duplicate_ids() {
        let csv = "\
id,address,postcode,latitude,longitude,region
5,Zetland Road,PO4 1AA,50.78,-1.07,South East
5,Albert Road,PO5 2SE,50.79,-1.08,South East
";
        let d = CsvAddressDirectory::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.get(5).map(|e| e.address.as_str()), Some("Zetland Road"));
        assert!(d.search("albert", 50).is_empty());
    }
}
