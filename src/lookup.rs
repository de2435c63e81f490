use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::parser::fields::normalize_id;

/// Header spellings accepted for the identifier column, in priority order.
const ID_HEADERS: &[&str] = &[
    "SWP_No",
    "SWP No",
    "SWP_NO",
    "swp_no",
    "Swp_No",
    "SWP",
    "swp",
    "Identifier",
    "identifier",
];

/// Substrings accepted for the name/topic column, in priority order.
const NAME_HEADER_PARTS: &[&str] = &["Accused", "Topic"];

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to read lookup table: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed lookup table: {0}")]
    Csv(#[from] csv::Error),
    #[error("lookup table has no {category} column (headers: {headers:?})")]
    MissingColumn {
        category: &'static str,
        headers: Vec<String>,
    },
}

/// Read-only `normalized id -> subject/topic` table.
#[derive(Debug, Default, Clone)]
pub struct LookupTable {
    names: HashMap<String, String>,
}

impl LookupTable {
    pub fn from_path(path: &Path) -> Result<Self, LookupError> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        info!("Loaded {} lookup keys from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LookupError> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let (id_col, name_col) = resolve_columns(&headers)?;

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push((
                record.get(id_col).unwrap_or_default().to_string(),
                record.get(name_col).unwrap_or_default().to_string(),
            ));
        }
        Ok(Self::from_rows(rows))
    }

    /// Build from raw `(identifier cell, name cell)` pairs.
    ///
    /// Rows whose identifier has no digits are skipped. The first row for a
    /// key wins.
    pub fn from_rows<I, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut names = HashMap::new();
        let mut skipped = 0usize;
        for (raw_id, name) in rows {
            match normalize_id(raw_id.as_ref()) {
                Some(key) => {
                    names.entry(key).or_insert_with(|| name.into().trim().to_string());
                }
                None => {
                    debug!("Lookup row '{}' has no digits, skipped", raw_id.as_ref());
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            debug!("{} lookup rows without a usable identifier", skipped);
        }
        LookupTable { names }
    }

    /// Subject or topic for `normalized_id`; "" when unknown.
    pub fn resolve(&self, normalized_id: &str) -> &str {
        self.names.get(normalized_id).map_or("", String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Column indices of the identifier and name/topic columns.
fn resolve_columns(headers: &[String]) -> Result<(usize, usize), LookupError> {
    let id_col = ID_HEADERS
        .iter()
        .find_map(|cand| headers.iter().position(|h| h.trim() == *cand))
        .ok_or_else(|| LookupError::MissingColumn {
            category: "identifier",
            headers: headers.to_vec(),
        })?;

    let name_col = NAME_HEADER_PARTS
        .iter()
        .find_map(|part| headers.iter().position(|h| h.contains(*part)))
        .ok_or_else(|| LookupError::MissingColumn {
            category: "name/topic",
            headers: headers.to_vec(),
        })?;

    Ok((id_col, name_col))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_padded_ids() {
        let table = LookupTable::from_rows([("SWP No. 5", "Bridget Bishop")]);
        assert_eq!(table.resolve("005"), "Bridget Bishop");
        assert_eq!(table.resolve("999"), "");
    }

    #[test]
    fn rows_without_digits_are_skipped() {
        let table = LookupTable::from_rows([("Misc", "Miscellaneous"), ("12", "Martha Corey")]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("012"), "Martha Corey");
    }

    #[test]
    fn first_row_wins() {
        let table = LookupTable::from_rows([("044", "Sarah Good"), ("044a", "Sarah Good (cont.)")]);
        assert_eq!(table.resolve("044"), "Sarah Good");
    }

    #[test]
    fn column_priority_is_fixed() {
        let h = headers(&["Topic", "swp", "Accused_Name", "SWP_No"]);
        assert_eq!(resolve_columns(&h).unwrap(), (3, 2));
        let h = headers(&["Case Topic", "Identifier"]);
        assert_eq!(resolve_columns(&h).unwrap(), (1, 0));
    }

    #[test]
    fn missing_identifier_column_is_fatal() {
        let csv = "Number,Accused_Name_or_Topic\n5,Bridget Bishop\n";
        let err = LookupTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, LookupError::MissingColumn { category: "identifier", .. }));
    }

    #[test]
    fn missing_name_column_is_fatal() {
        let csv = "SWP_No,accused\n5,Bridget Bishop\n";
        let err = LookupTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, LookupError::MissingColumn { category: "name/topic", .. }));
    }

    #[test]
    fn index_fixture() {
        let table = LookupTable::from_path(Path::new("tests/fixtures/trials_index.csv")).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.resolve("006"), "Bridget Bishop");
        assert_eq!(table.resolve("044"), "Sarah Good");
        assert_eq!(table.resolve("181"), "Estate of George Jacobs Sr.");
    }
}
