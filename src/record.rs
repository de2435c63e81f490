use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::lookup::LookupTable;
use crate::parser::fields::{self, DateMode, ExtractedFields};
use crate::parser::segment::{HeadingPattern, SubDocument};

static ID_PARTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)\.([0-9]+)").unwrap());

/// Sort key for identifiers that do not parse; orders after every real one.
pub const SENTINEL_KEY: (u64, u64) = (u64::MAX, u64::MAX);

/// One output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    #[serde(rename = "Identifier")]
    pub identifier: String,
    #[serde(rename = "Subject_or_Topic")]
    pub subject_or_topic: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Proceeding_Type")]
    pub proceeding_type: String,
    #[serde(rename = "Text")]
    pub text: String,
}

impl Record {
    pub fn from_fields(fields: ExtractedFields, lookup: &LookupTable) -> Self {
        let subject_or_topic = lookup.resolve(&fields.normalized_id).to_string();
        if subject_or_topic.is_empty() {
            debug!("No subject for {} (key {})", fields.identifier, fields.normalized_id);
        }
        Record {
            identifier: fields.identifier,
            subject_or_topic,
            date: fields.date,
            proceeding_type: fields.proceeding_type,
            text: fields.text,
        }
    }
}

/// Where a sub-document's text comes from.
#[derive(Debug, Clone)]
pub enum Source {
    Split { doc_name: String, doc: SubDocument },
    /// Stored `heading\n\nbody` text of a single sub-document.
    File { name: String, content: String },
}

impl Source {
    fn name(&self) -> String {
        match self {
            Source::Split { doc_name, doc } => format!("{}/{}", doc_name, doc.heading),
            Source::File { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Assembly {
    pub records: Vec<Record>,
    pub skipped: usize,
}

/// Extract, resolve and order every source.
///
/// Sources that fail extraction are logged and counted, never fatal.
pub fn assemble(
    sources: &[Source],
    lookup: &LookupTable,
    pattern: &HeadingPattern,
    mode: DateMode,
) -> Assembly {
    let results: Vec<_> = sources
        .par_iter()
        .map(|src| {
            let extracted = match src {
                Source::Split { doc, .. } => fields::extract(doc, pattern, mode),
                Source::File { content, .. } => fields::extract_from_text(content, pattern, mode),
            };
            extracted.map(|f| Record::from_fields(f, lookup))
        })
        .collect();

    let mut assembly = Assembly::default();
    for (src, result) in sources.iter().zip(results) {
        match result {
            Ok(record) => {
                if record.proceeding_type.is_empty() {
                    debug!("{}: no proceeding type line", src.name());
                }
                if record.date.is_empty() {
                    debug!("{}: no bracketed date", src.name());
                }
                assembly.records.push(record);
            }
            Err(e) => {
                warn!("Skipping {}: {}", src.name(), e);
                assembly.skipped += 1;
            }
        }
    }

    sort_records(&mut assembly.records);
    assembly
}

/// Numeric `(major, minor)` of an identifier, or [`SENTINEL_KEY`].
pub fn sort_key(identifier: &str) -> (u64, u64) {
    ID_PARTS_RE
        .captures(identifier)
        .and_then(|c| Some((c[1].parse().ok()?, c[2].parse().ok()?)))
        .unwrap_or(SENTINEL_KEY)
}

pub fn sort_records(records: &mut [Record]) {
    records.sort_by_key(|r| sort_key(&r.identifier));
}

pub fn write_csv(path: &Path, records: &[Record]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("Failed to open {:?}", path))?;
    if records.is_empty() {
        wtr.write_record(["Identifier", "Subject_or_Topic", "Date", "Proceeding_Type", "Text"])?;
    }
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(doc_name: &str, heading: &str, body: &str) -> Source {
        Source::Split {
            doc_name: doc_name.to_string(),
            doc: SubDocument {
                heading: heading.to_string(),
                body: body.to_string(),
            },
        }
    }

    fn run(sources: &[Source]) -> Assembly {
        let lookup = LookupTable::from_rows([("SWP No. 2", "Sarah Good"), ("10", "Martha Corey")]);
        assemble(sources, &lookup, &HeadingPattern::default(), DateMode::First)
    }

    #[test]
    fn orders_numerically() {
        let out = run(&[
            split("010", "SWP No. 10.2", "\n(Indictment)\n"),
            split("002", "SWP No. 2.1", "\n(Warrant)\n"),
            split("010", "SWP No. 10.1", "\n(Complaint)\n"),
        ]);
        let ids: Vec<_> = out.records.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, ["2.1", "10.1", "10.2"]);
        assert_eq!(out.records[0].subject_or_topic, "Sarah Good");
        assert_eq!(out.records[1].subject_or_topic, "Martha Corey");
        assert_eq!(out.skipped, 0);
    }

    #[test]
    fn malformed_headings_are_dropped() {
        let out = run(&[
            split("002", "SWP No. 2.1", "body"),
            split("002", "SWP No. abc", "body"),
            Source::File {
                name: "stray.txt".into(),
                content: "no heading".into(),
            },
        ]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.skipped, 2);
    }

    #[test]
    fn unresolved_subject_is_empty() {
        let out = run(&[split("999", "SWP No. 999.1", "\n(Petition)\n")]);
        assert_eq!(out.records[0].subject_or_topic, "");
        assert_eq!(out.records[0].proceeding_type, "Petition");
    }

    #[test]
    fn sort_key_sentinel() {
        assert_eq!(sort_key("2.1"), (2, 1));
        assert_eq!(sort_key("SWP No. 10.02"), (10, 2));
        assert_eq!(sort_key("abc"), SENTINEL_KEY);
        assert_eq!(sort_key("\u{666}.\u{661}"), SENTINEL_KEY);
        assert_eq!(sort_key(""), SENTINEL_KEY);
    }

    #[test]
    fn sort_is_stable_with_unparsable_last() {
        let rec = |id: &str, text: &str| Record {
            identifier: id.into(),
            subject_or_topic: String::new(),
            date: String::new(),
            proceeding_type: String::new(),
            text: text.into(),
        };
        let mut records = vec![
            rec("x", "first bad"),
            rec("3.1", "a"),
            rec("y", "second bad"),
            rec("3.1", "b"),
            rec("1.9", "c"),
        ];
        sort_records(&mut records);
        let texts: Vec<_> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, ["c", "a", "b", "first bad", "second bad"]);
    }

    #[test]
    fn csv_has_fixed_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/trials.csv");
        let out = run(&[split("002", "SWP No. 2.1", "\n(Warrant for Arrest)\n[May 31, 1692]\n")]);
        write_csv(&path, &out.records).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some("Identifier,Subject_or_Topic,Date,Proceeding_Type,Text")
        );
        assert_eq!(
            lines.next(),
            Some(r#"2.1,Sarah Good,"May 31, 1692",Warrant,"(Warrant for Arrest) [May 31, 1692]""#)
        );
    }

    #[test]
    fn csv_header_without_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_csv(&path, &[]).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.trim_end(), "Identifier,Subject_or_Topic,Date,Proceeding_Type,Text");
    }
}
