use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

pub const DEFAULT_SERIES_LABEL: &str = "SWP";

static DEFAULT_PATTERN: LazyLock<HeadingPattern> = LazyLock::new(|| {
    HeadingPattern::new(DEFAULT_SERIES_LABEL).expect("default heading pattern compiles")
});

/// One heading and the text that follows it, up to the next heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDocument {
    pub heading: String,
    pub body: String,
}

/// Compiled forms of the `<Label> No. <major>.<minor>` heading grammar.
#[derive(Debug, Clone)]
pub struct HeadingPattern {
    label: String,
    /// Unanchored, for splitting running text.
    find: Regex,
    /// Anchored at line start, for locating the heading line of a stored file.
    line: Regex,
    /// Anchored on both ends with captures for the number parts.
    exact: Regex,
}

impl HeadingPattern {
    pub fn new(label: &str) -> Result<Self, regex::Error> {
        let body = format!(r"{} No\. ([0-9]+)\.([0-9]+)", regex::escape(label.trim()));
        Ok(HeadingPattern {
            label: label.trim().to_string(),
            find: Regex::new(&format!(r"(?i)\b{}", body))?,
            line: Regex::new(&format!(r"(?i)^{}", body))?,
            exact: Regex::new(&format!(r"(?i)^\s*{}\s*$", body))?,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Heading text at the start of `line`, if any.
    pub fn match_line<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.line.find(line).map(|m| m.as_str())
    }

    /// `(major, minor)` digit strings of a complete heading.
    pub fn parts<'a>(&self, heading: &'a str) -> Option<(&'a str, &'a str)> {
        let caps = self.exact.captures(heading)?;
        Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
    }
}

impl Default for HeadingPattern {
    fn default() -> Self {
        DEFAULT_PATTERN.clone()
    }
}

/// Split one document's text at every heading match.
///
/// Each body is the exact span between the end of its heading and the start
/// of the next one. Text before the first heading is not part of any
/// sub-document. No headings yields an empty vec; reporting that is left to
/// the caller.
pub fn split_sub_documents(text: &str, pattern: &HeadingPattern) -> Vec<SubDocument> {
    let matches: Vec<_> = pattern.find.find_iter(text).collect();
    let mut docs = Vec::with_capacity(matches.len());
    let mut seen: HashSet<String> = HashSet::new();

    for (i, m) in matches.iter().enumerate() {
        let end = matches.get(i + 1).map_or(text.len(), |next| next.start());
        let heading = m.as_str().trim().to_string();
        if !seen.insert(heading.clone()) {
            warn!("Duplicate heading '{}' in one document", heading);
        }
        docs.push(SubDocument {
            heading,
            body: text[m.end()..end].to_string(),
        });
    }

    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Vec<SubDocument> {
        split_sub_documents(text, &HeadingPattern::default())
    }

    #[test]
    fn one_sub_document_per_heading() {
        let text = "Intro\nSWP No. 6.1\n(Warrant for Arrest)\nbody one\nSWP No. 6.2\nbody two\nSWP No. 6.3\n";
        let docs = split(text);
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].heading, "SWP No. 6.1");
        assert_eq!(docs[1].heading, "SWP No. 6.2");
        assert_eq!(docs[2].heading, "SWP No. 6.3");
    }

    #[test]
    fn bodies_end_where_next_heading_starts() {
        let text = "SWP No. 1.1 alpha [May 31, 1692] SWP No. 1.2 beta";
        let docs = split(text);
        assert_eq!(docs[0].body, " alpha [May 31, 1692] ");
        assert_eq!(docs[1].body, " beta");
        let rebuilt: String = docs
            .iter()
            .map(|d| format!("{}{}", d.heading, d.body))
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn last_body_may_be_empty() {
        let docs = split("SWP No. 2.1 text SWP No. 2.2");
        assert_eq!(docs.len(), 2);
        assert!(docs[1].body.is_empty());
    }

    #[test]
    fn no_headings_is_empty() {
        assert!(split("A transcript with no case headings at all.").is_empty());
        assert!(split("").is_empty());
    }

    #[test]
    fn case_insensitive() {
        let docs = split("swp no. 3.1 lower\nSwp No. 3.2 mixed");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].heading, "swp no. 3.1");
    }

    #[test]
    fn near_misses_do_not_split() {
        let text = "SWP No. 4.1 body mentions (see SWP No. 4) and SWP No. abc and XSWP No. 9.9";
        let docs = split(text);
        assert_eq!(docs.len(), 1);
        assert!(docs[0].body.contains("SWP No. abc"));
        assert!(docs[0].body.contains("XSWP No. 9.9"));
    }

    #[test]
    fn custom_label_is_escaped() {
        let pattern = HeadingPattern::new("A.B").unwrap();
        let docs = split_sub_documents("A.B No. 1.1 x AxB No. 1.2 y", &pattern);
        assert_eq!(docs.len(), 1);
        assert_eq!(pattern.label(), "A.B");
    }

    #[test]
    fn heading_parts() {
        let p = HeadingPattern::default();
        assert_eq!(p.parts("  SWP No. 10.2 "), Some(("10", "2")));
        assert_eq!(p.parts("SWP No. abc"), None);
        // Arabic-Indic digits are not heading numbers.
        assert_eq!(p.parts("SWP No. \u{666}.\u{661}"), None);
        assert!(split("SWP No. \u{666}.\u{661} body").is_empty());
        assert_eq!(p.parts("SWP No. 10.2 trailing"), None);
        assert_eq!(p.match_line("SWP No. 5.1 (continued)"), Some("SWP No. 5.1"));
        assert_eq!(p.match_line("see SWP No. 5.1"), None);
    }
}
