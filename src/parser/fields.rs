use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use super::segment::{HeadingPattern, SubDocument};

const STOP_WORDS: &[&str] = &["of", "for", "to", "from", "pertaining"];

const MONTH: &str = r"(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\.?";

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\[(\s*\+{{0,2}}\s*{}(?:\s+[0-9]{{1,2}})?(?:\s*,\s*|\s+)[0-9]{{4}}(?:/[0-9]{{1,2}})?[\s?.,;:!]*)\]",
        MONTH
    ))
    .unwrap()
});
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// How many bracketed dates to keep from one body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DateMode {
    /// Only the first bracketed date.
    #[default]
    First,
    /// Every bracketed date, comma-joined in document order.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    pub identifier: String,
    pub normalized_id: String,
    pub proceeding_type: String,
    pub date: String,
    pub text: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no heading line found")]
    HeadingNotFound,
    #[error("heading '{0}' does not carry a <major>.<minor> number")]
    MalformedHeading(String),
}

pub fn extract(
    doc: &SubDocument,
    pattern: &HeadingPattern,
    mode: DateMode,
) -> Result<ExtractedFields, ExtractError> {
    let (major, minor) = pattern
        .parts(&doc.heading)
        .ok_or_else(|| ExtractError::MalformedHeading(doc.heading.clone()))?;

    let lines: Vec<&str> = doc
        .body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    Ok(ExtractedFields {
        identifier: format!("{}.{}", major, minor),
        normalized_id: normalize_id(major).unwrap_or_default(),
        proceeding_type: lines.first().map(|l| proceeding_type(l)).unwrap_or_default(),
        date: extract_date(&doc.body, mode),
        text: lines.join(" "),
    })
}

/// Legacy single-file mode: locate the heading line in stored text first.
///
/// Everything after the first line that starts with a heading becomes the
/// body; anything before it is ignored.
pub fn extract_from_text(
    content: &str,
    pattern: &HeadingPattern,
    mode: DateMode,
) -> Result<ExtractedFields, ExtractError> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let (idx, heading) = lines
        .iter()
        .enumerate()
        .find_map(|(i, l)| pattern.match_line(l).map(|h| (i, h)))
        .ok_or(ExtractError::HeadingNotFound)?;

    let doc = SubDocument {
        heading: heading.to_string(),
        body: lines[idx + 1..].join("\n"),
    };
    extract(&doc, pattern, mode)
}

/// Zero-pad the first run of digits in `raw` to three places.
///
/// Leading zeros beyond the pad width are dropped, so an already normalized
/// id maps to itself.
pub fn normalize_id(raw: &str) -> Option<String> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let digits: &str = raw[start..]
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or_default();
    let significant = digits.trim_start_matches('0');
    let significant = if significant.is_empty() { "0" } else { significant };
    Some(format!("{:0>3}", significant))
}

/// Reduce the line under a heading to a one-word proceeding label.
pub fn proceeding_type(line: &str) -> String {
    let cleaned = line.replace(['(', ')'], " ");
    let Some(word) = cleaned
        .split_whitespace()
        .find(|w| !STOP_WORDS.iter().any(|s| s.eq_ignore_ascii_case(w)))
    else {
        return String::new();
    };
    capitalize(word)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

pub fn extract_date(body: &str, mode: DateMode) -> String {
    let mut dates = DATE_RE.captures_iter(body).filter_map(|c| {
        let cleaned = clean_date(c.get(1)?.as_str());
        (!cleaned.is_empty()).then_some(cleaned)
    });
    match mode {
        DateMode::First => dates.next().unwrap_or_default(),
        DateMode::All => dates.collect::<Vec<_>>().join(", "),
    }
}

fn clean_date(inner: &str) -> String {
    let stripped = inner
        .trim()
        .trim_start_matches('+')
        .trim_end_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    SPACES_RE.replace_all(stripped.trim(), " ").to_string()
}
