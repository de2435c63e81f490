use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{info, warn};

const ANCHOR_TEXT: &str = "Salem Witchcraft Papers";
const FATE_TERMS: &[&str] = &["Executed", "Died", "Pressed"];

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SWP No\. ([0-9]+[a-z]?):\s*(.*)$").unwrap());
static OUTLINE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, strong, ul").unwrap());
static ITEM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").unwrap());
static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// One case file listed on the series index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    #[serde(rename = "SWP_No")]
    pub swp_no: String,
    #[serde(rename = "Accused_Name_or_Topic")]
    pub accused_or_topic: String,
    #[serde(rename = "Fate")]
    pub fate: String,
    #[serde(rename = "Trial_Document_URL")]
    pub url: String,
}

/// Fetch the series index page and return its case entries.
pub async fn fetch_index(index_url: &str, base_url: &str) -> Result<Vec<IndexEntry>> {
    let client = reqwest::Client::new();

    info!("Fetching series index: {}", index_url);
    let html = client
        .get(index_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .context("Failed to fetch series index")?;

    let entries = parse_index(&html, base_url)?;
    info!("Case files listed: {}", entries.len());
    Ok(entries)
}

/// Read the first list that follows the series heading.
pub fn parse_index(html: &str, base_url: &str) -> Result<Vec<IndexEntry>> {
    let doc = Html::parse_document(html);
    let mut seen_anchor = false;
    let mut list = None;

    for el in doc.select(&OUTLINE_SELECTOR) {
        if !seen_anchor {
            seen_anchor = el.value().name() != "ul" && element_text(&el).contains(ANCHOR_TEXT);
        } else if el.value().name() == "ul" {
            list = Some(el);
            break;
        }
    }

    if !seen_anchor {
        bail!("No heading containing '{}' on the index page", ANCHOR_TEXT);
    }
    let Some(list) = list else {
        bail!("No list follows the '{}' heading", ANCHOR_TEXT);
    };

    let entries: Vec<IndexEntry> = list
        .select(&ITEM_SELECTOR)
        .filter_map(|li| parse_item(&li, base_url))
        .collect();
    if entries.is_empty() {
        bail!("The case list has no linked items");
    }
    Ok(entries)
}

fn parse_item(li: &ElementRef, base_url: &str) -> Option<IndexEntry> {
    let Some(link) = li.select(&LINK_SELECTOR).next() else {
        warn!("Index item without a link: {}", element_text(li));
        return None;
    };
    let link_text = element_text(&link);
    let href = link.value().attr("href").unwrap_or_default();

    let (swp_no, accused_or_topic) = match ENTRY_RE.captures(&link_text) {
        Some(caps) => (caps[1].to_string(), caps[2].trim().to_string()),
        None if link_text.contains("SWP No.") => (
            link_text
                .split(':')
                .next()
                .unwrap_or_default()
                .replace("SWP No. ", "")
                .trim()
                .to_string(),
            link_text.clone(),
        ),
        None => (link_text.clone(), link_text.clone()),
    };

    let description = element_text(li).replacen(&link_text, "", 1).trim().to_string();
    let fate = if FATE_TERMS.iter().any(|t| description.contains(t)) {
        description
    } else {
        String::new()
    };

    Some(IndexEntry {
        swp_no,
        accused_or_topic,
        fate,
        url: absolute_url(base_url, href),
    })
}

/// Text nodes trimmed and joined by single spaces.
fn element_text(el: &ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            href.trim_start_matches('/')
        )
    }
}

/// Write the entries as the lookup table CSV.
pub fn write_lookup_csv(path: &Path, entries: &[IndexEntry]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("Failed to open {:?}", path))?;
    for entry in entries {
        wtr.serialize(entry)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupTable;

    const BASE: &str = "https://salem.lib.virginia.edu";

    #[test]
    fn index_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/swp_index.html").unwrap();
        let entries = parse_index(&html, BASE).unwrap();
        assert_eq!(entries.len(), 4);

        assert_eq!(entries[0].swp_no, "006");
        assert_eq!(entries[0].accused_or_topic, "Bridget Bishop");
        assert_eq!(entries[0].fate, "Executed, June 10, 1692");
        assert_eq!(entries[0].url, "https://salem.lib.virginia.edu/n6.html");

        assert_eq!(entries[1].swp_no, "044a");
        assert_eq!(entries[1].fate, "");

        assert_eq!(entries[3].swp_no, "Miscellaneous Papers");
        assert_eq!(entries[3].fate, "Died in prison");
    }

    #[test]
    fn missing_anchor_or_list() {
        assert!(parse_index("<ul><li><a href='/x'>SWP No. 1: A</a></li></ul>", BASE).is_err());
        assert!(parse_index("<h2>Salem Witchcraft Papers</h2><p>none</p>", BASE).is_err());
        assert!(parse_index("<h2>Salem Witchcraft Papers</h2><ul><li>x</li></ul>", BASE).is_err());
    }

    #[test]
    fn loose_link_text() {
        let html = "<strong>Salem Witchcraft Papers</strong><ul>\
            <li><a href='https://example.org/a'>SWP No. 12 Martha Corey</a></li></ul>";
        let entries = parse_index(html, BASE).unwrap();
        assert_eq!(entries[0].swp_no, "12 Martha Corey");
        assert_eq!(entries[0].accused_or_topic, "SWP No. 12 Martha Corey");
        assert_eq!(entries[0].url, "https://example.org/a");
    }

    #[test]
    fn written_csv_loads_as_lookup() {
        let html = std::fs::read_to_string("tests/fixtures/swp_index.html").unwrap();
        let entries = parse_index(&html, BASE).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata/trials_index.csv");
        write_lookup_csv(&path, &entries).unwrap();

        let table = LookupTable::from_path(&path).unwrap();
        assert_eq!(table.resolve("006"), "Bridget Bishop");
        assert_eq!(table.resolve("044"), "Sarah Good");
        assert_eq!(table.len(), 3);
    }
}
