pub mod fields;
pub mod markup;
pub mod segment;

use tracing::warn;

use crate::db::{ScrapedPage, SplitPage};
use segment::HeadingPattern;

/// Two-pass split: case page HTML → plain text → sub-documents.
pub fn split_page(page: &ScrapedPage, pattern: &HeadingPattern) -> SplitPage {
    let text = markup::page_text(&page.html);
    let sub_documents = segment::split_sub_documents(&text, pattern);
    if sub_documents.is_empty() {
        warn!(
            "{}: no '{} No. <n>.<n>' headings, document left unsegmented",
            page.doc_name,
            pattern.label()
        );
    }
    SplitPage {
        page_data_id: page.page_data_id,
        doc_name: page.doc_name.clone(),
        sub_documents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupTable;
    use crate::parser::fields::DateMode;
    use crate::record::{assemble, Source};

    fn fixture_page() -> ScrapedPage {
        ScrapedPage {
            page_data_id: 1,
            doc_name: "006".into(),
            html: std::fs::read_to_string("tests/fixtures/swp_006.html").unwrap(),
        }
    }

    #[test]
    fn case_page_splits_per_heading() {
        let split = split_page(&fixture_page(), &HeadingPattern::default());
        let headings: Vec<_> = split.sub_documents.iter().map(|d| d.heading.as_str()).collect();
        assert_eq!(headings, ["SWP No. 6.1", "SWP No. 6.2", "SWP No. 6.3"]);
        assert!(split.sub_documents[0].body.contains("apprehend and bring before us"));
        assert!(!split.sub_documents[0].body.contains("As soon as she came near"));
    }

    #[test]
    fn page_without_containers_is_unsegmented() {
        let page = ScrapedPage {
            page_data_id: 2,
            doc_name: "404".into(),
            html: "<html><body><h1>Not Found</h1></body></html>".into(),
        };
        assert!(split_page(&page, &HeadingPattern::default()).sub_documents.is_empty());
    }

    #[test]
    fn case_page_end_to_end() {
        let pattern = HeadingPattern::default();
        let split = split_page(&fixture_page(), &pattern);
        let sources: Vec<Source> = split
            .sub_documents
            .into_iter()
            .map(|doc| Source::Split { doc_name: split.doc_name.clone(), doc })
            .collect();
        let lookup = LookupTable::from_path(std::path::Path::new("tests/fixtures/trials_index.csv"))
            .unwrap();

        let out = assemble(&sources, &lookup, &pattern, DateMode::First);
        assert_eq!(out.skipped, 0);
        let rows: Vec<_> = out
            .records
            .iter()
            .map(|r| {
                (
                    r.identifier.as_str(),
                    r.subject_or_topic.as_str(),
                    r.date.as_str(),
                    r.proceeding_type.as_str(),
                )
            })
            .collect();
        assert_eq!(
            rows,
            [
                ("6.1", "Bridget Bishop", "April 18, 1692", "Warrant"),
                ("6.2", "Bridget Bishop", "April 19, 1692", "Examination"),
                ("6.3", "Bridget Bishop", "", "Indictment"),
            ]
        );

        let all = assemble(&sources, &lookup, &pattern, DateMode::All);
        assert_eq!(all.records[0].date, "April 18, 1692, April 19, 1692");
    }
}
