use std::sync::LazyLock;

use scraper::{Html, Selector};

static DOC_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.doc").unwrap());

/// Plain text of every `div.doc` container on a case page.
///
/// Text nodes are trimmed and blank ones dropped, one per line; containers
/// are separated by a blank line. A page without containers gives "".
pub fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    doc.select(&DOC_SELECTOR)
        .map(|div| {
            div.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
