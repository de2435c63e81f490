use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::parser::segment::SubDocument;
use crate::record::Source;

/// `SWP No. 6.1` -> `SWP_No__6_1`
pub fn safe_heading(heading: &str) -> String {
    heading.replace([' ', '.'], "_")
}

pub fn file_name(doc_name: &str, heading: &str) -> String {
    let doc_name = doc_name.replace([' ', '/', '\\'], "_").replace(':', "");
    format!("{}_{}.txt", doc_name, safe_heading(heading))
}

/// Write one sub-document as `heading`, blank line, trimmed body.
pub fn write_sub_document(dir: &Path, doc_name: &str, doc: &SubDocument) -> Result<PathBuf> {
    let path = dir.join(file_name(doc_name, &doc.heading));
    std::fs::write(&path, format!("{}\n\n{}", doc.heading, doc.body.trim()))
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

/// Readable sub-document files of a directory.
#[derive(Debug, Default)]
pub struct DirSources {
    pub sources: Vec<Source>,
    pub unreadable: usize,
}

/// Every `.txt` file in `dir`, sorted by file name.
///
/// Files that cannot be read as UTF-8 text are logged and counted.
pub fn read_dir(dir: &Path) -> Result<DirSources> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let mut out = DirSources::default();
    for path in paths {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping unreadable {:?}: {}", path, e);
                out.unreadable += 1;
                continue;
            }
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.sources.push(Source::File { name, content });
    }
    Ok(out)
}
