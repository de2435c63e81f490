use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::index::IndexEntry;
use crate::parser::segment::SubDocument;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            swp_no     TEXT NOT NULL,
            accused    TEXT NOT NULL,
            fate       TEXT NOT NULL DEFAULT '',
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);

        CREATE TABLE IF NOT EXISTS page_data (
            id         INTEGER PRIMARY KEY,
            page_id    INTEGER NOT NULL REFERENCES pages(id),
            url        TEXT NOT NULL,
            doc_name   TEXT NOT NULL,
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            split      BOOLEAN NOT NULL DEFAULT 0,
            scraped_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_split ON page_data(split);

        CREATE TABLE IF NOT EXISTS sub_documents (
            id           INTEGER PRIMARY KEY,
            page_data_id INTEGER NOT NULL REFERENCES page_data(id),
            doc_name     TEXT NOT NULL,
            position     INTEGER NOT NULL,
            heading      TEXT NOT NULL,
            body         TEXT NOT NULL,
            UNIQUE(page_data_id, position)
        );
        CREATE INDEX IF NOT EXISTS idx_sub_documents_doc ON sub_documents(doc_name);

        CREATE TABLE IF NOT EXISTS export_runs (
            run_id      TEXT PRIMARY KEY,
            started_at  TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            documents   INTEGER NOT NULL,
            records     INTEGER NOT NULL,
            skipped     INTEGER NOT NULL,
            output      TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

// ── Queue ──

pub fn insert_pages(conn: &Connection, entries: &[IndexEntry]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO pages (url, swp_no, accused, fate) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for e in entries {
            count += stmt.execute(rusqlite::params![e.url, e.swp_no, e.accused_or_topic, e.fate])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub struct QueuedPage {
    pub page_id: i64,
    pub url: String,
    pub swp_no: String,
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<QueuedPage>> {
    let sql = format!(
        "SELECT id, url, swp_no FROM pages WHERE visited = 0 ORDER BY id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(QueuedPage {
                page_id: row.get(0)?,
                url: row.get(1)?,
                swp_no: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct ScrapeRow {
    pub page_id: i64,
    pub url: String,
    pub doc_name: String,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

// ── Splitting ──

pub struct ScrapedPage {
    pub page_data_id: i64,
    pub doc_name: String,
    pub html: String,
}

pub fn fetch_unsplit(conn: &Connection, limit: Option<usize>) -> Result<Vec<ScrapedPage>> {
    let sql = format!(
        "SELECT id, doc_name, html FROM page_data
         WHERE html IS NOT NULL AND split = 0
         ORDER BY id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ScrapedPage {
                page_data_id: row.get(0)?,
                doc_name: row.get(1)?,
                html: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct SplitPage {
    pub page_data_id: i64,
    pub doc_name: String,
    pub sub_documents: Vec<SubDocument>,
}

/// Store sub-documents and mark their pages split, replacing earlier splits.
pub fn save_sub_documents(conn: &Connection, pages: &[SplitPage]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut clear = tx.prepare("DELETE FROM sub_documents WHERE page_data_id = ?1")?;
        let mut insert = tx.prepare(
            "INSERT INTO sub_documents (page_data_id, doc_name, position, heading, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let mut mark = tx.prepare("UPDATE page_data SET split = 1 WHERE id = ?1")?;
        for page in pages {
            clear.execute([page.page_data_id])?;
            for (pos, doc) in page.sub_documents.iter().enumerate() {
                count += insert.execute(rusqlite::params![
                    page.page_data_id,
                    page.doc_name,
                    pos as i64,
                    doc.heading,
                    doc.body,
                ])?;
            }
            mark.execute([page.page_data_id])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub struct StoredSubDocument {
    pub doc_name: String,
    pub doc: SubDocument,
}

/// All stored sub-documents in page then position order.
pub fn fetch_sub_documents(conn: &Connection) -> Result<Vec<StoredSubDocument>> {
    let mut stmt = conn.prepare(
        "SELECT doc_name, heading, body FROM sub_documents ORDER BY page_data_id, position",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredSubDocument {
                doc_name: row.get(0)?,
                doc: SubDocument {
                    heading: row.get(1)?,
                    body: row.get(2)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Export runs ──

#[derive(Debug, Clone, Serialize)]
pub struct ExportRun {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub documents: usize,
    pub records: usize,
    pub skipped: usize,
    pub output: String,
}

pub fn insert_export_run(conn: &Connection, run: &ExportRun) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO export_runs
         (run_id, started_at, finished_at, documents, records, skipped, output)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            run.run_id,
            run.started_at,
            run.finished_at,
            run.documents as i64,
            run.records as i64,
            run.skipped as i64,
            run.output,
        ],
    )?;
    Ok(())
}

pub fn last_export_run(conn: &Connection) -> Result<Option<ExportRun>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, started_at, finished_at, documents, records, skipped, output
         FROM export_runs ORDER BY finished_at DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map([], |row| {
        Ok(ExportRun {
            run_id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            documents: row.get::<_, i64>(3)? as usize,
            records: row.get::<_, i64>(4)? as usize,
            skipped: row.get::<_, i64>(5)? as usize,
            output: row.get(6)?,
        })
    })?;
    let run = rows.next().transpose()?;
    Ok(run)
}

// ── Stats ──

#[derive(Debug, Serialize)]
pub struct Stats {
    pub total: i64,
    pub visited: i64,
    pub unvisited: i64,
    pub scraped: i64,
    pub errors: i64,
    pub split: i64,
    pub sub_documents: i64,
    pub last_export: Option<ExportRun>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        total: count("SELECT COUNT(*) FROM pages")?,
        visited: count("SELECT COUNT(*) FROM pages WHERE visited = 1")?,
        unvisited: count("SELECT COUNT(*) FROM pages WHERE visited = 0")?,
        scraped: count("SELECT COUNT(*) FROM page_data WHERE html IS NOT NULL")?,
        errors: count("SELECT COUNT(*) FROM page_data WHERE error IS NOT NULL")?,
        split: count("SELECT COUNT(*) FROM page_data WHERE split = 1")?,
        sub_documents: count("SELECT COUNT(*) FROM sub_documents")?,
        last_export: last_export_run(conn)?,
    })
}

fn limit_clause(limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!(" LIMIT {}", n),
        None => String::new(),
    }
}
