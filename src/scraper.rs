use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::{QueuedPage, ScrapeRow};

const BASE_BACKOFF_MS: u64 = 2000;
const MAX_BACKOFF_MS: u64 = 300_000;

/// Scrape stats returned after completion.
pub struct ScrapeStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Download case pages concurrently, saving each result as it arrives.
pub async fn scrape_pages_streaming(
    conn: &Connection,
    pages: Vec<QueuedPage>,
    concurrency: usize,
    max_retries: u32,
) -> Result<ScrapeStats> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = pages.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Workers send results, this loop saves them
    let (tx, mut rx) = tokio::sync::mpsc::channel::<ScrapeRow>(concurrency.max(1) * 2);

    for page in pages {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let row = match sem.acquire_owned().await {
                Ok(_permit) => fetch_with_retry(&client, page, max_retries).await,
                Err(e) => failed_row(page, e.to_string()),
            };
            let _ = tx.send(row).await;
        });
    }

    // rx closes once every spawned task has dropped its sender
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    let mut insert_stmt = conn.prepare(
        "INSERT INTO page_data (page_id, url, doc_name, html, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut update_stmt = conn.prepare(
        "UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
    )?;

    while let Some(row) = rx.recv().await {
        if let Some(e) = &row.error {
            warn!("Fetch failed for {}: {}", row.url, e);
            errors += 1;
        } else {
            ok += 1;
        }

        save_one(&mut insert_stmt, &mut update_stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Scraped {} pages ({} ok, {} errors)", total, ok, errors);

    Ok(ScrapeStats { total, ok, errors })
}

fn save_one(
    insert: &mut rusqlite::Statement,
    update: &mut rusqlite::Statement,
    row: &ScrapeRow,
) -> Result<()> {
    insert.execute(rusqlite::params![
        row.page_id, row.url, row.doc_name, row.html, row.status, row.error, row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.page_id])?;
    Ok(())
}

async fn fetch_with_retry(client: &reqwest::Client, page: QueuedPage, max_retries: u32) -> ScrapeRow {
    let mut attempt = 0;
    loop {
        let row = fetch_one(client, &page).await;
        if !should_retry(row.status) || attempt >= max_retries {
            return row;
        }

        let backoff = backoff_delay(attempt);
        warn!(
            "HTTP {:?} on {} (attempt {}/{}), backing off {:.1}s",
            row.status,
            page.url,
            attempt + 1,
            max_retries,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// Exponential from 2s, capped at 5 minutes.
fn backoff_delay(attempt: u32) -> Duration {
    let ms = BASE_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

fn should_retry(status: Option<i32>) -> bool {
    matches!(status, Some(429) | Some(500) | Some(502) | Some(503) | Some(504))
}

async fn fetch_one(client: &reqwest::Client, page: &QueuedPage) -> ScrapeRow {
    let start = Instant::now();
    let response = client.get(&page.url).send().await;

    let (html, status, error) = match response {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                match resp.text().await {
                    Ok(body) => (Some(body), Some(status.as_u16() as i32), None),
                    Err(e) => (None, Some(status.as_u16() as i32), Some(e.to_string())),
                }
            } else {
                (None, Some(status.as_u16() as i32), Some(format!("HTTP {}", status)))
            }
        }
        Err(e) => (None, e.status().map(|s| s.as_u16() as i32), Some(e.to_string())),
    };

    ScrapeRow {
        page_id: page.page_id,
        url: page.url.clone(),
        doc_name: page.swp_no.clone(),
        html,
        status,
        error,
        latency_ms: Some(start.elapsed().as_millis() as i64),
    }
}

fn failed_row(page: QueuedPage, error: String) -> ScrapeRow {
    ScrapeRow {
        page_id: page.page_id,
        url: page.url,
        doc_name: page.swp_no,
        html: None,
        status: None,
        error: Some(error),
        latency_ms: None,
    }
}
