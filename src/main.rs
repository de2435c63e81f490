mod artifacts;
mod db;
mod index;
mod lookup;
mod parser;
mod record;
mod scraper;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use lookup::LookupTable;
use parser::fields::DateMode;
use parser::segment::HeadingPattern;
use record::Source;
use settings::Settings;

#[derive(Parser)]
#[command(name = "swp_trials", about = "Salem Witchcraft Papers trial document extractor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the series index, write the lookup table and queue case pages
    Init,
    /// Download unvisited case pages
    Scrape {
        /// Max pages to download (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Split downloaded pages into sub-documents
    Split {
        /// Max pages to split (default: all unsplit)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Also write one text file per sub-document
        #[arg(long)]
        write_text: bool,
    },
    /// Extract fields, resolve names and write the trials CSV
    Export {
        /// Keep the first bracketed date or all of them
        #[arg(long, value_enum)]
        dates: Option<DateMode>,
        /// Read stored sub-document text files instead of the database
        #[arg(long)]
        from_dir: Option<PathBuf>,
        /// Output CSV path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Scrape + split + export in one pipeline
    Run {
        /// Max pages to download
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long, value_enum)]
        dates: Option<DateMode>,
        #[arg(long)]
        write_text: bool,
    },
    /// Assembled records as a compact table
    Overview {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        #[arg(long, value_enum)]
        dates: Option<DateMode>,
    },
    /// Show queue and export statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    info!(settings = ?settings, "Settings loaded");

    let result = match cli.command {
        Commands::Init => {
            let entries = index::fetch_index(&settings.index_url, &settings.base_url).await?;
            index::write_lookup_csv(&settings.lookup_csv, &entries)?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let inserted = db::insert_pages(&conn, &entries)?;
            println!(
                "Wrote {} index rows to {:?}; queued {} new case pages",
                entries.len(),
                settings.lookup_csv,
                inserted
            );
            Ok(())
        }
        Commands::Scrape { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'init' first or all pages are downloaded.");
                return Ok(());
            }
            println!("Downloading {} pages...", pages.len());
            let stats = scraper::scrape_pages_streaming(
                &conn,
                pages,
                settings.concurrency,
                settings.max_retries,
            )
            .await?;
            println!(
                "Done: {} downloaded ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Split { limit, write_text } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let pattern = settings.heading_pattern()?;
            let pages = db::fetch_unsplit(&conn, limit)?;
            if pages.is_empty() {
                println!("No unsplit pages. Run 'scrape' first.");
                return Ok(());
            }
            println!("Splitting {} pages...", pages.len());
            let text_dir = write_text.then_some(settings.text_dir.as_path());
            let counts = split_pages(&conn, &pages, &pattern, text_dir)?;
            counts.print();
            Ok(())
        }
        Commands::Export { dates, from_dir, output } => {
            let mode = dates.unwrap_or(settings.date_mode);
            let output = output.unwrap_or_else(|| settings.output_csv.clone());
            let lookup = load_lookup(&settings.lookup_csv)?;
            let pattern = settings.heading_pattern()?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            export(&conn, &lookup, &pattern, mode, from_dir.as_deref(), &output)
        }
        Commands::Run { limit, dates, write_text } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let mode = dates.unwrap_or(settings.date_mode);
            run_pipeline(&conn, &settings, limit, mode, write_text).await
        }
        Commands::Overview { limit, dates } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let lookup = load_lookup(&settings.lookup_csv)?;
            let pattern = settings.heading_pattern()?;
            let sources = db_sources(&conn)?;
            let mode = dates.unwrap_or(settings.date_mode);
            let assembly = record::assemble(&sources, &lookup, &pattern, mode);
            if assembly.records.is_empty() {
                println!("No records. Run 'split' first.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<8} | {:<28} | {:<22} | {:<14} | {:>6}",
                "#", "Id", "Subject", "Date", "Type", "Words"
            );
            println!("{}", "-".repeat(97));
            for (i, r) in assembly.records.iter().take(limit).enumerate() {
                println!(
                    "{:>4} | {:<8} | {:<28} | {:<22} | {:<14} | {:>6}",
                    i + 1,
                    r.identifier,
                    truncate(&r.subject_or_topic, 28),
                    truncate(&r.date, 22),
                    truncate(&r.proceeding_type, 14),
                    r.text.split_whitespace().count()
                );
            }
            println!(
                "\n{} records ({} skipped)",
                assembly.records.len(),
                assembly.skipped
            );
            Ok(())
        }
        Commands::Stats { json } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&s)?);
                return Ok(());
            }
            println!("Total:         {}", s.total);
            println!("Visited:       {}", s.visited);
            println!("Unvisited:     {}", s.unvisited);
            println!("Downloaded:    {}", s.scraped);
            println!("Errors:        {}", s.errors);
            println!("Split:         {}", s.split);
            println!("Sub-documents: {}", s.sub_documents);
            if let Some(run) = s.last_export {
                println!(
                    "Last export:   {} rows ({} skipped) -> {} at {}",
                    run.records, run.skipped, run.output, run.finished_at
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Scrape + split + export. Lookup and heading problems abort before any page is touched.
async fn run_pipeline(
    conn: &rusqlite::Connection,
    settings: &Settings,
    limit: Option<usize>,
    mode: DateMode,
    write_text: bool,
) -> Result<()> {
    let lookup = load_lookup(&settings.lookup_csv)?;
    let pattern = settings.heading_pattern()?;

    // Phase 1: download
    let pages = db::fetch_unvisited(conn, limit)?;
    if pages.is_empty() {
        println!("No unvisited pages; continuing with pages already downloaded.");
    } else {
        let t_scrape = Instant::now();
        println!("Pipeline: downloading {} pages...", pages.len());
        let stats = scraper::scrape_pages_streaming(
            conn,
            pages,
            settings.concurrency,
            settings.max_retries,
        )
        .await?;
        println!(
            "Downloaded {} pages ({} ok, {} errors) in {:.1}s",
            stats.total,
            stats.ok,
            stats.errors,
            t_scrape.elapsed().as_secs_f64()
        );
    }

    // Phase 2: split
    let unsplit = db::fetch_unsplit(conn, None)?;
    if !unsplit.is_empty() {
        let t_split = Instant::now();
        println!("Splitting {} pages...", unsplit.len());
        let text_dir = write_text.then_some(settings.text_dir.as_path());
        let counts = split_pages(conn, &unsplit, &pattern, text_dir)?;
        println!("Split in {:.1}s", t_split.elapsed().as_secs_f64());
        counts.print();
    }

    // Phase 3: export
    export(conn, &lookup, &pattern, mode, None, &settings.output_csv)
}

struct SplitCounts {
    pages: usize,
    unsegmented: usize,
    sub_documents: usize,
    text_files: usize,
    text_errors: usize,
}

impl SplitCounts {
    fn print(&self) {
        println!(
            "Split {} pages into {} sub-documents ({} unsegmented, {} text files, {} write errors).",
            self.pages, self.sub_documents, self.unsegmented, self.text_files, self.text_errors,
        );
    }
}

fn split_pages(
    conn: &rusqlite::Connection,
    pages: &[db::ScrapedPage],
    pattern: &HeadingPattern,
    text_dir: Option<&Path>,
) -> Result<SplitCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    if let Some(dir) = text_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = SplitCounts {
        pages: 0,
        unsegmented: 0,
        sub_documents: 0,
        text_files: 0,
        text_errors: 0,
    };

    for chunk in pages.chunks(500) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|page| parser::split_page(page, pattern))
            .collect();

        for split in &results {
            counts.pages += 1;
            if split.sub_documents.is_empty() {
                counts.unsegmented += 1;
            }
            if let Some(dir) = text_dir {
                for doc in &split.sub_documents {
                    match artifacts::write_sub_document(dir, &split.doc_name, doc) {
                        Ok(_) => counts.text_files += 1,
                        Err(e) => {
                            warn!("{}: {:#}", split.doc_name, e);
                            counts.text_errors += 1;
                        }
                    }
                }
            }
        }

        counts.sub_documents += db::save_sub_documents(conn, &results)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn load_lookup(path: &Path) -> Result<LookupTable> {
    let table = LookupTable::from_path(path)
        .with_context(|| format!("Cannot use lookup table {:?}", path))?;
    if table.is_empty() {
        warn!("Lookup table {:?} has no usable rows; subjects will be empty", path);
    }
    Ok(table)
}

fn db_sources(conn: &rusqlite::Connection) -> Result<Vec<Source>> {
    Ok(db::fetch_sub_documents(conn)?
        .into_iter()
        .map(|s| Source::Split {
            doc_name: s.doc_name,
            doc: s.doc,
        })
        .collect())
}

/// Extract, resolve and write the table. The lookup is loaded by the caller.
fn export(
    conn: &rusqlite::Connection,
    lookup: &LookupTable,
    pattern: &HeadingPattern,
    mode: DateMode,
    from_dir: Option<&Path>,
    output: &Path,
) -> Result<()> {
    let started_at = chrono::Utc::now();

    let (sources, unreadable) = match from_dir {
        Some(dir) => {
            let read = artifacts::read_dir(dir)?;
            (read.sources, read.unreadable)
        }
        None => (db_sources(conn)?, 0),
    };
    if sources.is_empty() {
        warn!("No sub-documents to export; writing a header-only table");
    }
    println!("Extracting {} sub-documents ({:?} dates)...", sources.len(), mode);

    let assembly = record::assemble(&sources, lookup, pattern, mode);
    record::write_csv(output, &assembly.records)?;
    let skipped = assembly.skipped + unreadable;

    let finished_at = chrono::Utc::now();
    db::insert_export_run(
        conn,
        &db::ExportRun {
            run_id: format!("export-{}", started_at.format("%Y%m%dT%H%M%S%.3f")),
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            documents: sources.len() + unreadable,
            records: assembly.records.len(),
            skipped,
            output: output.display().to_string(),
        },
    )?;

    println!(
        "Wrote {} rows to {:?} ({} skipped).",
        assembly.records.len(),
        output,
        skipped
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
