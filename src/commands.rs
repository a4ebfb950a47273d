use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use indicatif::HumanBytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use url::Url;

use crate::cli::ReportFormat;
use crate::downloader::{SyncOptions, Synchronizer};
use crate::hashing::{calculate_hash, digest_matches};
use crate::session::{HttpSession, SessionOptions};
use crate::state::{FetchRequest, OutcomeRecord, Summary};
use crate::utils::{
    classify_partials, clean_filename, get_filename_from_url, leftover_partials, prepare_download_dir,
};

/// One line of a tasks file: `URL[|FILENAME[|SHA256]]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskEntry {
    pub url: String,
    pub filename: String,
    pub sha256: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub concurrency: Option<usize>,
    pub rate_limit: Option<u32>,
    pub timeout: Option<Duration>,
    pub session: SessionOptions,
    pub report: ReportFormat,
}

pub fn parse_tasks(content: &str) -> Result<Vec<TaskEntry>> {
    let mut entries = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let raw = line.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let mut parts = raw.splitn(3, '|');
        let url = parts.next().unwrap_or_default().trim();
        entries.push(
            task_from_parts(url, parts.next(), parts.next())
                .with_context(|| format!("tasks line {}", lineno + 1))?,
        );
    }
    Ok(entries)
}

fn task_from_parts(url: &str, filename: Option<&str>, sha256: Option<&str>) -> Result<TaskEntry> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL {:?}", url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("Unsupported URL scheme {:?} in {}", parsed.scheme(), url);
    }

    let filename = match filename.map(clean_filename).filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => get_filename_from_url(url)?,
    };
    let sha256 = sha256
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty());

    Ok(TaskEntry {
        url: url.to_string(),
        filename,
        sha256,
    })
}

pub fn build_requests(entries: Vec<TaskEntry>, download_dir: &Path) -> Vec<FetchRequest> {
    entries
        .into_iter()
        .map(|entry| {
            FetchRequest::new(entry.url, download_dir.join(entry.filename)).with_sha256(entry.sha256)
        })
        .collect()
}

async fn load_tasks(tasks_file: &Path) -> Result<Vec<TaskEntry>> {
    let content = fs::read_to_string(tasks_file)
        .await
        .with_context(|| format!("Failed to open tasks file: {:?}", tasks_file))?;
    parse_tasks(&content).with_context(|| format!("Failed to parse tasks file: {:?}", tasks_file))
}

pub async fn run_downloads(tasks_file: PathBuf, download_dir: PathBuf, options: RunOptions) -> Result<()> {
    let entries = load_tasks(&tasks_file).await?;
    if entries.is_empty() {
        tracing::warn!("no tasks found in {}", tasks_file.display());
    }
    prepare_download_dir(&download_dir).await?;
    run_requests(build_requests(entries, &download_dir), options).await
}

pub async fn run_single_download(url: String, download_dir: PathBuf, options: RunOptions) -> Result<()> {
    let entry = task_from_parts(&url, None, None)?;
    prepare_download_dir(&download_dir).await?;
    run_requests(build_requests(vec![entry], &download_dir), options).await
}

async fn run_requests(requests: Vec<FetchRequest>, options: RunOptions) -> Result<()> {
    let session = HttpSession::new(&options.session)?;
    let synchronizer = Synchronizer::new(
        Arc::new(session),
        SyncOptions {
            concurrency: options.concurrency.unwrap_or_else(num_cpus::get),
            timeout: options.timeout,
            rate_limit: options.rate_limit,
            console: options.report == ReportFormat::Text,
        },
    );

    let outcomes = synchronizer.sync(requests).await;
    let summary = Summary::of(&outcomes);

    match options.report {
        ReportFormat::Text => println!("{}", summary),
        ReportFormat::Json => {
            let records: Vec<OutcomeRecord> = outcomes.iter().map(|o| o.record()).collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    if summary.failed > 0 {
        bail!("{} of {} downloads failed", summary.failed, summary.total());
    }
    Ok(())
}

pub async fn list_downloads(tasks_file: PathBuf, download_dir: PathBuf) -> Result<()> {
    let entries = load_tasks(&tasks_file).await?;

    if fs::metadata(&download_dir).await.is_err() {
        println!("Download directory '{:?}' does not exist.", download_dir);
        println!("Tip: If you used a custom download directory, please specify it with --download-dir");
        return Ok(());
    }

    println!("{:<50} {:<10} {:<12} {:<17}", "Filename", "Status", "Size", "Modified");
    println!("{:-<50} {:-<10} {:-<12} {:-<17}", "", "", "", "");

    let mut present = 0;
    for entry in &entries {
        let path = download_dir.join(&entry.filename);
        let Ok(metadata) = fs::metadata(&path).await else {
            println!("{:<50} {:<10} {:<12} {:<17}", entry.filename, "Missing", "-", "-");
            continue;
        };
        present += 1;

        let status = match &entry.sha256 {
            Some(expected) => {
                let actual = calculate_hash(&path).await?;
                if digest_matches(expected, &actual) {
                    "Verified"
                } else {
                    "Mismatch"
                }
            }
            None => "Present",
        };
        let modified = metadata
            .modified()
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| "-".to_string());

        println!(
            "{:<50} {:<10} {:<12} {:<17}",
            entry.filename,
            status,
            format!("{}", HumanBytes(metadata.len())),
            modified
        );
    }

    println!();
    println!("Summary: Present: {}/{}", present, entries.len());

    let (unfinished, stale) = classify_partials(leftover_partials(&download_dir)?);
    if !unfinished.is_empty() {
        println!("Unfinished downloads (will be fetched again):");
        for path in unfinished {
            println!("  {}", path.display());
        }
    }
    if !stale.is_empty() {
        println!("Stale temporary files (destination already present, safe to delete):");
        for path in stale {
            println!("  {}", path.display());
        }
    }

    Ok(())
}
