use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use url::Url;

static ILLEGAL_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]+"#).expect("valid regex"));

static HTML_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<.*?>|&([a-z0-9]+|#[0-9]{1,6}|#x[0-9a-f]{1,6});").expect("valid regex")
});

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Suffixes of in-progress downloads left behind by this tool and by browsers.
const PARTIAL_SUFFIXES: &[&str] = &["part", "crdownload"];

pub fn get_filename_from_url(url_str: &str) -> Result<String> {
    let url = Url::parse(url_str)?;

    if let Some(segments) = url.path_segments() {
        if let Some(filename) = segments.last() {
            if !filename.is_empty() {
                let decoded = percent_decode(filename);
                let cleaned = clean_filename(&decoded);
                if !cleaned.is_empty() {
                    return Ok(cleaned);
                }
            }
        }
    }

    // Same URL, same name, so reruns still find it on disk.
    Ok(format!(
        "download_{}",
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, url.as_str().as_bytes())
    ))
}

fn percent_decode(segment: &str) -> String {
    url::form_urlencoded::parse(format!("x={}", segment.replace('+', "%2B").replace('&', "%26")).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

/// Strips characters that are illegal in filenames on common filesystems.
pub fn clean_filename(filename: &str) -> String {
    ILLEGAL_FILENAME_CHARS
        .replace_all(filename, "")
        .trim()
        .to_string()
}

/// Removes tags and character entities, then collapses whitespace.
pub fn strip_html(raw_html: &str) -> String {
    let text = HTML_MARKUP.replace_all(raw_html, "");
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// Readable, bounded excerpt of an error page body for logging.
pub fn html_excerpt(body: &[u8], max_chars: usize) -> String {
    let text = strip_html(&String::from_utf8_lossy(body));
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Ensures the download directory exists.
pub async fn prepare_download_dir(dir: &Path) -> Result<()> {
    if fs::metadata(dir).await.is_ok() {
        tracing::info!("downloading folder (use existing dir): {}", dir.display());
        return Ok(());
    }
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create download directory {:?}", dir))?;
    tracing::info!("downloading folder (create new dir): {}", dir.display());
    Ok(())
}

/// Temporary files of unfinished downloads inside `dir`.
pub fn leftover_partials(dir: &Path) -> Result<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let mut found = Vec::new();
    for suffix in PARTIAL_SUFFIXES {
        let pattern = format!("{}/*.{}", escaped, suffix);
        for entry in glob::glob(&pattern).context("Invalid glob pattern")? {
            found.push(entry?);
        }
    }
    found.sort();
    Ok(found)
}

/// `name.ext` → `name.ext.<index>.part`, next to the destination.
/// The index keeps requests of one batch that share a destination apart.
pub fn part_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.part", index));
    path.with_file_name(name)
}

/// Destination a temporary file belongs to: strips `.crdownload`, or `.part`
/// plus an optional numeric index before it.
pub fn partial_destination(partial: &Path) -> Option<PathBuf> {
    let name = partial.file_name()?.to_str()?;
    let stem = if let Some(stem) = name.strip_suffix(".crdownload") {
        stem
    } else {
        let stem = name.strip_suffix(".part")?;
        match stem.rsplit_once('.') {
            Some((base, index)) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => base,
            _ => stem,
        }
    };
    if stem.is_empty() {
        return None;
    }
    Some(partial.with_file_name(stem))
}

/// Leftover partials whose destination is still missing; those get fetched again.
/// The rest are stale and only take up space.
pub fn classify_partials(partials: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<PathBuf>) {
    partials.into_iter().partition(|partial| {
        partial_destination(partial).map_or(true, |dest| !dest.exists())
    })
}
