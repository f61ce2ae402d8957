//! Command-line front end for cachedl
//!
//! Downloads URLs (and/or the entries of a JSON manifest) into a directory,
//! reusing files that are still current on the server.

use anyhow::{Context, Result, bail};
use cachedl::{CachePolicy, ContentLength, DownloadConfig, Downloader, Item, Url};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cachedl", version, about = "Download files, skipping the ones that have not changed")]
struct Cli {
    /// URLs to download
    urls: Vec<String>,

    /// Directory downloads are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// JSON list of {"url", "destination", "cache_policy"} entries
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Default cache policy for the batch
    #[arg(short, long, value_enum, default_value_t = Policy::IfUnmodified)]
    policy: Policy,

    /// Skip probing sizes before downloading
    #[arg(long)]
    imprecise: bool,

    /// Extra request header, "Name: value"
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Idle timeout in seconds while connecting or waiting for data
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Always download
    Reload,
    /// Ask the server whether the local copy is still current
    IfUnmodified,
    /// Use any local copy without asking
    PreferCache,
}

impl From<Policy> for CachePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Reload => CachePolicy::ReloadIgnoringCache,
            Policy::IfUnmodified => CachePolicy::ReturnCacheIfUnmodifiedElseLoad,
            Policy::PreferCache => CachePolicy::ReturnCacheElseLoad,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let items = collect_items(&cli)?;
    if items.is_empty() {
        bail!("nothing to download: pass URLs or --manifest");
    }

    let mut builder = DownloadConfig::builder()
        .precise_progress(!cli.imprecise)
        .cache_policy(cli.policy.into())
        .timeout(Duration::from_secs(cli.timeout));
    for raw in &cli.headers {
        let (name, value) = parse_header(raw)?;
        builder = builder.header(name, value);
    }

    let count = items.len();
    let downloader = Downloader::new(items, builder.build())?;
    downloader.on_progress(|progress| {
        let expected = match progress.bytes_expected {
            ContentLength::Known(total) => total.to_string(),
            ContentLength::Unknown => "?".to_string(),
        };
        let mut stderr = std::io::stderr();
        let _ = write!(
            stderr,
            "\r{:>5.1}%  item {}/{}  {} / {} bytes",
            progress.percentage(),
            progress.item_index + 1,
            progress.item_count,
            progress.bytes_downloaded,
            expected
        );
        let _ = stderr.flush();
    });

    let result = tokio::select! {
        result = downloader.completion() => result,
        _ = tokio::signal::ctrl_c() => {
            downloader.cancel();
            downloader.completion().await
        }
    };
    eprintln!();

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    Ok(ExitCode::from(report(&result, count, &mut stdout, &mut stderr)))
}

/// Print the batch outcome once and return the process exit status
fn report(result: &cachedl::Result<()>, count: usize, out: &mut impl Write, err: &mut impl Write) -> u8 {
    match result {
        Ok(()) => {
            let _ = writeln!(out, "{} item(s) up to date", count);
            0
        }
        Err(e) => {
            let _ = write!(err, "{}", e.detailed_report());
            1
        }
    }
}

fn collect_items(cli: &Cli) -> Result<Vec<Item>> {
    let mut items = Vec::with_capacity(cli.urls.len());
    for url in &cli.urls {
        let url = Url::parse(url).with_context(|| format!("invalid URL '{}'", url))?;
        let destination = cli.output_dir.join(file_name_for(&url));
        items.push(Item::from_url(url, destination));
    }

    if let Some(manifest) = &cli.manifest {
        items.extend(read_manifest(manifest)?);
    }

    Ok(items)
}

fn read_manifest(path: &Path) -> Result<Vec<Item>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading manifest {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing manifest {}", path.display()))
}

/// Last non-empty path segment of `url`, else a fixed fallback name
fn file_name_for(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .unwrap_or("downloaded_file")
        .to_string()
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.trim().to_string())),
        _ => bail!("invalid header '{}', expected \"Name: value\"", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_for() {
        let name = |url: &str| file_name_for(&Url::parse(url).unwrap());
        assert_eq!(name("https://example.com/data/report.csv"), "report.csv");
        assert_eq!(name("https://example.com/data/report.csv?token=1"), "report.csv");
        assert_eq!(name("https://example.com/data/"), "data");
        assert_eq!(name("https://example.com/"), "downloaded_file");
    }

    #[test]
    fn test_failure_is_reported_once() {
        let error = cachedl::DownloadError::Cancelled {
            url: Some("https://example.com/a.bin".to_string()),
        };
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let code = report(&Err(error), 2, &mut out, &mut err);

        assert_eq!(code, 1);
        assert!(out.is_empty());
        let printed = String::from_utf8(err).unwrap();
        assert_eq!(printed.matches("Download cancelled").count(), 1);
        assert!(printed.starts_with("Error: Download cancelled\n"));
    }

    #[test]
    fn test_success_summary() {
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let code = report(&Ok(()), 3, &mut out, &mut err);

        assert_eq!(code, 0);
        assert_eq!(String::from_utf8(out).unwrap(), "3 item(s) up to date\n");
        assert!(err.is_empty());
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer abc").unwrap(),
            ("Authorization".to_string(), "Bearer abc".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }
}
