//! CLI entry point for the fastget downloader.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fastget_core::{
    DownloadConfig, DownloadEngine, DownloadOutcome, RetryPolicy, default_name_from_url,
    verify_sha256,
};
use futures_util::future::join_all;
use indicatif::MultiProgress;
use tracing::{debug, info, warn};

mod cli;
mod progress_ui;

use cli::Args;
use progress_ui::BarObserver;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = DownloadConfig::default()
        .with_chunk_size(args.chunk_size)
        .with_concurrency(usize::from(args.connections))
        .with_timeout(args.timeout)
        .with_retry(RetryPolicy::with_max_retries(args.retries));
    config.validate()?;

    if args.urls.len() > 1 {
        if args.expect_hash.is_some() {
            warn!("--hash applies to single-URL downloads only; ignoring it");
        }
        return download_batch(&args, &config).await;
    }

    let url = &args.urls[0];
    let output = single_output_path(url, args.output.as_deref());
    let engine = build_engine(&config, &args, None, &output)?;

    let outcome = engine
        .download(url, &output)
        .await
        .with_context(|| format!("failed to download {url}"))?;
    report_outcome(&outcome);

    if let Some(expected) = &args.expect_hash {
        info!("Verifying sha256...");
        verify_sha256(&outcome.path, expected).await?;
        info!("Hash OK");
    }

    Ok(())
}

/// Downloads every URL concurrently into one directory.
///
/// Failures are isolated: each URL succeeds or fails on its own and the run
/// fails only after all of them finished.
async fn download_batch(args: &Args, config: &DownloadConfig) -> Result<()> {
    let output_dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
    if output_dir.is_file() {
        bail!(
            "--output must be a directory when downloading multiple URLs: {}",
            output_dir.display()
        );
    }
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let multi = MultiProgress::new();
    let names = batch_file_names(args.urls.iter().map(String::as_str));
    let mut downloads = Vec::with_capacity(args.urls.len());
    for (url, name) in args.urls.iter().zip(names) {
        let output = output_dir.join(name);
        let engine = build_engine(config, args, Some(&multi), &output)?;
        downloads.push(async move {
            match engine.download(url, &output).await {
                Ok(outcome) => {
                    info!(path = %outcome.path.display(), "Completed");
                    true
                }
                Err(error) => {
                    warn!(url = %url, path = %output.display(), error = %error, "Failed");
                    false
                }
            }
        });
    }

    let total = downloads.len();
    let succeeded = join_all(downloads).await.into_iter().filter(|ok| *ok).count();
    info!(
        "Completed {succeeded}/{total} downloads in: {}",
        output_dir.display()
    );

    if succeeded < total {
        bail!("{} of {total} downloads failed", total - succeeded);
    }
    Ok(())
}

fn build_engine(
    config: &DownloadConfig,
    args: &Args,
    multi: Option<&MultiProgress>,
    output: &Path,
) -> Result<DownloadEngine> {
    let engine = DownloadEngine::new(config.clone())?;
    if args.quiet {
        return Ok(engine);
    }
    let label = output
        .file_name()
        .map_or_else(|| output.display().to_string(), |name| name.to_string_lossy().into_owned());
    Ok(engine.with_observer(Arc::new(BarObserver::new(multi, &label))))
}

/// Resolves the output path of a single download.
///
/// An existing directory receives the URL's default file name.
fn single_output_path(url: &str, output: Option<&Path>) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(default_name_from_url(url)),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(default_name_from_url(url)),
    }
}

/// Default file names for a batch, one per URL.
///
/// A name already taken by an earlier URL gets ` (n)` before its extension,
/// so no two downloads share an output file or a resume side-file.
fn batch_file_names<'a>(urls: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    urls.into_iter()
        .map(|url| {
            let name = default_name_from_url(url);
            let mut candidate = name.clone();
            let mut n = 1;
            while !taken.insert(candidate.clone()) {
                candidate = numbered_name(&name, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

fn numbered_name(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{name} ({n})"),
    }
}

fn report_outcome(outcome: &DownloadOutcome) {
    info!(
        path = %outcome.path.display(),
        bytes = outcome.bytes,
        mode = ?outcome.mode,
        resumed_segments = outcome.resumed_segments,
        "Download complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_output_path_defaults_to_url_name() {
        assert_eq!(
            single_output_path("https://example.com/a/file.iso", None),
            PathBuf::from("file.iso")
        );
    }

    #[test]
    fn test_single_output_path_keeps_explicit_file() {
        assert_eq!(
            single_output_path("https://example.com/file.iso", Some(Path::new("/tmp/nope/x.bin"))),
            PathBuf::from("/tmp/nope/x.bin")
        );
    }

    #[test]
    fn test_batch_file_names_number_repeated_names() {
        let names = batch_file_names([
            "https://a.example.com/x/file.iso",
            "https://b.example.com/y/file.iso",
            "https://c.example.com/file.iso",
            "https://c.example.com/other.iso",
        ]);
        assert_eq!(names, ["file.iso", "file (1).iso", "file (2).iso", "other.iso"]);
    }

    #[test]
    fn test_batch_file_names_without_extension_or_path() {
        let names = batch_file_names([
            "https://a.example.com/",
            "https://b.example.com/",
            "https://a.example.com/README",
            "https://b.example.com/README",
        ]);
        assert_eq!(
            names,
            ["download.bin", "download (1).bin", "README", "README (1)"]
        );
    }

    #[test]
    fn test_batch_file_names_skip_numbered_name_already_in_use() {
        let names = batch_file_names([
            "https://a.example.com/file%20(1).iso",
            "https://a.example.com/file.iso",
            "https://b.example.com/file.iso",
        ]);
        assert_eq!(names, ["file (1).iso", "file.iso", "file (2).iso"]);
    }

    #[test]
    fn test_single_output_path_joins_existing_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(
            single_output_path("https://example.com/file.iso", Some(dir.path())),
            dir.path().join("file.iso")
        );
    }
}
