//! Archive download + extraction utilities for the daily grants extract.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use grants_core::ExtractName;
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use zip::ZipArchive;

pub const CRATE_NAME: &str = "grants-storage";

/// Size of the blocks the response body is written and reported in.
pub const DOWNLOAD_BLOCK_SIZE: usize = 64 * 1024;

const ZIP_CONTENT_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-zip",
];

/// Whether a `Content-Type` header value names a ZIP archive. Parameters
/// after `;` are ignored.
pub fn is_zip_content_type(value: &str) -> bool {
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ZIP_CONTENT_TYPES.contains(&essence.as_str())
}

/// On-disk locations for one day's extract.
#[derive(Debug, Clone)]
pub struct ExtractLayout {
    pub name: ExtractName,
    pub raw_dir: PathBuf,
    pub output_dir: PathBuf,
    pub csv_dir: PathBuf,
}

impl ExtractLayout {
    pub fn new(
        name: ExtractName,
        raw_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        csv_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name,
            raw_dir: raw_dir.into(),
            output_dir: output_dir.into(),
            csv_dir: csv_dir.into(),
        }
    }

    pub fn zip_path(&self) -> PathBuf {
        self.raw_dir.join(self.name.zip_file_name())
    }

    pub fn xml_path(&self) -> PathBuf {
        self.output_dir.join(self.name.xml_file_name())
    }

    pub fn csv_path(&self) -> PathBuf {
        self.csv_dir.join(self.name.csv_file_name())
    }

    /// Create the raw, output and CSV directories if they are missing.
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in [&self.raw_dir, &self.output_dir, &self.csv_dir] {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Bytes received so far against the advertised body size, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received_bytes: u64,
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Completed fraction in `[0, 1]`; `None` when the server sent no usable size.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => Some((self.received_bytes as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }
}

/// Receives download progress; presentation lives with the implementor.
pub trait DownloadObserver: Send + Sync {
    fn download_started(&self, _url: &str, _total_bytes: Option<u64>) {}
    fn download_progressed(&self, _progress: DownloadProgress) {}
    fn download_finished(&self, _progress: DownloadProgress) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl DownloadObserver for SilentObserver {}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// `None` lets a stalled server hold the request open indefinitely.
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(300)),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("{url} did not return a ZIP archive (content-type: {})", content_type.as_deref().unwrap_or("<none>"))]
    NotZip {
        url: String,
        content_type: Option<String>,
    },
    #[error("writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct DownloadedArchive {
    pub path: PathBuf,
    pub byte_size: u64,
    pub sha256: String,
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    /// Stream a ZIP archive from `url` into `dest`.
    ///
    /// The body lands in a hidden temp file beside `dest` and is renamed into
    /// place only once fully written, so `dest` either does not exist or holds
    /// a complete download.
    pub async fn download_zip<O: DownloadObserver + ?Sized>(
        &self,
        url: &str,
        dest: &Path,
        observer: &O,
    ) -> Result<DownloadedArchive, FetchError> {
        let span = info_span!("archive_download", url, dest = %dest.display());
        async move {
            let mut resp = self.client.get(url).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if !content_type.as_deref().is_some_and(is_zip_content_type) {
                return Err(FetchError::NotZip {
                    url: final_url,
                    content_type,
                });
            }

            let total_bytes = resp.content_length().filter(|len| *len > 0);
            info!(?total_bytes, "downloading archive");
            observer.download_started(url, total_bytes);

            let temp_path = temp_path_for(dest);
            let (progress, sha256) =
                match stream_to_file(&mut resp, &temp_path, total_bytes, observer).await {
                    Ok(done) => done,
                    Err(err) => {
                        let _ = fs::remove_file(&temp_path).await;
                        return Err(err);
                    }
                };

            if let Err(source) = fs::rename(&temp_path, dest).await {
                let _ = fs::remove_file(&temp_path).await;
                return Err(FetchError::Io {
                    path: dest.to_path_buf(),
                    source,
                });
            }

            observer.download_finished(progress);
            info!(bytes = progress.received_bytes, %sha256, "archive downloaded");
            Ok(DownloadedArchive {
                path: dest.to_path_buf(),
                byte_size: progress.received_bytes,
                sha256,
            })
        }
        .instrument(span)
        .await
    }
}

fn temp_path_for(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(".{file_name}.{}.part", Uuid::new_v4()))
}

async fn stream_to_file<O: DownloadObserver + ?Sized>(
    resp: &mut reqwest::Response,
    temp_path: &Path,
    total_bytes: Option<u64>,
    observer: &O,
) -> Result<(DownloadProgress, String), FetchError> {
    let io_err = |source| FetchError::Io {
        path: temp_path.to_path_buf(),
        source,
    };

    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(temp_path)
        .await
        .map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut progress = DownloadProgress {
        received_bytes: 0,
        total_bytes,
    };

    while let Some(chunk) = resp.chunk().await? {
        for block in chunk.chunks(DOWNLOAD_BLOCK_SIZE) {
            file.write_all(block).await.map_err(io_err)?;
            hasher.update(block);
            progress.received_bytes += block.len() as u64;
            observer.download_progressed(progress);
        }
    }
    file.flush().await.map_err(io_err)?;
    debug!(bytes = progress.received_bytes, path = %temp_path.display(), "body written");

    Ok((progress, hex::encode(hasher.finalize())))
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("opening archive {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("reading archive {}: {source}", path.display())]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },
    #[error("archive {} did not contain {entry}", archive.display())]
    MissingEntry { archive: PathBuf, entry: String },
    #[error("staging extracted files at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ExtractedArchive {
    pub entries: Vec<String>,
    pub expected_path: PathBuf,
}

/// Unpack every entry of `archive_path` into `output_dir` and confirm that
/// `expected_entry` is among the results.
///
/// Entries are unpacked into a hidden staging directory inside `output_dir`
/// and moved into place only after the whole archive extracted cleanly, so a
/// failed extraction leaves nothing behind at the final paths.
pub fn extract_archive(
    archive_path: &Path,
    output_dir: &Path,
    expected_entry: &str,
) -> Result<ExtractedArchive, ExtractError> {
    let staging = staging_dir_for(archive_path, output_dir);
    let result = extract_into_staging(archive_path, &staging, output_dir, expected_entry);
    if staging.exists() {
        if let Err(err) = std::fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), error = %err, "could not remove staging directory");
        }
    }
    result
}

fn staging_dir_for(archive_path: &Path, output_dir: &Path) -> PathBuf {
    let stem = archive_path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    output_dir.join(format!(".{stem}.{}.part", Uuid::new_v4()))
}

fn extract_into_staging(
    archive_path: &Path,
    staging: &Path,
    output_dir: &Path,
    expected_entry: &str,
) -> Result<ExtractedArchive, ExtractError> {
    let zip_err = |source| ExtractError::Zip {
        path: archive_path.to_path_buf(),
        source,
    };
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ExtractError::Io { path, source }
    };

    let file = File::open(archive_path).map_err(|source| ExtractError::Open {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(zip_err)?;
    let entries: Vec<String> = archive.file_names().map(str::to_string).collect();

    std::fs::create_dir_all(staging).map_err(io_err(staging))?;
    archive.extract(staging).map_err(zip_err)?;

    if !staging.join(expected_entry).is_file() {
        return Err(ExtractError::MissingEntry {
            archive: archive_path.to_path_buf(),
            entry: expected_entry.to_string(),
        });
    }

    let staged = std::fs::read_dir(staging).map_err(io_err(staging))?;
    for entry in staged {
        let entry = entry.map_err(io_err(staging))?;
        let target = output_dir.join(entry.file_name());
        std::fs::rename(entry.path(), &target).map_err(io_err(&target))?;
    }
    debug!(archive = %archive_path.display(), entries = entries.len(), "archive extracted");

    Ok(ExtractedArchive {
        entries,
        expected_path: output_dir.join(expected_entry),
    })
}
