//! Daily extract pipeline: fetch, extract, parse, filter, report.

pub mod filters;
pub mod report;
pub mod table;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use grants_adapters::parse_opportunity_file;
use grants_core::ExtractName;
use grants_storage::{
    extract_archive, DownloadObserver, ExtractLayout, HttpClientConfig, HttpFetcher,
};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

pub use filters::{FilterChain, FilterConfig, FilterStage, PostDateWindow, StageCount};
pub use report::{render_preview, write_csv};
pub use table::{parse_post_date, OpportunityTable, TableRow};

pub const CRATE_NAME: &str = "grants-sync";

pub const DEFAULT_EXTRACT_BASE_URL: &str =
    "https://prod-grants-gov-chatbot.s3.amazonaws.com/extracts/";

pub const DEFAULT_PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone)]
pub struct GrantsConfig {
    pub base_url: String,
    pub raw_dir: PathBuf,
    pub output_dir: PathBuf,
    pub csv_dir: PathBuf,
    pub user_agent: Option<String>,
    /// Zero disables the request timeout.
    pub http_timeout_secs: u64,
    pub filters_file: Option<PathBuf>,
    pub preview_rows: usize,
}

impl Default for GrantsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EXTRACT_BASE_URL.to_string(),
            raw_dir: PathBuf::from("grantsRaw"),
            output_dir: PathBuf::from("grantsOutput"),
            csv_dir: PathBuf::from("."),
            user_agent: None,
            http_timeout_secs: 300,
            filters_file: None,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

impl GrantsConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("GRANTS_EXTRACT_BASE_URL").unwrap_or(defaults.base_url),
            raw_dir: std::env::var("GRANTS_RAW_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.raw_dir),
            output_dir: std::env::var("GRANTS_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            csv_dir: std::env::var("GRANTS_CSV_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.csv_dir),
            user_agent: std::env::var("GRANTS_USER_AGENT").ok(),
            http_timeout_secs: std::env::var("GRANTS_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            filters_file: std::env::var("GRANTS_FILTERS_FILE").ok().map(PathBuf::from),
            preview_rows: defaults.preview_rows,
        }
    }

    pub fn layout(&self, extract_date: NaiveDate) -> ExtractLayout {
        ExtractLayout::new(
            ExtractName::for_date(extract_date),
            &self.raw_dir,
            &self.output_dir,
            &self.csv_dir,
        )
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: (self.http_timeout_secs > 0)
                .then(|| Duration::from_secs(self.http_timeout_secs)),
            user_agent: self.user_agent.clone(),
        }
    }

    /// Filter settings from `filters_file` when set, otherwise the built-in lists.
    pub fn load_filters(&self) -> Result<FilterConfig> {
        match &self.filters_file {
            Some(path) => FilterConfig::load(path),
            None => Ok(FilterConfig::default()),
        }
    }
}

/// A stage that found its output already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkippedStage {
    Download,
    Extraction,
}

impl fmt::Display for SkippedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => f.write_str("download"),
            Self::Extraction => f.write_str("extraction"),
        }
    }
}

/// Presentation hooks for a run. The pipeline never prints on its own.
pub trait RunReporter: DownloadObserver {
    fn stage_skipped(&self, _stage: SkippedStage, _existing: &Path) {}
    fn preview(&self, _table: &OpportunityTable, _rows: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl DownloadObserver for SilentReporter {}
impl RunReporter for SilentReporter {}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub extract_date: NaiveDate,
    pub download_url: String,
    pub downloaded: bool,
    pub extracted: bool,
    pub archive_sha256: Option<String>,
    pub parsed_records: usize,
    pub unparsed_post_dates: usize,
    pub post_date_window: PostDateWindow,
    pub stage_counts: Vec<StageCount>,
    pub written_rows: usize,
    pub csv_path: String,
}

pub struct GrantsPipeline {
    config: GrantsConfig,
    filters: FilterConfig,
    http: HttpFetcher,
    reporter: Box<dyn RunReporter>,
}

impl GrantsPipeline {
    pub fn new(config: GrantsConfig, filters: FilterConfig) -> Result<Self> {
        let http = HttpFetcher::new(config.http_client_config())?;
        Ok(Self {
            config,
            filters,
            http,
            reporter: Box::<SilentReporter>::default(),
        })
    }

    pub fn with_reporter(mut self, reporter: Box<dyn RunReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run every stage once for the extract published on `extract_date`,
    /// filtering post dates relative to `now`.
    pub async fn run_once(
        &self,
        extract_date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("grants_run", %run_id, %extract_date);
        self.run_stages(run_id, extract_date, now)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        extract_date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let layout = self.config.layout(extract_date);
        layout.ensure_dirs().await?;

        let download_url = layout.name.download_url(&self.config.base_url);
        let zip_path = layout.zip_path();
        let archive_sha256 = if path_exists(&zip_path).await? {
            info!(path = %zip_path.display(), "archive already present, skipping download");
            self.reporter.stage_skipped(SkippedStage::Download, &zip_path);
            None
        } else {
            info!(url = %download_url, "fetching extract");
            let archive = self
                .http
                .download_zip(&download_url, &zip_path, self.reporter.as_ref())
                .await
                .with_context(|| format!("downloading {download_url}"))?;
            Some(archive.sha256)
        };

        let xml_path = layout.xml_path();
        let extracted = if path_exists(&xml_path).await? {
            info!(path = %xml_path.display(), "XML already extracted, skipping extraction");
            self.reporter
                .stage_skipped(SkippedStage::Extraction, &xml_path);
            false
        } else {
            let (archive_path, output_dir) = (zip_path.clone(), layout.output_dir.clone());
            let expected = layout.name.xml_file_name();
            let archive = run_blocking(move || {
                extract_archive(&archive_path, &output_dir, &expected).map_err(Into::into)
            })
            .await
            .with_context(|| format!("extracting {}", zip_path.display()))?;
            info!(entries = archive.entries.len(), "archive extracted");
            true
        };

        let parse_path = xml_path.clone();
        let records = run_blocking(move || parse_opportunity_file(&parse_path).map_err(Into::into))
            .await
            .with_context(|| format!("parsing {}", xml_path.display()))?;
        let table = OpportunityTable::from_records(records);
        let parsed_records = table.len();
        let unparsed_post_dates = table.null_post_dates();
        if unparsed_post_dates > 0 {
            debug!(rows = unparsed_post_dates, "post dates did not parse and were nulled");
        }
        info!(records = parsed_records, "opportunities parsed");

        let (filtered, stage_counts) = FilterChain::from_config(&self.filters).apply(table, now);
        info!(
            window = %self.filters.post_date_window,
            rows = filtered.len(),
            "filters applied"
        );

        self.reporter.preview(&filtered, self.config.preview_rows);
        let csv_path = layout.csv_path();
        let csv_target = csv_path.clone();
        let written_rows = run_blocking(move || write_csv(&filtered, &csv_target)).await?;
        info!(path = %csv_path.display(), rows = written_rows, "CSV written");

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            extract_date,
            download_url,
            downloaded: archive_sha256.is_some(),
            extracted,
            archive_sha256,
            parsed_records,
            unparsed_post_dates,
            post_date_window: self.filters.post_date_window,
            stage_counts,
            written_rows,
            csv_path: csv_path.display().to_string(),
        })
    }
}

/// Run file-sized synchronous work off the async worker threads.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("blocking task panicked")?
}

async fn path_exists(path: &Path) -> Result<bool> {
    fs::try_exists(path)
        .await
        .with_context(|| format!("checking {}", path.display()))
}
