use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use grants_storage::{DownloadObserver, DownloadProgress};
use grants_sync::{render_preview, OpportunityTable, RunReporter, SkippedStage};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner} [{elapsed_precise}] [{bar:40}] {msg} ({bytes_per_sec})";
const SPINNER_TEMPLATE: &str = "{spinner} [{elapsed_precise}] {msg} ({bytes_per_sec})";

/// Progress text: percentage of the advertised size, or just the byte count
/// when the server sent none.
pub fn format_progress(progress: DownloadProgress) -> String {
    let received = HumanBytes(progress.received_bytes);
    match (progress.fraction(), progress.total_bytes) {
        (Some(fraction), Some(total)) => {
            format!("{:.1}% ({received} of {})", fraction * 100.0, HumanBytes(total))
        }
        _ => format!("{received}"),
    }
}

/// Terminal presentation: a progress bar on stderr, notices and the preview
/// on stdout.
#[derive(Default)]
pub struct ConsoleReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl DownloadObserver for ConsoleReporter {
    fn download_started(&self, url: &str, total_bytes: Option<u64>) {
        println!("Downloading {url}");
        let bar = match total_bytes {
            Some(total) => {
                let bar = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
                    bar.set_style(style);
                }
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            }
        };
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn download_progressed(&self, progress: DownloadProgress) {
        self.with_bar(|bar| {
            bar.set_position(progress.received_bytes);
            bar.set_message(format_progress(progress));
        });
    }

    fn download_finished(&self, progress: DownloadProgress) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.set_position(progress.received_bytes);
                bar.finish_and_clear();
            }
        }
        println!("Downloaded {}", format_progress(progress));
    }
}

impl RunReporter for ConsoleReporter {
    fn stage_skipped(&self, stage: SkippedStage, existing: &Path) {
        match stage {
            SkippedStage::Download => {
                println!("{} already exists, skipping download", existing.display())
            }
            SkippedStage::Extraction => {
                println!("{} already extracted, skipping unzip", existing.display())
            }
        }
    }

    fn preview(&self, table: &OpportunityTable, rows: usize) {
        if rows == 0 {
            return;
        }
        println!("{}", render_preview(table, rows));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_downloads_show_a_percentage() {
        let text = format_progress(DownloadProgress {
            received_bytes: 512,
            total_bytes: Some(2048),
        });
        assert!(text.starts_with("25.0% ("), "{text}");

        let done = format_progress(DownloadProgress {
            received_bytes: 2048,
            total_bytes: Some(2048),
        });
        assert!(done.starts_with("100.0%"), "{done}");
    }

    #[test]
    fn unsized_downloads_show_only_bytes() {
        for total_bytes in [None, Some(0)] {
            let text = format_progress(DownloadProgress {
                received_bytes: 512,
                total_bytes,
            });
            assert!(!text.contains('%'), "{text}");
            assert_eq!(text, HumanBytes(512).to_string());
        }
    }

    #[test]
    fn reporter_tracks_a_download_without_size() {
        let reporter = ConsoleReporter::default();
        reporter.download_started("http://localhost/x.zip", None);
        reporter.download_progressed(DownloadProgress {
            received_bytes: 10,
            total_bytes: None,
        });
        reporter.download_finished(DownloadProgress {
            received_bytes: 10,
            total_bytes: None,
        });
        assert!(reporter.bar.lock().expect("lock").is_none());
    }
}
