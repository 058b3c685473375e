use std::sync::Mutex;

use grants_storage::{
    DownloadObserver, DownloadProgress, FetchError, HttpClientConfig, HttpFetcher, SilentObserver,
};
use sha2::{Digest, Sha256};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingObserver {
    started: Mutex<Option<Option<u64>>>,
    progress: Mutex<Vec<DownloadProgress>>,
    finished: Mutex<Option<DownloadProgress>>,
}

impl DownloadObserver for RecordingObserver {
    fn download_started(&self, _url: &str, total_bytes: Option<u64>) {
        *self.started.lock().unwrap() = Some(total_bytes);
    }

    fn download_progressed(&self, progress: DownloadProgress) {
        self.progress.lock().unwrap().push(progress);
    }

    fn download_finished(&self, progress: DownloadProgress) {
        *self.finished.lock().unwrap() = Some(progress);
    }
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(HttpClientConfig::default()).expect("fetcher")
}

fn leftover_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn zip_download_is_written_and_hashed() {
    let server = MockServer::start().await;
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/extracts/GrantsDBExtract20240115v2.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.clone(), "application/zip"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("GrantsDBExtract20240115v2.zip");
    let observer = RecordingObserver::default();
    let url = format!("{}/extracts/GrantsDBExtract20240115v2.zip", server.uri());

    let archive = fetcher()
        .download_zip(&url, &dest, &observer)
        .await
        .expect("download");

    assert_eq!(std::fs::read(&dest).expect("read dest"), body);
    assert_eq!(archive.byte_size, body.len() as u64);
    assert_eq!(archive.sha256, hex::encode(Sha256::digest(&body)));
    assert_eq!(leftover_files(dir.path()), vec!["GrantsDBExtract20240115v2.zip"]);

    assert_eq!(*observer.started.lock().unwrap(), Some(Some(body.len() as u64)));
    let finished = observer.finished.lock().unwrap().expect("finished");
    assert_eq!(finished.received_bytes, body.len() as u64);
    assert_eq!(finished.fraction(), Some(1.0));
    let progress = observer.progress.lock().unwrap();
    assert!(progress.len() >= 4);
    assert!(progress
        .windows(2)
        .all(|w| w[0].received_bytes < w[1].received_bytes));
}

/// Serve one response with no Content-Length; the body ends when the
/// connection closes.
async fn serve_unsized_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.expect("read request");
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nConnection: close\r\n\r\n";
        socket.write_all(head.as_bytes()).await.expect("write head");
        for block in body.chunks(10_000) {
            socket.write_all(block).await.expect("write body");
        }
        socket.shutdown().await.expect("shutdown");
    });
    format!("http://{addr}/extracts/GrantsDBExtract20240115v2.zip")
}

#[tokio::test]
async fn download_without_content_length_reports_no_fraction() {
    let body: Vec<u8> = (0..150_000u32).map(|i| (i % 241) as u8).collect();
    let url = serve_unsized_once(body.clone()).await;

    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("GrantsDBExtract20240115v2.zip");
    let observer = RecordingObserver::default();
    let archive = fetcher()
        .download_zip(&url, &dest, &observer)
        .await
        .expect("download");

    assert_eq!(std::fs::read(&dest).expect("read dest"), body);
    assert_eq!(archive.sha256, hex::encode(Sha256::digest(&body)));
    assert_eq!(*observer.started.lock().unwrap(), Some(None));
    let finished = observer.finished.lock().unwrap().expect("finished");
    assert_eq!(finished.total_bytes, None);
    assert_eq!(finished.received_bytes, body.len() as u64);
    assert_eq!(finished.fraction(), None);
    assert!(observer
        .progress
        .lock()
        .unwrap()
        .iter()
        .all(|p| p.fraction().is_none()));
}

#[tokio::test]
async fn non_zip_content_type_aborts_without_writing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>maintenance</html>", "text/html"),
        )
        .mount(&server)
        .await;

    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("extract.zip");
    let err = fetcher()
        .download_zip(&format!("{}/extract.zip", server.uri()), &dest, &SilentObserver)
        .await
        .expect_err("not a zip");

    match err {
        FetchError::NotZip { content_type, .. } => {
            assert_eq!(content_type.as_deref(), Some("text/html"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(leftover_files(dir.path()).is_empty());
}

#[tokio::test]
async fn missing_extract_is_an_http_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("extract.zip");
    let err = fetcher()
        .download_zip(&format!("{}/extract.zip", server.uri()), &dest, &SilentObserver)
        .await
        .expect_err("404");

    assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
    assert!(!dest.exists());
}

#[tokio::test]
async fn unreachable_host_is_a_request_error() {
    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("extract.zip");
    let err = fetcher()
        .download_zip("http://127.0.0.1:9/extract.zip", &dest, &SilentObserver)
        .await
        .expect_err("connection refused");

    assert!(matches!(err, FetchError::Request(_)));
    assert!(leftover_files(dir.path()).is_empty());
}
