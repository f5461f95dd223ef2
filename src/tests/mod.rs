use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::cancel::CancellationController;
use crate::config::ScanConfig;
use crate::output::testing::SharedBuf;
use crate::output::{BufferedJsonWriter, OutputFormat, OutputWriter};
use crate::runner::Runner;
use crate::scanner::testing::{page, ScriptedTransport};
use crate::scanner::{HttpSettings, HttpTransport, RawResponse, Transport, TransportError};
use crate::wordlist::WordlistSource;

fn scan_config() -> ScanConfig {
    let mut cfg = ScanConfig {
        target: "http://test.local".to_string(),
        threads: 2,
        retry_count: 0,
        retry_delay: Duration::ZERO,
        extensions: vec!["php".to_string(), "txt".to_string()],
        ..ScanConfig::default()
    };
    cfg.output.progress = false;
    cfg
}

fn inline(words: &[&str]) -> WordlistSource {
    WordlistSource::Inline(words.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn wordlist_file_counts_expanded_jobs() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "a\n\nfile.%EXT%").unwrap();
    let source = WordlistSource::FilePath(file.path().to_path_buf());
    let total = source
        .count_jobs(&["php".to_string(), "txt".to_string()])
        .await
        .unwrap();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn flaky_path_is_retried_then_reported() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.script(
        "admin",
        vec![
            Err(TransportError::new("connection reset")),
            Err(TransportError::new("connection reset")),
            Ok(page(200, "welcome")),
        ],
    );
    let mut cfg = scan_config();
    cfg.retry_count = 3;
    let buf = SharedBuf::default();
    let runner = Runner::new(cfg)
        .unwrap()
        .with_wordlist(inline(&["admin"]))
        .with_transport(transport.clone());

    let summary = runner
        .run(
            OutputWriter::BufferedJson(BufferedJsonWriter::new(Box::new(buf.clone()))),
            &CancellationController::new(),
        )
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 3);
    assert_eq!(summary.results, 1);

    let parsed: Vec<serde_json::Value> = serde_json::from_str(&buf.contents()).unwrap();
    assert_eq!(parsed[0]["url"], "http://test.local/admin");
    assert_eq!(parsed[0]["status_code"], 200);
    assert_eq!(parsed[0]["size"], 7);
}

#[tokio::test]
async fn exhausted_retries_are_reported_as_failures() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.script("down", vec![Err(TransportError::new("refused"))]);
    let buf = SharedBuf::default();
    let runner = Runner::new(scan_config())
        .unwrap()
        .with_wordlist(inline(&["down"]))
        .with_transport(transport);

    let summary = runner
        .run(
            OutputWriter::BufferedJson(BufferedJsonWriter::new(Box::new(buf.clone()))),
            &CancellationController::new(),
        )
        .await
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.results, 1);

    let parsed: Vec<serde_json::Value> = serde_json::from_str(&buf.contents()).unwrap();
    assert_eq!(parsed[0]["status_code"], 0);
    assert_eq!(parsed[0]["error"], "refused");
}

// hangs on `slow` until the scan is cancelled
struct HangingTransport {
    started: Arc<Notify>,
}

#[async_trait]
impl Transport for HangingTransport {
    async fn send(&self, _method: &Method, url: &str) -> Result<RawResponse, TransportError> {
        if url.ends_with("/slow") {
            self.started.notify_one();
            futures::future::pending::<()>().await;
        }
        Ok(page(200, "ok"))
    }
}

#[tokio::test]
async fn cancelling_mid_scan_still_writes_a_valid_document() {
    let started = Arc::new(Notify::new());
    let transport = Arc::new(HangingTransport {
        started: started.clone(),
    });
    let mut cfg = scan_config();
    cfg.threads = 1;
    let buf = SharedBuf::default();
    let runner = Runner::new(cfg)
        .unwrap()
        .with_wordlist(inline(&["fast", "slow", "later"]))
        .with_transport(transport);

    let controller = CancellationController::new();
    let stopper = controller.clone();
    tokio::spawn(async move {
        started.notified().await;
        stopper.cancel();
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        runner.run(
            OutputWriter::BufferedJson(BufferedJsonWriter::new(Box::new(buf.clone()))),
            &controller,
        ),
    )
    .await
    .expect("scan did not stop after cancellation")
    .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.results, 1);
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&buf.contents()).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0]["url"], "http://test.local/fast");
}

#[tokio::test]
async fn results_land_in_the_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("found.csv");
    let transport = Arc::new(ScriptedTransport::default());
    transport.respond("login.php", 200, "form");

    let mut cfg = scan_config();
    cfg.output.format = OutputFormat::Csv;
    cfg.output.file = Some(path.clone());
    let writer = crate::output::build_writer(&cfg.output).unwrap();
    let runner = Runner::new(cfg)
        .unwrap()
        .with_wordlist(inline(&["login.%EXT%"]))
        .with_transport(transport);

    let summary = runner
        .run(writer, &CancellationController::new())
        .await
        .unwrap();
    assert_eq!(summary.results, 1);
    assert!(summary.write_errors.is_empty());

    let written = std::fs::read_to_string(&path).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("URL,StatusCode,Size,Method,Depth,Timestamp,Error")
    );
    let row = lines.next().unwrap();
    assert!(row.contains("http://test.local/login.php"));
    assert!(row.contains(",200,"));
    assert_eq!(lines.next(), None);
}

// holds every request briefly and records the most requests seen at once.
// each page links one level deeper so recursion adds work to the same pool.
#[derive(Default)]
struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for InFlightGauge {
    async fn send(&self, _method: &Method, url: &str) -> Result<RawResponse, TransportError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        let path = url.trim_start_matches("http://test.local");
        Ok(page(200, &format!(r#"<a href="{path}/x">next</a>"#)))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn requests_in_flight_never_exceed_threads() {
    let transport = Arc::new(InFlightGauge::default());
    let mut cfg = scan_config();
    cfg.threads = 3;
    cfg.recursive = true;
    cfg.max_depth = 2;
    let words: Vec<String> = (0..30).map(|i| format!("w{i}")).collect();
    let runner = Runner::new(cfg)
        .unwrap()
        .with_wordlist(WordlistSource::Inline(words))
        .with_transport(transport.clone());

    let summary = runner
        .run(
            OutputWriter::BufferedJson(BufferedJsonWriter::new(Box::new(SharedBuf::default()))),
            &CancellationController::new(),
        )
        .await
        .unwrap();

    // each word plus two levels of links below it
    assert_eq!(transport.calls.load(Ordering::SeqCst), 90);
    assert_eq!(summary.processed, 90);
    let peak = transport.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "saw {peak} requests in flight with 3 threads");
    assert!(peak >= 2, "workers never overlapped");
}

// answers `/ok` with a page, `/moved` with a redirect and anything else 404
async fn spawn_http_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let response = match path.as_str() {
                    "/ok" => "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nX-Scan-Echo: a\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world".to_string(),
                    "/moved" => "HTTP/1.1 302 Found\r\nLocation: /ok\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
                    _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope".to_string(),
                };
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

fn http_settings(follow_redirects: bool) -> HttpSettings {
    HttpSettings {
        timeout: Duration::from_secs(5),
        user_agent: crate::config::default_user_agent(),
        headers: vec![("X-Scan".to_string(), "1".to_string())],
        skip_tls_verify: true,
        follow_redirects,
        max_redirects: 3,
        pool_size: 2,
    }
}

#[tokio::test]
async fn http_transport_reads_status_headers_and_body() {
    let base = spawn_http_server().await;
    let transport = HttpTransport::new(&http_settings(false)).unwrap();

    let ok = transport
        .send(&Method::GET, &format!("{base}/ok"))
        .await
        .unwrap();
    assert_eq!(ok.status, 200);
    assert_eq!(ok.body, b"hello world");
    assert_eq!(ok.headers.get("x-scan-echo").map(String::as_str), Some("a"));

    let missing = transport
        .send(&Method::GET, &format!("{base}/missing"))
        .await
        .unwrap();
    assert_eq!(missing.status, 404);
}

#[tokio::test]
async fn http_transport_only_follows_redirects_when_asked() {
    let base = spawn_http_server().await;

    let plain = HttpTransport::new(&http_settings(false)).unwrap();
    let moved = plain
        .send(&Method::GET, &format!("{base}/moved"))
        .await
        .unwrap();
    assert_eq!(moved.status, 302);
    assert!(moved.body.is_empty());

    let following = HttpTransport::new(&http_settings(true)).unwrap();
    let landed = following
        .send(&Method::GET, &format!("{base}/moved"))
        .await
        .unwrap();
    assert_eq!(landed.status, 200);
    assert_eq!(landed.body.len(), 11);
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    // bind then drop so the port is very likely closed
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(&http_settings(false)).unwrap();
    let err = transport
        .send(&Method::GET, &format!("http://{addr}/x"))
        .await
        .unwrap_err();
    assert!(!err.to_string().is_empty());
}
