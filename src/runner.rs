use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::CancellationController;
use crate::config::{ConfigError, ScanConfig};
use crate::logging::LogRoute;
use crate::output::coordinator::progress_bar;
use crate::output::{Event, OutputCoordinator, OutputWriter, ResultWriter, WriteErrors};
use crate::scanner::{extract_paths, Cancelled, Scanner, ScannerError, Transport};
use crate::wordlist::{expand_line, WordlistError, WordlistSource};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub path: String,
    pub depth: usize,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Wordlist(#[from] WordlistError),

    #[error(transparent)]
    Scanner(#[from] ScannerError),

    #[error("task join failed: {source}")]
    TaskJoin {
        #[source]
        source: tokio::task::JoinError,
    },
}

#[derive(Clone, Debug)]
pub struct ScanSummary {
    // jobs the wordlist expands to, before any recursion
    pub total_jobs: u64,
    pub dispatched: u64,
    // every scanned path, recursion included
    pub processed: u64,
    pub results: u64,
    pub cancelled: bool,
    pub elapsed: Duration,
    pub write_errors: WriteErrors,
}

pub struct Runner {
    config: ScanConfig,
    wordlist: WordlistSource,
    transport: Option<Arc<dyn Transport>>,
    log_route: Option<LogRoute>,
}

impl Runner {
    pub fn new(config: ScanConfig) -> Result<Self, RunnerError> {
        config.validate()?;
        let wordlist = WordlistSource::FilePath(config.wordlist.clone());
        Ok(Self {
            config,
            wordlist,
            transport: None,
            log_route: None,
        })
    }

    pub fn with_wordlist(mut self, wordlist: WordlistSource) -> Self {
        self.wordlist = wordlist;
        self
    }

    // replaces the reqwest transport, used to drive the pipeline in-process
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_log_route(mut self, route: LogRoute) -> Self {
        self.log_route = Some(route);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub async fn run(
        &self,
        writer: OutputWriter,
        controller: &CancellationController,
    ) -> Result<ScanSummary, RunnerError> {
        let started_at = Instant::now();
        let config = &self.config;

        let total_jobs = self.wordlist.count_jobs(&config.extensions).await?;
        let scanner = match self.transport.as_ref() {
            Some(transport) => Scanner::with_transport(config, transport.clone())?,
            None => Scanner::new(config)?,
        };
        if scanner.filter().has_content_rules() && !(config.output.verbose || config.recursive) {
            warn!("regex and keyword filters only see response bodies in verbose mode");
        }
        let scanner = Arc::new(scanner);
        info!(
            url = %config.target,
            wordlist = %self.wordlist.describe(),
            jobs = total_jobs,
            threads = config.threads,
            "starting scan"
        );

        let capacity = config.threads.max(1) * 2;
        let token = controller.token();
        let (event_tx, event_rx) = mpsc::channel::<Event>(capacity);

        let progress = progress_bar(total_jobs, config.output.progress);
        let mut coordinator = OutputCoordinator::new(progress, writer, token.clone());
        if let Some(route) = self.log_route.as_ref() {
            let (line_tx, line_rx) = mpsc::unbounded_channel::<Event>();
            route.attach(line_tx);
            coordinator = coordinator.with_status_lines(line_rx);
        }
        let coordinator_handle = task::spawn(coordinator.run(event_rx));

        let (job_tx, job_rx) = async_channel::bounded::<Job>(capacity);
        let mut workers = Vec::with_capacity(config.threads);
        for _ in 0..config.threads.max(1) {
            let worker = Worker {
                scanner: scanner.clone(),
                events: event_tx.clone(),
                cancel: token.clone(),
                recursive: config.recursive,
                max_depth: config.max_depth,
                verbose: config.output.verbose,
                processed: AtomicU64::new(0),
            };
            workers.push(task::spawn(worker.run(job_rx.clone())));
        }
        drop(job_rx);
        drop(event_tx);

        let dispatched = dispatch(&self.wordlist, &config.extensions, job_tx, &token).await;
        if let Err(e) = dispatched.as_ref() {
            warn!(error = %e, "wordlist read failed, stopping scan");
            controller.cancel();
        }

        let mut processed = 0u64;
        let mut join_error = None;
        for w in workers {
            match w.await {
                Ok(n) => processed += n,
                Err(e) => join_error = Some(e),
            }
        }

        let report = coordinator_handle
            .await
            .map_err(|e| RunnerError::TaskJoin { source: e })?;
        if let Some(route) = self.log_route.as_ref() {
            route.detach();
        }
        if let Ok(mut scanner) = Arc::try_unwrap(scanner) {
            scanner.close();
        }

        let mut writer = report.writer;
        let mut write_errors = report.write_errors;
        if let Err(e) = controller.flush_once(&mut writer) {
            write_errors.record(&e);
        }
        if let Err(e) = writer.close() {
            write_errors.record(&e);
        }

        if let Some(e) = join_error {
            return Err(RunnerError::TaskJoin { source: e });
        }
        let dispatched = dispatched?;

        let summary = ScanSummary {
            total_jobs,
            dispatched,
            processed,
            results: report.results,
            cancelled: controller.is_cancelled(),
            elapsed: started_at.elapsed(),
            write_errors,
        };
        debug!(?summary, "scan finished");
        Ok(summary)
    }
}

// feeds expanded wordlist lines into the job channel until the list ends or
// the scan is cancelled. dropping `jobs` on return is what lets workers exit.
async fn dispatch(
    source: &WordlistSource,
    extensions: &[String],
    jobs: async_channel::Sender<Job>,
    cancel: &CancellationToken,
) -> Result<u64, WordlistError> {
    let mut sent = 0u64;
    let mut lines = source.lines().await?;
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        for path in expand_line(&line, extensions) {
            let job = Job { path, depth: 0 };
            let delivered = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                r = jobs.send(job) => r.is_ok(),
            };
            if !delivered {
                return Ok(sent);
            }
            sent += 1;
        }
    }
    Ok(sent)
}

struct Worker {
    scanner: Arc<Scanner>,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
    recursive: bool,
    max_depth: usize,
    verbose: bool,
    processed: AtomicU64,
}

impl Worker {
    async fn run(self, jobs: async_channel::Receiver<Job>) -> u64 {
        loop {
            let job = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                job = jobs.recv() => match job {
                    Ok(job) => job,
                    Err(_) => break,
                },
            };
            if self.cancel.is_cancelled() {
                break;
            }
            if self.take(job.path, job.depth).await.is_err() {
                break;
            }
        }
        self.processed.load(Ordering::Relaxed)
    }

    // counts the path as done up front, then scans it
    async fn take(&self, path: String, depth: usize) -> Result<(), Cancelled> {
        self.emit(Event::ProgressIncrement(1)).await?;
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.visit(path, depth).await
    }

    // recursion stays on this worker: children of a 2xx/3xx page are scanned
    // one after another at depth + 1 before the worker takes its next job.
    fn visit(&self, path: String, depth: usize) -> BoxFuture<'_, Result<(), Cancelled>> {
        async move {
            let Some(result) = self.scanner.scan_path(&self.cancel, &path, depth).await? else {
                return Ok(());
            };

            let children = if self.recursive && result.is_found() && depth < self.max_depth {
                extract_paths(&result)
            } else {
                Vec::new()
            };
            let result = if self.verbose {
                result
            } else {
                result.without_content()
            };
            self.emit(Event::Result(result)).await?;

            if children.is_empty() {
                return Ok(());
            }
            debug!(path = %path, depth = depth + 1, count = children.len(), "descending into links");
            self.emit(Event::ProgressTotalIncrease(children.len() as u64))
                .await?;
            for child in children {
                if self.cancel.is_cancelled() {
                    return Err(Cancelled);
                }
                self.take(child, depth + 1).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn emit(&self, event: Event) -> Result<(), Cancelled> {
        // the coordinator only goes away once every worker is done, a
        // failed send means the scan is being torn down
        self.events.send(event).await.map_err(|_| Cancelled)
    }
}
