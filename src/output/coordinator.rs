use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{OutputError, OutputWriter, ResultWriter};
use crate::scanner::ScanResult;

// write errors past this many are only counted
const KEPT_WRITE_ERRORS: usize = 5;

#[derive(Debug)]
pub enum Event {
    Result(ScanResult),
    ProgressIncrement(u64),
    ProgressTotalIncrease(u64),
    Status { text: String, is_error: bool },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteErrors {
    pub count: usize,
    pub first: Vec<String>,
}

impl WriteErrors {
    pub fn record(&mut self, e: &OutputError) {
        self.count += 1;
        if self.first.len() < KEPT_WRITE_ERRORS {
            self.first.push(e.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

pub struct OutputReport {
    pub writer: OutputWriter,
    pub results: u64,
    pub statuses: u64,
    pub write_errors: WriteErrors,
}

// the only thing allowed to touch the terminal while a scan runs. every
// line goes out inside `ProgressBar::suspend` so the bar is cleared before
// and redrawn after it.
pub struct OutputCoordinator {
    progress: ProgressBar,
    writer: OutputWriter,
    cancel: CancellationToken,
    cleared: bool,
    results: u64,
    statuses: u64,
    write_errors: WriteErrors,
    status_lines: Option<mpsc::UnboundedReceiver<Event>>,
}

pub fn progress_bar(total: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    // the template is a constant, a parse failure just means the default style
    if let Ok(style) = ProgressStyle::with_template(
        ":: Progress: [{pos}/{len}] :: {per_sec} :: Duration: [{elapsed_precise}] :: {msg}",
    ) {
        pb.set_style(style.progress_chars(r#"#>-"#));
    }
    pb
}

impl OutputCoordinator {
    pub fn new(progress: ProgressBar, writer: OutputWriter, cancel: CancellationToken) -> Self {
        Self {
            progress,
            writer,
            cancel,
            cleared: false,
            results: 0,
            statuses: 0,
            write_errors: WriteErrors::default(),
            status_lines: None,
        }
    }

    // log lines arrive here instead of the bounded result channel so they
    // never wait behind results
    pub fn with_status_lines(mut self, lines: mpsc::UnboundedReceiver<Event>) -> Self {
        self.status_lines = Some(lines);
        self
    }

    // drains events until every sender is gone. cancellation only clears the
    // bar, late results are still written.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) -> OutputReport {
        let mut lines = self.status_lines.take();
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !self.cleared => {
                    self.progress.finish_and_clear();
                    self.cleared = true;
                    continue;
                }
                line = next_line(&mut lines), if lines.is_some() => match line {
                    Some(event) => event,
                    None => {
                        lines = None;
                        continue;
                    }
                },
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event);
        }
        if let Some(rx) = lines.as_mut() {
            while let Ok(event) = rx.try_recv() {
                self.handle(event);
            }
        }
        if !self.cleared {
            self.progress.finish_and_clear();
        }
        OutputReport {
            writer: self.writer,
            results: self.results,
            statuses: self.statuses,
            write_errors: self.write_errors,
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Result(result) => {
                self.results += 1;
                let writer = &mut self.writer;
                let outcome = on_terminal(&self.progress, self.cleared, || writer.write(&result));
                if let Err(e) = outcome {
                    self.write_failed(e);
                }
            }
            Event::ProgressIncrement(n) => self.progress.inc(n),
            Event::ProgressTotalIncrease(n) => self.progress.inc_length(n),
            Event::Status { text, is_error } => {
                self.statuses += 1;
                on_terminal(&self.progress, self.cleared, || print_status(&text, is_error))
            }
        }
    }

    fn write_failed(&mut self, e: OutputError) {
        self.write_errors.record(&e);
        let text = format!("[!] output error: {e}");
        on_terminal(&self.progress, self.cleared, || print_status(&text, true));
    }
}

async fn next_line(lines: &mut Option<mpsc::UnboundedReceiver<Event>>) -> Option<Event> {
    match lines.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn on_terminal<R>(progress: &ProgressBar, cleared: bool, f: impl FnOnce() -> R) -> R {
    if cleared {
        f()
    } else {
        progress.suspend(f)
    }
}

fn print_status(text: &str, is_error: bool) {
    if is_error {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
}
