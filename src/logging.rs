use std::io::Write;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::output::Event;

// where formatted log lines go. while a scan is attached they travel to the
// output coordinator as status events on their own unbounded channel, so a
// full result channel never pushes a line onto the terminal. detached lines
// go straight to stderr.
#[derive(Clone, Debug, Default)]
pub struct LogRoute {
    lines: Arc<Mutex<Option<mpsc::UnboundedSender<Event>>>>,
}

impl LogRoute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, lines: mpsc::UnboundedSender<Event>) {
        if let Ok(mut slot) = self.lines.lock() {
            *slot = Some(lines);
        }
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.lines.lock() {
            *slot = None;
        }
    }

    #[cfg(test)]
    fn is_attached(&self) -> bool {
        self.lines.lock().is_ok_and(|slot| slot.is_some())
    }

    fn deliver(&self, text: String, is_error: bool) {
        let event = Event::Status { text, is_error };
        let event = match self.lines.lock() {
            Ok(slot) => match slot.as_ref() {
                // a failed send means the coordinator is gone and the
                // terminal is free again
                Some(tx) => match tx.send(event) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(event)) => event,
                },
                None => event,
            },
            Err(_) => event,
        };
        if let Event::Status { text, .. } = event {
            let _ = writeln!(std::io::stderr(), "{text}");
        }
    }
}

// collects one formatted event and hands it off when dropped
pub struct RoutedLine {
    route: LogRoute,
    is_error: bool,
    buf: Vec<u8>,
}

impl Write for RoutedLine {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for RoutedLine {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf).trim_end().to_string();
        if !text.is_empty() {
            self.route.deliver(text, self.is_error);
        }
    }
}

impl<'a> MakeWriter<'a> for LogRoute {
    type Writer = RoutedLine;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedLine {
            route: self.clone(),
            is_error: false,
            buf: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        RoutedLine {
            route: self.clone(),
            is_error: *meta.level() <= Level::WARN,
            buf: Vec::new(),
        }
    }
}

pub fn env_filter(verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let crate_level = if verbose { "debug" } else { "warn" };
    // keep reqwest/hyper at INFO even when our own crate is at debug
    let filter_str = format!("dirsweep={crate_level},reqwest=info,hyper=info,h2=info");
    EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level))
}

// installs the global subscriber. a second call is a no-op.
pub fn init(verbose: bool, color: bool) -> LogRoute {
    let route = LogRoute::new();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_ansi(color)
        .with_target(false)
        .without_time()
        .with_writer(route.clone())
        .try_init();
    route
}
