use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::output::{OutputError, ResultWriter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    Running,
    Cancelling,
}

// turns a stop request (signal or fatal error) into cooperative shutdown.
// clones share state.
#[derive(Clone, Debug, Default)]
pub struct CancellationController {
    token: CancellationToken,
    cancelling: Arc<AtomicBool>,
    flushed: Arc<AtomicBool>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> ScanState {
        if self.cancelling.load(Ordering::SeqCst) {
            ScanState::Cancelling
        } else {
            ScanState::Running
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ScanState::Cancelling
    }

    // true only for the call that moved Running -> Cancelling
    pub fn cancel(&self) -> bool {
        let first = self
            .cancelling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.token.cancel();
        }
        first
    }

    // flushes buffered output the first time it is called, later calls do
    // nothing and return Ok.
    pub fn flush_once<W: ResultWriter>(&self, writer: &mut W) -> Result<(), OutputError> {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        writer.flush()
    }

    // cancels on Ctrl-C and, on unix, SIGTERM. the listener ends with the
    // scan when the token fires first.
    pub fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = controller.token.cancelled() => {}
                signal = shutdown_signal() => {
                    if let Some(name) = signal {
                        if controller.cancel() {
                            warn!(signal = name, "stop requested, finishing in-flight requests");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Option<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            return tokio::signal::ctrl_c().await.ok().map(|_| "SIGINT");
        }
    };
    tokio::select! {
        r = tokio::signal::ctrl_c() => r.ok().map(|_| "SIGINT"),
        _ = terminate.recv() => Some("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Option<&'static str> {
    tokio::signal::ctrl_c().await.ok().map(|_| "SIGINT")
}
