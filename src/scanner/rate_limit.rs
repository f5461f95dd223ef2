use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Cancelled;

// above this the refill period rounds toward zero and the bucket grows large
pub const MAX_REQUESTS_PER_SECOND: u32 = 10_000;

// token bucket backed by a bounded channel. a background ticker deposits one
// token per period and drops it when the bucket is already full, so idle time
// never builds more than `requests_per_second` of burst credit.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Option<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: async_channel::Receiver<()>,
    refill: JoinHandle<()>,
}

impl RateLimiter {
    pub fn disabled() -> Self {
        Self { bucket: None }
    }

    // must be called from within a tokio runtime. `requests_per_second` of
    // zero disables limiting, larger values are capped at
    // `MAX_REQUESTS_PER_SECOND`.
    pub fn per_second(requests_per_second: u32) -> Self {
        if requests_per_second == 0 {
            return Self::disabled();
        }
        let requests_per_second = requests_per_second.min(MAX_REQUESTS_PER_SECOND);
        let (tx, rx) = async_channel::bounded::<()>(requests_per_second as usize);
        let period = Duration::from_secs(1) / requests_per_second;
        let refill = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match tx.try_send(()) {
                    Ok(()) | Err(async_channel::TrySendError::Full(_)) => {}
                    Err(async_channel::TrySendError::Closed(_)) => break,
                }
            }
        });
        Self {
            bucket: Some(Bucket { tokens: rx, refill }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let Some(bucket) = self.bucket.as_ref() else {
            return Ok(());
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            token = bucket.tokens.recv() => token.map_err(|_| Cancelled),
        }
    }

    // stops the refill ticker. a closed limiter no longer gates anything.
    pub fn close(&mut self) {
        if let Some(bucket) = self.bucket.take() {
            bucket.refill.abort();
            bucket.tokens.close();
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.close();
    }
}
