use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::modules::api::{ApiResult, NotificationApi, PollResponse, format_cursor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Started,
    /// The previous poll has not settled yet.
    Skipped,
    NotDue,
}

struct InFlight {
    rx: oneshot::Receiver<ApiResult<PollResponse>>,
    handle: JoinHandle<()>,
}

/// Fixed-interval "what's new since" poller.
///
/// The poll itself runs on a spawned task; its result is picked up by
/// [`DeltaPoller::collect`] from the UI loop so cache mutations stay there.
/// A tick that comes due while a request is still outstanding is skipped.
pub struct DeltaPoller {
    api: Arc<dyn NotificationApi>,
    interval: Duration,
    cursor: DateTime<Utc>,
    last_tick: Instant,
    in_flight: Option<InFlight>,
}

impl DeltaPoller {
    pub fn new(api: Arc<dyn NotificationApi>, interval: Duration) -> Self {
        Self {
            api,
            interval,
            cursor: Utc::now(),
            last_tick: Instant::now(),
            in_flight: None,
        }
    }

    pub fn cursor(&self) -> DateTime<Utc> {
        self.cursor
    }

    /// Rewinds the cursor after a full reload of the initial data.
    pub fn reset_cursor(&mut self, at: DateTime<Utc>) {
        self.cursor = at;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.duration_since(self.last_tick) >= self.interval
    }

    /// Starts a poll when the interval has elapsed.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if !self.is_due(now) {
            return TickOutcome::NotDue;
        }
        self.last_tick = now;
        self.start()
    }

    /// Starts a poll immediately unless one is outstanding.
    pub fn poll_now(&mut self) -> TickOutcome {
        self.last_tick = Instant::now();
        self.start()
    }

    fn start(&mut self) -> TickOutcome {
        if self.in_flight.is_some() {
            debug!(cursor = %format_cursor(self.cursor), "previous poll still running, skipping tick");
            return TickOutcome::Skipped;
        }
        let (tx, rx) = oneshot::channel();
        let api = Arc::clone(&self.api);
        let since = self.cursor;
        let handle = tokio::spawn(async move {
            let res = api.poll(since).await;
            let _ = tx.send(res);
        });
        self.in_flight = Some(InFlight { rx, handle });
        TickOutcome::Started
    }

    /// Returns the settled poll, if any, and advances the cursor on success.
    ///
    /// The cursor only moves when the server reports new notifications, and then
    /// to the server's `lastUpdateTime` rather than the local clock. Failures
    /// leave it in place so the next tick asks for the same window again.
    pub fn collect(&mut self) -> Option<ApiResult<PollResponse>> {
        let flight = self.in_flight.as_mut()?;
        let res = match flight.rx.try_recv() {
            Ok(res) => res,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => {
                self.in_flight = None;
                warn!("poll task ended without a result");
                return None;
            }
        };
        self.in_flight = None;

        match &res {
            Ok(poll) if poll.has_new_notifications => self.cursor = poll.last_update_time,
            Ok(_) => {}
            Err(e) => warn!(error = %e, cursor = %format_cursor(self.cursor), "poll failed, will retry"),
        }
        Some(res)
    }

    /// Waits for the outstanding poll, if any.
    #[cfg(test)]
    pub async fn settle(&mut self) -> Option<ApiResult<PollResponse>> {
        let flight = self.in_flight.as_mut()?;
        let _ = (&mut flight.handle).await;
        self.collect()
    }
}

impl Drop for DeltaPoller {
    fn drop(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            flight.handle.abort();
        }
    }
}
