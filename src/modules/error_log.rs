use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::modules::api::{ApiError, ApiResult, ErrorReport, NotificationApi};

const MAX_QUEUED: usize = 50;
const BATCH_SIZE: usize = 10;
const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub fn backoff(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    BASE_BACKOFF.saturating_mul(factor).min(MAX_BACKOFF)
}

struct Flush {
    batch: Vec<ErrorReport>,
    rx: oneshot::Receiver<ApiResult<()>>,
}

/// Batches client-side errors and ships them to the server in the background.
pub struct ErrorReporter {
    api: Arc<dyn NotificationApi>,
    enabled: bool,
    queue: VecDeque<ErrorReport>,
    in_flight: Option<Flush>,
    attempts: u32,
    retry_at: Option<Instant>,
}

impl ErrorReporter {
    pub fn new(api: Arc<dyn NotificationApi>, enabled: bool) -> Self {
        Self {
            api,
            enabled,
            queue: VecDeque::new(),
            in_flight: None,
            attempts: 0,
            retry_at: None,
        }
    }

    pub fn record(&mut self, context: &str, message: &str) {
        if !self.enabled {
            return;
        }
        if self.queue.len() == MAX_QUEUED {
            self.queue.pop_front();
        }
        self.queue.push_back(ErrorReport {
            context: context.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn queued(&self) -> usize {
        self.queue.len() + self.in_flight.as_ref().map_or(0, |f| f.batch.len())
    }

    /// Settles a finished flush and starts the next one when allowed.
    pub fn tick(&mut self, now: Instant) {
        self.settle(now);
        if self.in_flight.is_some() || self.queue.is_empty() {
            return;
        }
        if self.retry_at.is_some_and(|at| now < at) {
            return;
        }

        let take = self.queue.len().min(BATCH_SIZE);
        let batch: Vec<ErrorReport> = self.queue.drain(..take).collect();
        let (tx, rx) = oneshot::channel();
        let api = Arc::clone(&self.api);
        let payload = batch.clone();
        tokio::spawn(async move {
            let _ = tx.send(api.report_errors(&payload).await);
        });
        self.in_flight = Some(Flush { batch, rx });
    }

    fn settle(&mut self, now: Instant) {
        let Some(flush) = self.in_flight.as_mut() else { return };
        let res = match flush.rx.try_recv() {
            Ok(res) => res,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Closed) => Err(ApiError::MissingData),
        };
        let Some(flush) = self.in_flight.take() else { return };

        match res {
            Ok(()) => {
                debug!(count = flush.batch.len(), "error batch delivered");
                self.attempts = 0;
                self.retry_at = None;
            }
            Err(e) => {
                self.attempts += 1;
                if self.attempts >= MAX_ATTEMPTS {
                    warn!(error = %e, dropped = flush.batch.len(), "giving up on error batch");
                    self.attempts = 0;
                    self.retry_at = None;
                    return;
                }
                let delay = backoff(self.attempts);
                warn!(error = %e, attempt = self.attempts, ?delay, "error batch not delivered, retrying");
                self.retry_at = Some(now + delay);
                for report in flush.batch.into_iter().rev() {
                    self.queue.push_front(report);
                }
                self.queue.truncate(MAX_QUEUED);
            }
        }
    }
}
