//! Outgoing mail operations.
//!
//! Retry and compose both change what sits in the outbox, so they are
//! serialized through one queue lock. Retry is additionally single-flight: a
//! second retry while one is running is rejected without a network call.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::{Folder, MailApi};
use crate::error::{Error, Result};
use crate::gateway::Transport;
use crate::model::{ComposeReceipt, ComposeStatus, Draft};
use crate::view::Mailboxes;

/// Successful bulk retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryReport {
    /// Records delivered by this retry.
    pub sent_count: u32,
    /// Records that were queued when the retry started.
    pub total_queued: u32,
    /// Whether the refetched outbox listing was cached. False if the refetch
    /// failed or was superseded, e.g. because the view was left meanwhile.
    pub refreshed: bool,
}

impl RetryReport {
    /// Records still waiting.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.total_queued.saturating_sub(self.sent_count)
    }
}

impl fmt::Display for RetryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sent {} of {} queued emails",
            self.sent_count, self.total_queued
        )
    }
}

/// Counts over the cached outbox listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutboxSummary {
    /// Records waiting for a retry.
    pub queued: usize,
    /// Records whose delivery was given up.
    pub failed: usize,
}

/// Releases the retry latch when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Outbox coordinator.
#[derive(Debug)]
pub struct Outbox<T> {
    api: Arc<MailApi<T>>,
    mailboxes: Arc<Mailboxes>,
    retrying: AtomicBool,
    queue: Mutex<()>,
}

impl<T: Transport> Outbox<T> {
    /// Creates an outbox coordinator.
    #[must_use]
    pub fn new(api: Arc<MailApi<T>>, mailboxes: Arc<Mailboxes>) -> Self {
        Self {
            api,
            mailboxes,
            retrying: AtomicBool::new(false),
            queue: Mutex::new(()),
        }
    }

    /// Returns true while a retry is running.
    #[must_use]
    pub fn is_retrying(&self) -> bool {
        self.retrying.load(Ordering::Acquire)
    }

    /// Attempts delivery of every queued record.
    ///
    /// Makes one backend call. If anything was delivered the outbox listing
    /// is refetched once; a failed or discarded refetch is reported through
    /// [`RetryReport::refreshed`]. Nothing is retried automatically.
    ///
    /// # Errors
    ///
    /// - [`Error::RetryInFlight`] if another retry is running.
    /// - [`Error::PartialRetryFailure`] if nothing was delivered; the
    ///   listing is left as is.
    /// - Any request error from the retry call itself.
    pub async fn retry(&self) -> Result<RetryReport> {
        if self
            .retrying
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Outbox retry already running");
            return Err(Error::RetryInFlight);
        }
        let _latch = InFlight(&self.retrying);
        let _queue = self.queue.lock().await;

        let outcome = self.api.retry_outbox().await?;
        if outcome.sent_count == 0 {
            warn!(total_queued = outcome.total_queued, "Outbox retry delivered nothing");
            return Err(Error::PartialRetryFailure {
                total_queued: outcome.total_queued,
            });
        }

        info!(
            sent_count = outcome.sent_count,
            total_queued = outcome.total_queued,
            "Outbox retry delivered"
        );
        let view = self.mailboxes.get(Folder::Outbox);
        let refreshed = match view.fetch(&self.api).await {
            Ok((_, applied)) => applied,
            Err(e) => {
                warn!("Outbox refresh after retry failed: {e}");
                view.invalidate();
                false
            }
        };
        self.mailboxes.get(Folder::Sent).invalidate();

        Ok(RetryReport {
            sent_count: outcome.sent_count,
            total_queued: outcome.total_queued,
            refreshed,
        })
    }

    /// Sends a draft.
    ///
    /// Waits for a running retry to finish first. A queued result invalidates
    /// the cached outbox; a sent result invalidates the cached sent folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn compose(&self, draft: &Draft) -> Result<ComposeReceipt> {
        let _queue = self.queue.lock().await;
        let receipt = self.api.compose(draft).await?;
        match receipt.status {
            ComposeStatus::Queued => {
                info!(subject = %draft.subject, "Message queued in outbox");
                self.mailboxes.get(Folder::Outbox).invalidate();
            }
            ComposeStatus::Sent => {
                info!(subject = %draft.subject, "Message sent");
                self.mailboxes.get(Folder::Sent).invalidate();
            }
        }
        Ok(receipt)
    }

    /// Counts over the cached outbox listing.
    #[must_use]
    pub fn summary(&self) -> OutboxSummary {
        let (queued, failed) = self.mailboxes.get(Folder::Outbox).delivery_counts();
        OutboxSummary { queued, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_mentions_both_counts() {
        let report = RetryReport {
            sent_count: 3,
            total_queued: 5,
            refreshed: true,
        };
        let text = report.to_string();
        assert!(text.contains('3'));
        assert!(text.contains('5'));
        assert_eq!(report.remaining(), 2);
    }

    #[test]
    fn test_latch_releases_on_drop() {
        let flag = AtomicBool::new(true);
        drop(InFlight(&flag));
        assert!(!flag.load(Ordering::Acquire));
    }
}
