//! Cached mailbox listings.
//!
//! Each fetch takes a [`FetchTicket`]. A response is applied only if its
//! ticket is still the newest one and the view has not been left since, so a
//! slow response can never overwrite a newer listing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::api::{Folder, MailApi};
use crate::error::Result;
use crate::gateway::Transport;
use crate::model::{DeliveryStatus, EmailRecord};

/// Claim on the result of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct FetchTicket {
    folder: Folder,
    generation: u64,
}

impl FetchTicket {
    /// Folder being fetched.
    pub const fn folder(self) -> Folder {
        self.folder
    }
}

#[derive(Debug, Default)]
struct Inner {
    generation: u64,
    active: bool,
    records: Option<Vec<EmailRecord>>,
}

/// Cached listing of one folder.
#[derive(Debug)]
pub struct MailboxView {
    folder: Folder,
    inner: Mutex<Inner>,
}

impl MailboxView {
    /// Creates an empty view.
    #[must_use]
    pub fn new(folder: Folder) -> Self {
        Self {
            folder,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Folder shown by this view.
    #[must_use]
    pub const fn folder(&self) -> Folder {
        self.folder
    }

    /// Starts a fetch, superseding any fetch already in flight.
    pub fn begin_fetch(&self) -> FetchTicket {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.active = true;
        FetchTicket {
            folder: self.folder,
            generation: inner.generation,
        }
    }

    /// Applies a fetch result. Returns false if the result was stale.
    pub fn complete(&self, ticket: FetchTicket, records: Vec<EmailRecord>) -> bool {
        let mut inner = self.lock();
        if !inner.active || ticket.generation != inner.generation || ticket.folder != self.folder {
            debug!(
                folder = %self.folder,
                ticket = ticket.generation,
                current = inner.generation,
                "Dropping stale mailbox response"
            );
            return false;
        }
        if let Some(previous) = &inner.records {
            report_regressions(self.folder, previous, &records);
        }
        inner.records = Some(records);
        true
    }

    /// Marks the view as no longer shown. Fetches in flight are dropped.
    pub fn leave(&self) {
        let mut inner = self.lock();
        inner.active = false;
        inner.generation += 1;
    }

    /// Forgets the cached listing so the next load refetches.
    ///
    /// Fetches already in flight started before the change that caused the
    /// invalidation, so their results are dropped too.
    pub fn invalidate(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.records = None;
    }

    /// Returns true if no listing is cached.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.lock().records.is_none()
    }

    /// Cached listing.
    #[must_use]
    pub fn records(&self) -> Option<Vec<EmailRecord>> {
        self.lock().records.clone()
    }

    /// Fetches the folder and caches the listing if it is still current.
    ///
    /// The fetched records are returned either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; the cache is left untouched.
    pub async fn refresh<T: Transport>(&self, api: &MailApi<T>) -> Result<Vec<EmailRecord>> {
        let (records, _) = self.fetch(api).await?;
        Ok(records)
    }

    /// Like [`refresh`](Self::refresh), also returning whether the listing
    /// was cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; the cache is left untouched.
    pub async fn fetch<T: Transport>(
        &self,
        api: &MailApi<T>,
    ) -> Result<(Vec<EmailRecord>, bool)> {
        let ticket = self.begin_fetch();
        let records = api.mailbox(self.folder).await?;
        let applied = self.complete(ticket, records.clone());
        Ok((records, applied))
    }

    /// Cached listing, fetching it first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a fetch was needed and failed.
    pub async fn load<T: Transport>(&self, api: &MailApi<T>) -> Result<Vec<EmailRecord>> {
        match self.records() {
            Some(records) => Ok(records),
            None => self.refresh(api).await,
        }
    }

    /// Number of cached records per delivery status of interest.
    #[must_use]
    pub fn delivery_counts(&self) -> (usize, usize) {
        let inner = self.lock();
        let records = inner.records.as_deref().unwrap_or_default();
        let count = |wanted: &DeliveryStatus| {
            records
                .iter()
                .filter(|r| r.status.as_ref() == Some(wanted))
                .count()
        };
        (count(&DeliveryStatus::Queued), count(&DeliveryStatus::Failed))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Logs records whose status moved backwards between two listings.
///
/// The backend stays authoritative; the listing is applied regardless.
fn report_regressions(folder: Folder, previous: &[EmailRecord], next: &[EmailRecord]) {
    let known: HashMap<String, &EmailRecord> = previous
        .iter()
        .filter_map(|r| r.key().map(|key| (key, r)))
        .collect();

    for record in next {
        let Some(key) = record.key() else { continue };
        let Some(old) = known.get(&key) else { continue };

        if let (Some(from), Some(to)) = (&old.status, &record.status) {
            if !from.can_advance_to(to) {
                warn!(%folder, %key, from = from.as_str(), to = to.as_str(), "Delivery status regressed");
            }
        }
        if let (Some(from), Some(to)) = (&old.decryption_status, &record.decryption_status) {
            if !from.can_advance_to(to) {
                warn!(%folder, %key, from = from.as_str(), to = to.as_str(), "Decryption status regressed");
            }
        }
    }
}

/// Views for every folder.
#[derive(Debug)]
pub struct Mailboxes {
    inbox: Arc<MailboxView>,
    sent: Arc<MailboxView>,
    outbox: Arc<MailboxView>,
}

impl Mailboxes {
    /// Creates empty views.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inbox: Arc::new(MailboxView::new(Folder::Inbox)),
            sent: Arc::new(MailboxView::new(Folder::Sent)),
            outbox: Arc::new(MailboxView::new(Folder::Outbox)),
        }
    }

    /// View for `folder`.
    #[must_use]
    pub const fn get(&self, folder: Folder) -> &Arc<MailboxView> {
        match folder {
            Folder::Inbox => &self.inbox,
            Folder::Sent => &self.sent,
            Folder::Outbox => &self.outbox,
        }
    }

    /// Drops every cached listing, e.g. when the session ends.
    pub fn clear(&self) {
        for folder in Folder::ALL {
            self.get(folder).invalidate();
        }
    }
}

impl Default for Mailboxes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox_record(id: i64, status: DeliveryStatus) -> EmailRecord {
        EmailRecord {
            id: Some(id),
            status: Some(status),
            ..EmailRecord::default()
        }
    }

    #[test]
    fn test_newer_fetch_wins() {
        let view = MailboxView::new(Folder::Outbox);
        let slow = view.begin_fetch();
        let fast = view.begin_fetch();

        assert!(view.complete(fast, vec![outbox_record(1, DeliveryStatus::Sent)]));
        assert!(!view.complete(slow, vec![outbox_record(1, DeliveryStatus::Queued)]));

        let records = view.records().unwrap_or_default();
        assert_eq!(records[0].status, Some(DeliveryStatus::Sent));
    }

    #[test]
    fn test_response_after_leaving_is_dropped() {
        let view = MailboxView::new(Folder::Inbox);
        let ticket = view.begin_fetch();
        view.leave();

        assert!(!view.complete(ticket, Vec::new()));
        assert!(view.is_stale());
    }

    #[test]
    fn test_invalidate_drops_fetch_in_flight() {
        let view = MailboxView::new(Folder::Sent);
        let ticket = view.begin_fetch();
        view.invalidate();

        assert!(!view.complete(ticket, vec![outbox_record(1, DeliveryStatus::Sent)]));
        assert!(view.is_stale());

        // A fetch started afterwards is applied.
        let ticket = view.begin_fetch();
        assert!(view.complete(ticket, Vec::new()));
        assert!(!view.is_stale());
    }

    #[test]
    fn test_regressed_status_is_still_applied() {
        let view = MailboxView::new(Folder::Outbox);
        let first = view.begin_fetch();
        view.complete(first, vec![outbox_record(7, DeliveryStatus::Sent)]);

        let second = view.begin_fetch();
        assert!(view.complete(second, vec![outbox_record(7, DeliveryStatus::Queued)]));
        assert_eq!(view.delivery_counts(), (1, 0));
    }

    #[test]
    fn test_delivery_counts() {
        let view = MailboxView::new(Folder::Outbox);
        let ticket = view.begin_fetch();
        view.complete(
            ticket,
            vec![
                outbox_record(1, DeliveryStatus::Queued),
                outbox_record(2, DeliveryStatus::Queued),
                outbox_record(3, DeliveryStatus::Failed),
                outbox_record(4, DeliveryStatus::Sent),
            ],
        );
        assert_eq!(view.delivery_counts(), (2, 1));
    }

    #[test]
    fn test_clear_drops_everything() {
        let mailboxes = Mailboxes::new();
        let view = mailboxes.get(Folder::Inbox);
        let ticket = view.begin_fetch();
        mailboxes.clear();

        assert!(!view.complete(ticket, Vec::new()));
        assert!(view.is_stale());
    }
}
