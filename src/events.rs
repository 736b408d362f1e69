//! Process-local publish/subscribe for sync outcomes.
//!
//! Each subscriber owns a channel receiver; publishing clones the event into
//! every live channel and forgets subscribers whose receiver was dropped.

use std::{
    sync::{
        Mutex,
        mpsc::{self, Receiver, Sender},
    },
    time::{Duration, Instant},
};

use log::debug;

use crate::backend::ResourceKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// An import finished; `added` rows were stored.
    Imported { resource: ResourceKind, added: usize },
    /// An import was rejected or failed; `resource` is unknown when it could
    /// not be inferred from the upload.
    ImportFailed {
        resource: Option<ResourceKind>,
        message: String,
    },
    /// A collection changed outside an import (derivation, edit, delete).
    StoreUpdated { resource: ResourceKind },
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<SyncEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: SyncEvent) {
        debug!("event: {event:?}");
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<SyncEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Error,
}

/// Latest user-facing status line, dismissed after a fixed duration.
#[derive(Debug)]
pub struct StatusBoard {
    dismiss_after: Duration,
    current: Option<(StatusKind, String, Instant)>,
}

impl StatusBoard {
    pub fn new(dismiss_after: Duration) -> Self {
        Self {
            dismiss_after,
            current: None,
        }
    }

    /// Updates the status from an event; store refreshes leave it alone.
    pub fn apply(&mut self, event: &SyncEvent, now: Instant) {
        let (kind, text) = match event {
            SyncEvent::Imported { added, .. } => {
                (StatusKind::Success, format!("Success {added} rows added"))
            }
            SyncEvent::ImportFailed { message, .. } => (StatusKind::Error, message.clone()),
            SyncEvent::StoreUpdated { .. } => return,
        };
        self.current = Some((kind, text, now));
    }

    pub fn current(&self, now: Instant) -> Option<(StatusKind, &str)> {
        let (kind, text, shown_at) = self.current.as_ref()?;
        (now.saturating_duration_since(*shown_at) < self.dismiss_after)
            .then_some((*kind, text.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_events_in_order() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();
        bus.publish(SyncEvent::Imported {
            resource: ResourceKind::Pipeline,
            added: 2,
        });
        bus.publish(SyncEvent::StoreUpdated {
            resource: ResourceKind::Contacts,
        });
        for rx in [&first, &second] {
            let events = rx.try_iter().collect::<Vec<_>>();
            assert_eq!(events.len(), 2);
            assert!(matches!(events[0], SyncEvent::Imported { added: 2, .. }));
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(SyncEvent::ImportFailed {
            resource: Some(ResourceKind::Deals),
            message: "Empty file".into(),
        });
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_iter().count(), 1);
    }

    #[test]
    fn status_is_dismissed_after_its_duration() {
        let mut board = StatusBoard::new(Duration::from_millis(6_000));
        let start = Instant::now();
        board.apply(
            &SyncEvent::Imported {
                resource: ResourceKind::Pipeline,
                added: 2,
            },
            start,
        );
        board.apply(
            &SyncEvent::StoreUpdated {
                resource: ResourceKind::Contacts,
            },
            start,
        );
        assert_eq!(
            board.current(start + Duration::from_millis(5_999)),
            Some((StatusKind::Success, "Success 2 rows added"))
        );
        assert_eq!(board.current(start + Duration::from_millis(6_000)), None);
    }
}
