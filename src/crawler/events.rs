//! Progress event fan-out
//!
//! Workers publish typed events to any number of subscribers without ever
//! blocking on them. Each subscriber owns a bounded channel: coalescible
//! events (periodic status updates) are silently dropped for a slow
//! subscriber, while a subscriber that cannot take a critical event
//! (page completions, terminals) is disconnected with a best-effort
//! overflow notice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;

use super::types::{FailureInfo, JobSnapshot, MultiJobSnapshot, PageStatus};

/// Default per-subscriber buffer size
pub const SUBSCRIBER_BUFFER: usize = 256;

/// Compact per-page completion notice
#[derive(Debug, Clone, Serialize)]
pub struct PageCompleted {
    pub url: String,
    pub status: PageStatus,
    pub depth: u32,
    pub links_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_prefix: Option<String>,
}

/// Events published by a single-scope job
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    InitialStatus { data: JobSnapshot },
    StatusUpdate { data: JobSnapshot },
    PageComplete { data: PageCompleted },
    JobCompleted { data: JobSnapshot },
    JobFailed { data: JobSnapshot, error: String },
    JobCancelled { data: JobSnapshot },
    SubscriberOverflow,
}

/// Events published by a multi-scope scheduler
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MultiJobEvent {
    InitialStatus { data: MultiJobSnapshot },
    StatusUpdate { data: MultiJobSnapshot },
    PageComplete { data: PageCompleted },
    ScopeCompleted { data: JobSnapshot },
    JobCompleted { data: MultiJobSnapshot },
    JobFailed { data: MultiJobSnapshot, error: String },
    JobCancelled { data: MultiJobSnapshot },
    SubscriberOverflow,
}

struct Subscriber<E> {
    id: u64,
    tx: mpsc::Sender<E>,
}

/// Non-blocking fan-out of events to bounded per-subscriber channels
pub struct ProgressBus<E> {
    subscribers: Mutex<Vec<Subscriber<E>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<E: Clone> ProgressBus<E> {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            capacity,
        }
    }

    /// Registers a subscriber; `initial` is delivered first
    pub fn subscribe(&self, initial: E) -> mpsc::Receiver<E> {
        let (tx, rx) = mpsc::channel(self.capacity);
        // The channel is fresh, so the initial event cannot fail on capacity.
        let _ = tx.try_send(initial);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Subscriber { id, tx });
        rx
    }

    /// Publishes an event a slow subscriber may miss (status updates)
    pub fn publish_coalescible(&self, event: E) {
        let mut subscribers = self.lock();
        subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Publishes an event every live subscriber must receive
    ///
    /// A subscriber whose buffer is full is disconnected; `overflow` is
    /// offered as a parting notice (best-effort: its buffer is full).
    pub fn publish_critical(&self, event: E, overflow: E) {
        let mut dropped: Vec<u64> = Vec::new();
        let mut subscribers = self.lock();

        subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = sub.tx.try_send(overflow.clone());
                dropped.push(sub.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        for id in dropped {
            tracing::warn!("Dropped subscriber {} after buffer overflow", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber<E>>> {
        self.subscribers.lock().expect("bus lock poisoned")
    }
}
