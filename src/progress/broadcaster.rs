use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use crate::error::DeckgateError;
use crate::state_machine::JobSnapshot;

/// Events buffered per subscriber before it counts as stalled.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Job topics kept before finished ones are evicted.
pub const DEFAULT_MAX_TOPICS: usize = 4096;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<JobSnapshot>,
}

impl Subscriber {
    /// Only the slot kept for the terminal event is left.
    fn is_stalled(&self) -> bool {
        self.tx.capacity() <= 1
    }

    fn deliver(&self, job_id: &str, event: &JobSnapshot) -> Result<(), DeckgateError> {
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!(job_id, subscriber = self.id, "subscriber buffer full, dropping it");
                Err(DeckgateError::SubscriberGone(job_id.to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                trace!(job_id, subscriber = self.id, "subscriber closed");
                Err(DeckgateError::SubscriberGone(job_id.to_string()))
            }
        }
    }
}

/// Fan-out state for one job.
struct Topic {
    seq: u64,
    subscribers: Vec<Subscriber>,
    /// Fell behind: no more progress, only the terminal event.
    stalled: Vec<Subscriber>,
    latest: Option<JobSnapshot>,
}

impl Topic {
    fn live_subscribers(&self) -> usize {
        self.subscribers.iter().filter(|s| !s.tx.is_closed()).count()
    }

    fn is_finished(&self) -> bool {
        self.latest.as_ref().is_none_or(JobSnapshot::is_terminal)
    }

    /// Safe to drop: nothing is listening and no more events will come.
    fn is_evictable(&self) -> bool {
        self.is_finished() && self.live_subscribers() == 0
    }
}

/// The receiving side of a job's progress stream.
///
/// Dropping it is enough to unsubscribe; the broadcaster notices on the next
/// publish. The stream ends (`recv` returns `None`) after the terminal event.
/// A subscriber that falls behind by a full buffer misses the remaining
/// progress events but still receives the terminal one; the job's status
/// has the current progress in the meantime.
#[derive(Debug)]
pub struct Subscription {
    job_id: String,
    id: u64,
    rx: mpsc::Receiver<JobSnapshot>,
}

impl Subscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn recv(&mut self) -> Option<JobSnapshot> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<JobSnapshot> {
        self.rx.try_recv().ok()
    }
}

/// Registry of live progress subscribers, one topic per job.
///
/// Topics live in a sharded map and each carries its own lock, so publishing
/// to one job never waits on another job's subscribers. Delivery uses
/// `try_send` and the publisher never blocks or sees an error: a subscriber
/// that is gone is dropped, one that is not keeping up is taken off the
/// progress fan-out and only gets the terminal event, through a slot each
/// channel keeps free for it.
pub struct ProgressBroadcaster {
    topics: DashMap<String, Arc<Mutex<Topic>>>,
    next_id: AtomicU64,
    buffer: usize,
    max_topics: usize,
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER, DEFAULT_MAX_TOPICS)
    }
}

impl ProgressBroadcaster {
    pub fn new(buffer: usize, max_topics: usize) -> Self {
        Self {
            topics: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            max_topics: max_topics.max(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn topic(&self, job_id: &str) -> Arc<Mutex<Topic>> {
        if let Some(topic) = self.topics.get(job_id) {
            return Arc::clone(&topic);
        }
        if self.topics.len() >= self.max_topics {
            self.evict_finished();
        }
        let seq = self.next_id();
        self.topics
            .entry(job_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Topic {
                    seq,
                    subscribers: Vec::new(),
                    stalled: Vec::new(),
                    latest: None,
                }))
            })
            .clone()
    }

    /// Subscribe to a job's events.
    ///
    /// A subscriber joining a running job first receives the latest event so
    /// it starts from the current state. If the job already finished, it gets
    /// the terminal event once and the stream closes.
    pub fn subscribe(&self, job_id: &str) -> Subscription {
        self.subscribe_from(job_id, None)
    }

    /// Like [`subscribe`](Self::subscribe), seeding the topic with `current`
    /// when nothing has been published for the job yet (for example after its
    /// topic was evicted).
    pub fn subscribe_from(&self, job_id: &str, current: Option<JobSnapshot>) -> Subscription {
        // One extra slot, reserved for the terminal event.
        let (tx, rx) = mpsc::channel(self.buffer + 1);
        let id = self.next_id();
        let topic = self.topic(job_id);
        let mut topic = topic.lock();

        if topic.latest.is_none() {
            topic.latest = current;
        }

        match &topic.latest {
            Some(latest) if latest.is_terminal() => {
                // The sender is dropped right here, closing the stream.
                let _ = tx.try_send(latest.clone());
                trace!(job_id, subscriber = id, "late subscriber got terminal event");
            }
            Some(latest) => {
                let _ = tx.try_send(latest.clone());
                topic.subscribers.push(Subscriber { id, tx });
            }
            None => topic.subscribers.push(Subscriber { id, tx }),
        }

        Subscription {
            job_id: job_id.to_string(),
            id,
            rx,
        }
    }

    /// Remove a subscription explicitly. Other subscribers are unaffected.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let Some(topic) = self.topics.get(&subscription.job_id).map(|t| Arc::clone(&t)) else {
            return;
        };
        let mut topic = topic.lock();
        topic.subscribers.retain(|s| s.id != subscription.id);
        topic.stalled.retain(|s| s.id != subscription.id);
    }

    /// Deliver `event` to every subscriber of `job_id`, in registration order.
    ///
    /// Returns how many subscribers received it. After a terminal event every
    /// stream is closed and later events for the job are ignored.
    pub fn publish(&self, job_id: &str, event: JobSnapshot) -> usize {
        let topic = self.topic(job_id);
        let mut guard = topic.lock();
        let topic = &mut *guard;

        if topic.latest.as_ref().is_some_and(JobSnapshot::is_terminal) {
            warn!(job_id, state = %event.state, "ignoring event published after terminal state");
            return 0;
        }

        let terminal = event.is_terminal();
        let mut delivered = 0;
        for subscriber in std::mem::take(&mut topic.subscribers) {
            if !terminal && subscriber.is_stalled() {
                debug!(job_id, subscriber = subscriber.id, "subscriber fell behind, holding it for the terminal event");
                topic.stalled.push(subscriber);
                continue;
            }
            if subscriber.deliver(job_id, &event).is_ok() {
                delivered += 1;
                if !terminal {
                    topic.subscribers.push(subscriber);
                }
            }
        }

        if terminal {
            delivered += topic
                .stalled
                .drain(..)
                .filter(|subscriber| subscriber.deliver(job_id, &event).is_ok())
                .count();
        } else {
            topic.stalled.retain(|subscriber| !subscriber.tx.is_closed());
        }
        topic.latest = Some(event);

        delivered
    }

    /// Live subscribers currently registered for `job_id`.
    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.topics
            .get(job_id)
            .map(|topic| Arc::clone(&topic))
            .map(|topic| topic.lock().live_subscribers())
            .unwrap_or(0)
    }

    /// Last event published for `job_id`.
    pub fn latest(&self, job_id: &str) -> Option<JobSnapshot> {
        let topic = self.topics.get(job_id).map(|topic| Arc::clone(&topic))?;
        let latest = topic.lock().latest.clone();
        latest
    }

    /// Drop a job's topic. Refused while the job is still running or has live
    /// subscribers.
    pub fn forget(&self, job_id: &str) -> bool {
        self.topics
            .remove_if(job_id, |_, topic| topic.lock().is_evictable())
            .is_some()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Make room by dropping finished, unwatched topics, oldest first.
    fn evict_finished(&self) {
        let mut candidates: Vec<(u64, String)> = self
            .topics
            .iter()
            .filter_map(|entry| {
                let topic = entry.value().try_lock()?;
                topic
                    .is_evictable()
                    .then(|| (topic.seq, entry.key().clone()))
            })
            .collect();
        candidates.sort_unstable();

        let excess = (self.topics.len() + 1).saturating_sub(self.max_topics);
        let mut evicted = 0;
        for (_, job_id) in candidates {
            if evicted >= excess {
                break;
            }
            if self.forget(&job_id) {
                evicted += 1;
            }
        }

        if evicted < excess {
            warn!(
                topics = self.topics.len(),
                max = self.max_topics,
                "progress registry over capacity; every topic is still in use"
            );
        }
    }
}
