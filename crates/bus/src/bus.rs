// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic-based publish/subscribe bus with a single delivery worker.
//!
//! ```text
//! publish(topic, msg) ──▶ bounded FIFO ──▶ worker thread
//!                                            │ snapshot topic subscribers
//!                                            │ invoke each (errors/panics contained)
//!                                            └─ broadcast subscribers if topic or
//!                                               receiver is "broadcast"
//! ```
//!
//! Same-topic delivery is FIFO. A subscriber added or removed while a
//! message is being delivered takes effect from the next message.

use crate::error::{BusError, DeliveryError};
use colony_core::{catch_panic, join_with_timeout, JoinError, Message, BROADCAST};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Default maximum number of queued messages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Callback invoked for each delivered message.
pub type Subscriber = Arc<dyn Fn(&Message) -> Result<(), DeliveryError> + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Bus tuning.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub capacity: usize,
    /// How long the worker waits on an empty queue before re-checking stop.
    pub poll_interval: Duration,
    pub join_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: Duration::from_millis(500),
            join_timeout: Duration::from_secs(2),
        }
    }
}

type SubscriberList = Vec<(SubscriptionId, Subscriber)>;

struct Shared {
    config: BusConfig,
    queue: Mutex<VecDeque<(String, Message)>>,
    available: Condvar,
    topics: Mutex<HashMap<String, SubscriberList>>,
    broadcast: Mutex<SubscriberList>,
    running: AtomicBool,
    /// Bumped on every start so a worker that outlived its join exits.
    generation: AtomicU64,
    next_id: AtomicU64,
}

/// Publish/subscribe bus.
pub struct PubSubBus {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for PubSubBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl PubSubBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                queue: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
                topics: Mutex::new(HashMap::new()),
                broadcast: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
            }),
            worker: Mutex::new(None),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn subscribe<F>(&self, topic: impl Into<String>, subscriber: F) -> SubscriptionId
    where
        F: Fn(&Message) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        let subscriber: Subscriber = Arc::new(subscriber);
        let topic = topic.into();
        let id = self.next_id();
        tracing::debug!(%topic, subscription = %id, "subscribed");
        self.shared
            .topics
            .lock()
            .entry(topic)
            .or_default()
            .push((id, subscriber));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut topics = self.shared.topics.lock();
        let Some(subs) = topics.get_mut(topic) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(sub, _)| *sub != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    pub fn subscribe_broadcast<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&Message) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        let subscriber: Subscriber = Arc::new(subscriber);
        let id = self.next_id();
        self.shared.broadcast.lock().push((id, subscriber));
        id
    }

    pub fn unsubscribe_broadcast(&self, id: SubscriptionId) -> bool {
        let mut subs = self.shared.broadcast.lock();
        let before = subs.len();
        subs.retain(|(sub, _)| *sub != id);
        subs.len() != before
    }

    /// Enqueue `message` for delivery on `topic`. Never blocks.
    pub fn publish(&self, topic: impl Into<String>, message: Message) -> Result<(), BusError> {
        message.validate()?;
        let topic = topic.into();
        let mut queue = self.shared.queue.lock();
        let capacity = self.shared.config.capacity;
        if queue.len() >= capacity {
            tracing::warn!(%topic, message_id = %message.id(), capacity, "message queue full");
            return Err(BusError::QueueFull { capacity });
        }
        tracing::trace!(%topic, message_id = %message.id(), "queued");
        queue.push_back((topic, message));
        self.shared.available.notify_one();
        Ok(())
    }

    /// Start the delivery worker. Starting a running bus is a no-op.
    pub fn start(&self) -> Result<(), BusError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("bus already running");
            return Ok(());
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("colony-bus".to_string())
            .spawn(move || run_worker(&shared, generation))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                BusError::Spawn(e)
            })?;
        *self.worker.lock() = Some(handle);
        tracing::info!("message bus started");
        Ok(())
    }

    /// Stop the worker, waiting up to the configured join timeout.
    /// Undelivered messages stay queued.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        {
            let _queue = self.shared.queue.lock();
            self.shared.available.notify_all();
        }
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        match join_with_timeout(handle, self.shared.config.join_timeout) {
            Ok(()) => tracing::info!("message bus stopped"),
            Err(JoinError::TimedOut(after)) => {
                tracing::warn!(?after, "bus worker did not exit in time")
            }
            Err(JoinError::Panicked) => tracing::error!("bus worker panicked"),
            Err(JoinError::CurrentThread) => {
                tracing::debug!("bus stopped from its own worker, exiting after this delivery")
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared.topics.lock().get(topic).map_or(0, Vec::len)
    }

    pub fn broadcast_subscriber_count(&self) -> usize {
        self.shared.broadcast.lock().len()
    }

    /// Topics with at least one subscriber.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.shared.topics.lock().keys().cloned().collect();
        topics.sort();
        topics
    }
}

impl Drop for PubSubBus {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(shared: &Shared, generation: u64) {
    let live = || {
        shared.running.load(Ordering::SeqCst)
            && shared.generation.load(Ordering::SeqCst) == generation
    };
    loop {
        let next = {
            let mut queue = shared.queue.lock();
            if queue.is_empty() && live() {
                shared
                    .available
                    .wait_for(&mut queue, shared.config.poll_interval);
            }
            if !live() {
                break;
            }
            queue.pop_front()
        };
        if let Some((topic, message)) = next {
            deliver(shared, &topic, &message);
        }
    }
}

fn deliver(shared: &Shared, topic: &str, message: &Message) {
    let subscribers: SubscriberList = shared
        .topics
        .lock()
        .get(topic)
        .cloned()
        .unwrap_or_default();
    for (id, subscriber) in &subscribers {
        invoke(topic, *id, subscriber, message);
    }

    if topic == BROADCAST || message.is_broadcast() {
        let subscribers = shared.broadcast.lock().clone();
        for (id, subscriber) in &subscribers {
            invoke(BROADCAST, *id, subscriber, message);
        }
    }
}

fn invoke(topic: &str, id: SubscriptionId, subscriber: &Subscriber, message: &Message) {
    match catch_panic(|| subscriber(message)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(
            %topic,
            subscription = %id,
            message_id = %message.id(),
            error = %e,
            "subscriber failed"
        ),
        Err(panic) => tracing::error!(
            %topic,
            subscription = %id,
            message_id = %message.id(),
            %panic,
            "subscriber panicked"
        ),
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
