//! Process-local partitioned bus.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{BusError, Result};
use crate::handler::MessageHandler;
use crate::message::Message;
use crate::producer::Producer;

type OffsetKey = (String, String, u32);

/// Retained suffix of one partition log. Offsets stay absolute: the first
/// retained message has offset `base`.
#[derive(Clone, Default)]
struct Partition {
    base: u64,
    messages: VecDeque<Message>,
}

impl Partition {
    fn end(&self) -> u64 {
        self.base + self.messages.len() as u64
    }

    fn get(&self, offset: u64) -> Option<&Message> {
        let index = offset.checked_sub(self.base)?;
        self.messages.get(usize::try_from(index).ok()?)
    }

    /// Drops every message below `offset`.
    fn trim_to(&mut self, offset: u64) {
        while self.base < offset && self.messages.pop_front().is_some() {
            self.base += 1;
        }
    }
}

#[derive(Default)]
struct BusState {
    topics: HashMap<String, Vec<Partition>>,
    committed: HashMap<OffsetKey, u64>,
    groups: BTreeMap<String, Vec<String>>,
    /// Every group that ever subscribed to a topic, stopped ones included.
    readers: HashMap<String, BTreeSet<String>>,
    fail_on_publish: HashSet<String>,
    next_unkeyed: u64,
}

/// In-memory bus with per-topic partitions and consumer-group offsets.
///
/// A new group starts from the earliest retained offset. Offsets survive a
/// stopped subscription, so subscribing the same group again resumes where it
/// left off. A message is dropped once every group that ever read its topic
/// has committed past it; topics nobody reads keep everything.
#[derive(Clone)]
pub struct InMemoryBus {
    partitions: u32,
    state: Arc<Mutex<BusState>>,
    published: Arc<watch::Sender<u64>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(1)
    }
}

impl InMemoryBus {
    pub fn new(partitions: u32) -> Self {
        let (published, _) = watch::channel(0);
        Self {
            partitions: partitions.max(1),
            state: Arc::new(Mutex::new(BusState::default())),
            published: Arc::new(published),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn partition_for(&self, key: Option<&str>, state: &mut BusState) -> u32 {
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % u64::from(self.partitions)) as u32
            }
            None => {
                state.next_unkeyed = state.next_unkeyed.wrapping_add(1);
                (state.next_unkeyed % u64::from(self.partitions)) as u32
            }
        }
    }

    /// Makes publishing to `topic` fail (or succeed again).
    pub fn set_fail_on_publish(&self, topic: &str, fail: bool) {
        let mut state = self.lock();
        if fail {
            state.fail_on_publish.insert(topic.to_string());
        } else {
            state.fail_on_publish.remove(topic);
        }
    }

    /// Retained messages on `topic`, partition by partition.
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.lock()
            .topics
            .get(topic)
            .map(|partitions| {
                partitions
                    .iter()
                    .flat_map(|p| p.messages.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of messages ever published to `topic`, trimmed ones included.
    pub fn published_count(&self, topic: &str) -> u64 {
        self.lock()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().map(Partition::end).sum())
            .unwrap_or(0)
    }

    /// Number of messages still held for `topic`.
    pub fn retained(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().map(|p| p.messages.len()).sum())
            .unwrap_or(0)
    }

    /// Offset the next message on `(topic, partition)` will receive.
    pub fn end_offset(&self, topic: &str, partition: u32) -> u64 {
        self.lock()
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .map(Partition::end)
            .unwrap_or(0)
    }

    /// Next offset `group` will read from `(topic, partition)`.
    pub fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> u64 {
        self.lock()
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    /// Unconsumed messages across every topic `group` is subscribed to.
    pub fn lag(&self, group: &str) -> u64 {
        let state = self.lock();
        state
            .groups
            .get(group)
            .map(|topics| {
                topics
                    .iter()
                    .map(|topic| group_lag(&state, group, topic))
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Waits until every active group has consumed everything on its topics.
    ///
    /// Returns `false` if that did not happen within `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                // One lock for every group, so a handler cannot publish between checks.
                let state = self.lock();
                let idle = state.groups.iter().all(|(group, topics)| {
                    topics.iter().all(|topic| group_lag(&state, group, topic) == 0)
                });
                if idle {
                    return true;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Attaches `handler` to `topics` as consumer group `group`.
    pub fn subscribe<H: MessageHandler>(
        &self,
        group: &str,
        topics: &[&str],
        handler: H,
    ) -> Result<ConsumerHandle> {
        if topics.is_empty() {
            return Err(BusError::NoTopics(group.to_string()));
        }
        {
            let mut state = self.lock();
            if state.groups.contains_key(group) {
                return Err(BusError::GroupInUse(group.to_string()));
            }
            state.groups.insert(
                group.to_string(),
                topics.iter().map(|t| t.to_string()).collect(),
            );
            for topic in topics {
                state
                    .readers
                    .entry(topic.to_string())
                    .or_default()
                    .insert(group.to_string());
            }
        }
        tracing::info!(%group, ?topics, "consumer subscribed");

        let (stop_tx, stop_rx) = watch::channel(false);
        let consumer = Consumer {
            bus: self.clone(),
            group: group.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            handler,
        };
        let task = tokio::spawn(consumer.run(stop_rx));

        Ok(ConsumerHandle {
            bus: self.clone(),
            group: group.to_string(),
            stop_tx,
            task,
        })
    }

    fn next_pending(&self, group: &str, topics: &[String]) -> Option<Message> {
        let state = self.lock();
        for topic in topics {
            let Some(partitions) = state.topics.get(topic) else {
                continue;
            };
            for (partition, log) in partitions.iter().enumerate() {
                let position = read_position(&state, group, topic, partition as u32, log);
                if let Some(message) = log.get(position) {
                    return Some(message.clone());
                }
            }
        }
        None
    }

    /// Records `group`'s progress, then drops what every reader has consumed.
    fn commit(&self, group: &str, message: &Message) {
        let mut state = self.lock();
        state.committed.insert(
            (group.to_string(), message.topic.clone(), message.partition),
            message.offset + 1,
        );

        let Some(readers) = state.readers.get(&message.topic) else {
            return;
        };
        let low_watermark = readers
            .iter()
            .map(|reader| {
                state
                    .committed
                    .get(&(reader.clone(), message.topic.clone(), message.partition))
                    .copied()
                    .unwrap_or(0)
            })
            .min()
            .unwrap_or(0);

        if let Some(log) = state
            .topics
            .get_mut(&message.topic)
            .and_then(|partitions| partitions.get_mut(message.partition as usize))
        {
            log.trim_to(low_watermark);
        }
    }
}

/// Next offset `group` reads from `log`; never below the retained base.
fn read_position(state: &BusState, group: &str, topic: &str, partition: u32, log: &Partition) -> u64 {
    state
        .committed
        .get(&(group.to_string(), topic.to_string(), partition))
        .copied()
        .unwrap_or(0)
        .max(log.base)
}

fn group_lag(state: &BusState, group: &str, topic: &str) -> u64 {
    let Some(partitions) = state.topics.get(topic) else {
        return 0;
    };
    partitions
        .iter()
        .enumerate()
        .map(|(partition, log)| {
            log.end()
                .saturating_sub(read_position(state, group, topic, partition as u32, log))
        })
        .sum()
}

#[async_trait]
impl Producer for InMemoryBus {
    async fn send(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<()> {
        {
            let mut state = self.lock();
            if state.fail_on_publish.contains(topic) {
                return Err(BusError::Publish {
                    topic: topic.to_string(),
                    reason: "broker unavailable".to_string(),
                });
            }
            let partition = self.partition_for(key, &mut state);
            let partitions = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| vec![Partition::default(); self.partitions as usize]);
            let log = &mut partitions[partition as usize];
            let offset = log.end();
            log.messages.push_back(Message {
                topic: topic.to_string(),
                partition,
                offset,
                key: key.map(str::to_string),
                payload,
            });
            tracing::debug!(%topic, partition, offset, "message published");
        }

        metrics::counter!("bus_messages_published_total", "topic" => topic.to_string())
            .increment(1);
        self.published.send_modify(|seq| *seq += 1);
        Ok(())
    }
}

struct Consumer<H> {
    bus: InMemoryBus,
    group: String,
    topics: Vec<String>,
    handler: H,
}

impl<H: MessageHandler> Consumer<H> {
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let mut published = self.bus.published.subscribe();
        loop {
            if *stop_rx.borrow() {
                break;
            }
            let _ = published.borrow_and_update();

            match self.bus.next_pending(&self.group, &self.topics) {
                Some(message) => self.process(message).await,
                None => {
                    tokio::select! {
                        stopped = stop_rx.changed() => {
                            if stopped.is_err() {
                                break;
                            }
                        }
                        changed = published.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        tracing::info!(group = %self.group, "consumer stopped");
    }

    async fn process(&self, message: Message) {
        tracing::debug!(
            group = %self.group,
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "handling message"
        );
        if let Err(e) = self.handler.handle(&message).await {
            tracing::error!(
                group = %self.group,
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "message handler failed"
            );
            metrics::counter!("bus_handler_failures_total", "topic" => message.topic.clone())
                .increment(1);
        }
        self.bus.commit(&self.group, &message);
    }
}

/// A running consumer-group subscription.
pub struct ConsumerHandle {
    bus: InMemoryBus,
    group: String,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Stops after the message in progress and releases the group.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(group = %self.group, error = %e, "consumer task failed");
        }
        self.bus.lock().groups.remove(&self.group);
    }
}
