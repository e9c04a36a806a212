//! In-memory message queue mock.
//!
//! # Responsibility
//! - Stand in for a topic-partitioned broker in tests and local wiring.
//!
//! # Invariants
//! - Topics are fixed per instance when it is built; producing to any other
//!   topic fails with `UnknownTopic` and stores nothing.
//! - Offsets are per topic, start at 0 and grow by one per message.
//! - Transactions only flag state, like the in-memory repository.

use super::capability::Transactional;
use super::{RepoError, RepoResult};
use log::debug;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// One message as stored on a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage<K, V> {
    pub offset: u64,
    /// Produce time in epoch milliseconds.
    pub timestamp_ms: i64,
    pub key: K,
    /// `None` is a tombstone.
    pub value: Option<V>,
}

#[derive(Debug)]
pub struct InMemoryQueue<K, V> {
    topics: BTreeMap<String, Vec<QueueMessage<K, V>>>,
    in_transaction: bool,
}

impl<K, V> InMemoryQueue<K, V> {
    /// Creates a queue that accepts exactly `topics`.
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics
                .into_iter()
                .map(|topic| (topic.into(), Vec::new()))
                .collect(),
            in_transaction: false,
        }
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Appends a message and returns it with its assigned offset.
    pub fn produce(
        &mut self,
        topic: &str,
        key: K,
        value: Option<V>,
    ) -> RepoResult<&QueueMessage<K, V>> {
        let messages = self
            .topics
            .get_mut(topic)
            .ok_or_else(|| RepoError::UnknownTopic(topic.to_string()))?;

        let offset = messages.len() as u64;
        messages.push(QueueMessage {
            offset,
            timestamp_ms: now_epoch_ms(),
            key,
            value,
        });
        debug!("event=queue_produce module=repo status=ok topic={topic} offset={offset}");

        messages
            .last()
            .ok_or_else(|| RepoError::InvalidData(format!("topic {topic} lost its message")))
    }

    /// Messages on `topic` in offset order.
    pub fn messages(&self, topic: &str) -> RepoResult<&[QueueMessage<K, V>]> {
        self.topics
            .get(topic)
            .map(Vec::as_slice)
            .ok_or_else(|| RepoError::UnknownTopic(topic.to_string()))
    }
}

impl<K, V> Transactional for InMemoryQueue<K, V> {
    fn begin(&mut self) -> RepoResult<()> {
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> RepoResult<()> {
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> RepoResult<()> {
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
