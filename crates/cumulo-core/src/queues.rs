// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lease-based in-memory queues.
//!
//! Per message the state machine is
//! `Queued -> Leased(lease_id, expiry) -> [Completed | Queued]`: dequeue
//! only leases, complete removes, and an expired lease silently returns the
//! message to the eligible pool at the next read (expiry is a wall-clock
//! comparison, there is no background sweep).
//!
//! All operations serialize on one lock. The queue is a development aid,
//! not a throughput path, and a single lock rules out lost-update races
//! between concurrent dequeues leasing the same item.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cumulo_protocol::messages::LeasedMessage;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Default visibility timeout attached on dequeue.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest allowed dequeue depth.
pub const MAX_DEQUEUE_DEPTH: u32 = 10;

/// A time-bounded exclusive claim on a queued message.
#[derive(Debug, Clone)]
struct Lease {
    id: String,
    expires_at: DateTime<Utc>,
}

impl Lease {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// One queued message and its optional lease.
#[derive(Debug, Clone)]
struct QueueItem {
    payload: Vec<u8>,
    lease: Option<Lease>,
}

/// In-memory FIFO-per-topic store with lease/visibility-timeout semantics.
pub struct QueueManager {
    queues: Mutex<HashMap<String, Vec<QueueItem>>>,
    visibility_timeout: chrono::Duration,
}

impl QueueManager {
    /// Create a manager with the default 30 s visibility timeout.
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    /// Create a manager with a custom visibility timeout.
    pub fn with_visibility_timeout(timeout: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            visibility_timeout: chrono::Duration::from_std(timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
        }
    }

    /// Append messages in order, lazily creating the queue on first use.
    pub fn enqueue(&self, queue: &str, messages: Vec<Vec<u8>>) -> Result<u32> {
        let mut queues = self.queues.lock().expect("queue lock poisoned");
        let items = queues.entry(queue.to_string()).or_default();
        let count = messages.len() as u32;
        for payload in messages {
            items.push(QueueItem {
                payload,
                lease: None,
            });
        }
        debug!(queue, count, depth = items.len(), "enqueued messages");
        Ok(count)
    }

    /// Lease up to `depth` messages.
    ///
    /// Scans the queue in order, skipping items whose lease has not yet
    /// expired; eligible items get a fresh lease id and the visibility
    /// timeout. Items are not removed, only leased.
    pub fn dequeue(&self, queue: &str, depth: u32) -> Result<Vec<LeasedMessage>> {
        if depth < 1 || depth > MAX_DEQUEUE_DEPTH {
            return Err(CoreError::InvalidDepth { depth });
        }

        let mut queues = self.queues.lock().expect("queue lock poisoned");
        let Some(items) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let now = Utc::now();
        let mut leased = Vec::new();
        for item in items.iter_mut() {
            if leased.len() as u32 >= depth {
                break;
            }
            if item.lease.as_ref().is_some_and(|l| l.is_live(now)) {
                continue;
            }
            let lease = Lease {
                id: Uuid::new_v4().to_string(),
                expires_at: now + self.visibility_timeout,
            };
            leased.push(LeasedMessage {
                lease_id: lease.id.clone(),
                payload: item.payload.clone(),
            });
            item.lease = Some(lease);
        }

        debug!(queue, leased = leased.len(), "dequeued messages");
        Ok(leased)
    }

    /// Remove the message whose current lease id matches, provided the lease
    /// is still live.
    ///
    /// An expired lease fails with [`CoreError::LeaseExpired`] and leaves the
    /// message in place (it is already eligible for redelivery); an unknown
    /// lease id fails with [`CoreError::LeaseNotFound`]. Neither has side
    /// effects.
    pub fn complete(&self, queue: &str, lease_id: &str) -> Result<()> {
        let mut queues = self.queues.lock().expect("queue lock poisoned");
        let Some(items) = queues.get_mut(queue) else {
            return Err(CoreError::LeaseNotFound {
                queue: queue.to_string(),
                lease_id: lease_id.to_string(),
            });
        };

        let now = Utc::now();
        let position = items
            .iter()
            .position(|item| item.lease.as_ref().is_some_and(|l| l.id == lease_id));

        match position {
            Some(index) => {
                let live = items[index]
                    .lease
                    .as_ref()
                    .is_some_and(|l| l.is_live(now));
                if !live {
                    return Err(CoreError::LeaseExpired {
                        queue: queue.to_string(),
                        lease_id: lease_id.to_string(),
                    });
                }
                items.remove(index);
                debug!(queue, lease_id, "completed message");
                Ok(())
            }
            None => Err(CoreError::LeaseNotFound {
                queue: queue.to_string(),
                lease_id: lease_id.to_string(),
            }),
        }
    }

    /// Total number of items (leased or not) in a queue.
    pub fn depth(&self, queue: &str) -> usize {
        let queues = self.queues.lock().expect("queue lock poisoned");
        queues.get(queue).map(|items| items.len()).unwrap_or(0)
    }
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(values: &[&str]) -> Vec<Vec<u8>> {
        values.iter().map(|v| v.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_dequeue_rejects_invalid_depth() {
        let queues = QueueManager::new();
        assert!(matches!(
            queues.dequeue("q", 0),
            Err(CoreError::InvalidDepth { depth: 0 })
        ));
        assert!(matches!(
            queues.dequeue("q", 11),
            Err(CoreError::InvalidDepth { depth: 11 })
        ));
    }

    #[test]
    fn test_dequeue_unknown_queue_returns_empty() {
        let queues = QueueManager::new();
        assert!(queues.dequeue("missing", 5).unwrap().is_empty());
    }

    #[test]
    fn test_dequeue_never_exceeds_depth() {
        let queues = QueueManager::new();
        queues
            .enqueue("q", payloads(&["a", "b", "c", "d"]))
            .unwrap();

        let leased = queues.dequeue("q", 2).unwrap();
        assert_eq!(leased.len(), 2);
        assert_eq!(leased[0].payload, b"a");
        assert_eq!(leased[1].payload, b"b");
        // Leasing does not remove.
        assert_eq!(queues.depth("q"), 4);
    }

    #[test]
    fn test_leased_message_is_skipped_until_completion() {
        let queues = QueueManager::new();
        queues.enqueue("q", payloads(&["a", "b"])).unwrap();

        let first = queues.dequeue("q", 1).unwrap();
        assert_eq!(first[0].payload, b"a");

        // "a" holds a live lease, so the next dequeue sees "b".
        let second = queues.dequeue("q", 1).unwrap();
        assert_eq!(second[0].payload, b"b");

        queues.complete("q", &first[0].lease_id).unwrap();
        assert_eq!(queues.depth("q"), 1);

        // Nothing eligible: "b" is still leased.
        assert!(queues.dequeue("q", 1).unwrap().is_empty());
    }

    #[test]
    fn test_expired_lease_is_eligible_again() {
        let queues = QueueManager::with_visibility_timeout(Duration::ZERO);
        queues.enqueue("q", payloads(&["a"])).unwrap();

        let first = queues.dequeue("q", 1).unwrap();
        // The zero-length lease is already expired, so the message is
        // immediately redeliverable under a new lease id.
        let second = queues.dequeue("q", 1).unwrap();
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].lease_id, second[0].lease_id);
    }

    #[test]
    fn test_complete_with_expired_lease_fails_without_removal() {
        let queues = QueueManager::with_visibility_timeout(Duration::ZERO);
        queues.enqueue("q", payloads(&["a"])).unwrap();

        let leased = queues.dequeue("q", 1).unwrap();
        assert!(matches!(
            queues.complete("q", &leased[0].lease_id),
            Err(CoreError::LeaseExpired { .. })
        ));
        assert_eq!(queues.depth("q"), 1);
    }

    #[test]
    fn test_complete_unknown_lease_fails() {
        let queues = QueueManager::new();
        queues.enqueue("q", payloads(&["a"])).unwrap();

        assert!(matches!(
            queues.complete("q", "no-such-lease"),
            Err(CoreError::LeaseNotFound { .. })
        ));
        assert!(matches!(
            queues.complete("other", "no-such-lease"),
            Err(CoreError::LeaseNotFound { .. })
        ));
    }

    #[test]
    fn test_complete_removes_exactly_once() {
        let queues = QueueManager::new();
        queues.enqueue("q", payloads(&["a"])).unwrap();

        let leased = queues.dequeue("q", 1).unwrap();
        queues.complete("q", &leased[0].lease_id).unwrap();
        assert_eq!(queues.depth("q"), 0);

        assert!(matches!(
            queues.complete("q", &leased[0].lease_id),
            Err(CoreError::LeaseNotFound { .. })
        ));
    }

    #[test]
    fn test_fifo_order_preserved_across_enqueues() {
        let queues = QueueManager::new();
        queues.enqueue("q", payloads(&["a"])).unwrap();
        queues.enqueue("q", payloads(&["b", "c"])).unwrap();

        let leased = queues.dequeue("q", 10).unwrap();
        let bodies: Vec<&[u8]> = leased.iter().map(|m| m.payload.as_slice()).collect();
        assert_eq!(bodies, vec![b"a".as_slice(), b"b".as_slice(), b"c".as_slice()]);
    }
}
