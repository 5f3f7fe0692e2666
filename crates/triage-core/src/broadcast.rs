use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Identifies one live subscription so it can be detached again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Per-incident fan-out of workflow progress events.
///
/// Subscribers register an unbounded channel per incident; `publish` delivers
/// one JSON frame to every channel currently registered for that incident.
/// Events are not queued for late subscribers and publishing to an incident
/// nobody watches is a no-op.
///
/// The subscriber map is the one resource mutated by many connection
/// lifecycles at once: all mutations take the mutex, while publish holds it
/// only long enough to snapshot the sender set (and again to prune senders
/// whose receiving side has gone away).
pub struct EventBroadcaster {
    subscribers: Mutex<HashMap<Uuid, HashMap<u64, mpsc::UnboundedSender<Value>>>>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber under the incident; the returned receiver
    /// yields every frame published after this call.
    pub fn subscribe(&self, incident_id: Uuid) -> (SubscriberId, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subscribers.lock().expect("subscriber map poisoned");
        subs.entry(incident_id).or_default().insert(id, tx);
        (SubscriberId(id), rx)
    }

    /// Detach a subscriber; the incident's entry is removed once its set
    /// empties, so churn does not grow the map.
    pub fn unsubscribe(&self, incident_id: Uuid, subscriber: SubscriberId) {
        let mut subs = self.subscribers.lock().expect("subscriber map poisoned");
        if let Some(set) = subs.get_mut(&incident_id) {
            set.remove(&subscriber.0);
            if set.is_empty() {
                subs.remove(&incident_id);
            }
        }
    }

    /// Send `{event, incident_id, ...fields}` to every current subscriber of
    /// the incident. A closed channel never aborts delivery to the rest; dead
    /// senders are pruned afterwards.
    pub fn publish(&self, incident_id: Uuid, event: &str, fields: Value) {
        let mut frame = serde_json::Map::new();
        frame.insert("event".to_string(), Value::String(event.to_string()));
        frame.insert(
            "incident_id".to_string(),
            Value::String(incident_id.to_string()),
        );
        if let Value::Object(extra) = fields {
            frame.extend(extra);
        }
        let frame = Value::Object(frame);

        let snapshot: Vec<(u64, mpsc::UnboundedSender<Value>)> = {
            let subs = self.subscribers.lock().expect("subscriber map poisoned");
            match subs.get(&incident_id) {
                Some(set) => set.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, tx) in &snapshot {
            if tx.send(frame.clone()).is_err() {
                dead.push(*id);
            }
        }

        if !dead.is_empty() {
            let mut subs = self.subscribers.lock().expect("subscriber map poisoned");
            if let Some(set) = subs.get_mut(&incident_id) {
                for id in dead {
                    set.remove(&id);
                }
                if set.is_empty() {
                    subs.remove(&incident_id);
                }
            }
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, incident_id: Uuid) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(&incident_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publish_without_subscribers_is_noop() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.publish(Uuid::new_v4(), "llm_plan", json!({"steps": []}));
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let incident = Uuid::new_v4();
        let (_a, mut rx_a) = broadcaster.subscribe(incident);
        let (_b, mut rx_b) = broadcaster.subscribe(incident);

        broadcaster.publish(incident, "run_query", json!({"result_count": 3}));

        let frame = rx_a.recv().await.unwrap();
        assert_eq!(frame["event"], "run_query");
        assert_eq!(frame["incident_id"], incident.to_string());
        assert_eq!(frame["result_count"], 3);
        assert_eq!(rx_b.recv().await.unwrap()["event"], "run_query");
    }

    #[tokio::test]
    async fn dead_subscriber_is_pruned_without_blocking_others() {
        let broadcaster = EventBroadcaster::new();
        let incident = Uuid::new_v4();
        let (_dead, rx_dead) = broadcaster.subscribe(incident);
        let (_live, mut rx_live) = broadcaster.subscribe(incident);
        drop(rx_dead);

        broadcaster.publish(incident, "summarize", json!({"summary": "ok"}));

        assert_eq!(rx_live.recv().await.unwrap()["event"], "summarize");
        assert_eq!(broadcaster.subscriber_count(incident), 1);
    }

    #[tokio::test]
    async fn unsubscribe_drops_empty_incident_entry() {
        let broadcaster = EventBroadcaster::new();
        let incident = Uuid::new_v4();
        let (id, _rx) = broadcaster.subscribe(incident);
        assert_eq!(broadcaster.subscriber_count(incident), 1);

        broadcaster.unsubscribe(incident, id);
        assert_eq!(broadcaster.subscriber_count(incident), 0);
        assert!(broadcaster.subscribers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn events_are_not_replayed_to_late_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let incident = Uuid::new_v4();
        broadcaster.publish(incident, "received_alert", json!({}));

        let (_id, mut rx) = broadcaster.subscribe(incident);
        broadcaster.publish(incident, "done", json!({}));
        assert_eq!(rx.recv().await.unwrap()["event"], "done");
    }
}
