use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{BusError, Delivery, MessageBus, Outcome, QueueConsumer};

// ============================================================================
// In-Memory Bus - test double for the fanout/ack contract
// ============================================================================
//
// Not a broker. Exists so the orchestrator, adapters, and relay can be
// exercised against real fanout, prefetch, and nack-requeue semantics
// without a running AMQP server. Rejected messages are captured per queue
// so tests can assert on the would-be dead-letter path.
//
// ============================================================================

#[derive(Debug, Clone)]
struct StoredMessage {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    rejected: Vec<Vec<u8>>,
}

struct Queue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Queue {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        })
    }

    fn push_back(&self, message: StoredMessage) {
        self.state.lock().unwrap().ready.push_back(message);
        self.notify.notify_waiters();
    }

    fn push_front(&self, message: StoredMessage) {
        self.state.lock().unwrap().ready.push_front(message);
        self.notify.notify_waiters();
    }
}

#[derive(Default)]
struct BusState {
    // exchange -> bound queue names
    bindings: HashMap<String, Vec<String>>,
    queues: HashMap<String, Arc<Queue>>,
}

#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Result<Arc<Queue>, BusError> {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::UnknownQueue(name.to_string()))
    }

    /// Messages currently ready for delivery on a queue.
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.queue(queue)
            .map(|q| q.state.lock().unwrap().ready.len())
            .unwrap_or(0)
    }

    /// Messages dropped without requeue on a queue (the dead-letter path).
    pub fn rejected_count(&self, queue: &str) -> usize {
        self.queue(queue)
            .map(|q| q.state.lock().unwrap().rejected.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn declare_fanout(&self, exchange: &str) -> Result<(), BusError> {
        self.state
            .lock()
            .unwrap()
            .bindings
            .entry(exchange.to_string())
            .or_default();
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BusError> {
        self.state
            .lock()
            .unwrap()
            .queues
            .entry(queue.to_string())
            .or_insert_with(Queue::new);
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        if !state.queues.contains_key(queue) {
            return Err(BusError::UnknownQueue(queue.to_string()));
        }
        let bound = state.bindings.entry(exchange.to_string()).or_default();
        if !bound.iter().any(|q| q == queue) {
            bound.push(queue.to_string());
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, payload: &[u8]) -> Result<(), BusError> {
        let targets: Vec<Arc<Queue>> = {
            let state = self.state.lock().unwrap();
            state
                .bindings
                .get(exchange)
                .map(|bound| {
                    bound
                        .iter()
                        .filter_map(|name| state.queues.get(name).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };

        // Fanout: every bound queue gets its own copy.
        for queue in targets {
            queue.push_back(StoredMessage {
                payload: payload.to_vec(),
                redelivered: false,
            });
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<Box<dyn QueueConsumer>, BusError> {
        let queue = self.queue(queue)?;
        Ok(Box::new(InMemoryConsumer {
            queue,
            prefetch: prefetch.max(1) as usize,
            unsettled: HashMap::new(),
            next_tag: 1,
        }))
    }
}

struct InMemoryConsumer {
    queue: Arc<Queue>,
    prefetch: usize,
    unsettled: HashMap<u64, StoredMessage>,
    next_tag: u64,
}

#[async_trait]
impl QueueConsumer for InMemoryConsumer {
    async fn next_delivery(&mut self) -> Result<Delivery, BusError> {
        if self.unsettled.len() >= self.prefetch {
            return Err(BusError::Operation(
                "prefetch window exhausted; settle the in-flight delivery first".to_string(),
            ));
        }

        loop {
            let notified = self.queue.notify.notified();
            if let Some(message) = self.queue.state.lock().unwrap().ready.pop_front() {
                let tag = self.next_tag;
                self.next_tag += 1;
                let delivery = Delivery {
                    payload: message.payload.clone(),
                    redelivered: message.redelivered,
                    tag,
                };
                self.unsettled.insert(tag, message);
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn settle(&mut self, tag: u64, outcome: Outcome) -> Result<(), BusError> {
        let mut message = self
            .unsettled
            .remove(&tag)
            .ok_or_else(|| BusError::Operation(format!("unknown delivery tag {tag}")))?;

        match outcome {
            Outcome::Ack => {}
            Outcome::Requeue => {
                message.redelivered = true;
                self.queue.push_front(message);
            }
            Outcome::Reject => {
                self.queue
                    .state
                    .lock()
                    .unwrap()
                    .rejected
                    .push(message.payload);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
