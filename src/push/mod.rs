//! Observer push channel
//!
//! UI overlays connect over WebSocket and receive one JSON object per state
//! change, e.g. `{"estado":"escuchar"}`.
//!
//! Each observer owns a bounded queue drained by its own writer task, so a
//! broadcast never waits on a socket. An observer whose queue is full (it
//! stopped reading) or closed (its connection ended) is evicted during the
//! broadcast; the others are unaffected.

pub mod server;

use crate::state::{ConversationState, StateEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Identifier of one connected observer
pub type ObserverId = u64;

/// Live set of observers and their outbound queues
#[derive(Debug, Clone)]
pub struct ObserverRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    next_id: AtomicU64,
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<Arc<str>>>>,
    queue_depth: usize,
}

impl ObserverRegistry {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                observers: Mutex::new(HashMap::new()),
                queue_depth: queue_depth.max(1),
            }),
        }
    }

    fn observers(&self) -> std::sync::MutexGuard<'_, HashMap<ObserverId, mpsc::Sender<Arc<str>>>> {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an observer. The receiver yields every message broadcast after
    /// this call, in broadcast order.
    pub fn register(&self) -> (ObserverId, mpsc::Receiver<Arc<str>>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.queue_depth);
        self.observers().insert(id, tx);
        tracing::debug!("Observer {} registered", id);
        (id, rx)
    }

    /// Remove an observer; returns false if it was already gone
    pub fn deregister(&self, id: ObserverId) -> bool {
        let removed = self.observers().remove(&id).is_some();
        if removed {
            tracing::debug!("Observer {} deregistered", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.observers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every observer queue, which ends all writer tasks
    pub fn clear(&self) {
        self.observers().clear();
    }

    /// Queue `event` for every observer, evicting the ones that cannot
    /// take it. Never blocks. Returns the number of observers reached.
    pub fn broadcast(&self, event: &StateEvent) -> usize {
        let payload: Arc<str> = Arc::from(event.to_json());

        let snapshot: Vec<(ObserverId, mpsc::Sender<Arc<str>>)> = self
            .observers()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut evicted = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Observer {} is not keeping up, dropping it", id);
                    evicted.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("Observer {} went away", id);
                    evicted.push(id);
                }
            }
        }

        if !evicted.is_empty() {
            let mut observers = self.observers();
            for id in evicted {
                observers.remove(&id);
            }
        }

        tracing::trace!("Broadcast {} to {} observer(s)", event.wire_name(), delivered);
        delivered
    }
}

/// Receives every state the conversation enters
pub trait StateNotifier: Send + Sync {
    fn notify(&self, state: ConversationState);
}

/// Sends state changes to WebSocket observers
#[derive(Debug, Clone)]
pub struct PushNotifier {
    registry: ObserverRegistry,
    include_idle: bool,
}

impl PushNotifier {
    pub fn new(registry: ObserverRegistry, include_idle: bool) -> Self {
        Self {
            registry,
            include_idle,
        }
    }
}

impl StateNotifier for PushNotifier {
    fn notify(&self, state: ConversationState) {
        if state.is_idle() && !self.include_idle {
            return;
        }
        self.registry.broadcast(&StateEvent::new(state));
    }
}
