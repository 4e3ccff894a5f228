//! Queue lookup for inbound long-poll capability calls.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::debug;

use crate::queue::EventQueue;

/// Maps a session's random queue id to its queue, so the locally addressed
/// capability path can route an inbound poll to the right place.
///
/// Lookups for unknown ids fall back to the most recently registered queue:
/// a single-avatar gateway has exactly one live session in the steady state,
/// and during a handoff the newest queue is the one the viewer means.
#[derive(Default)]
pub struct QueueBroker {
    queues: RwLock<HashMap<String, Arc<EventQueue>>>,
    latest: RwLock<Option<Arc<EventQueue>>>,
}

impl QueueBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, queue_id: impl Into<String>, queue: Arc<EventQueue>) {
        let queue_id = queue_id.into();
        debug!(queue_id = %queue_id, "registering event queue");
        self.queues
            .write()
            .unwrap()
            .insert(queue_id, Arc::clone(&queue));
        *self.latest.write().unwrap() = Some(queue);
    }

    /// Look a queue up by id, falling back to the most recent queue.
    pub fn get(&self, queue_id: &str) -> Option<Arc<EventQueue>> {
        if let Some(q) = self.queues.read().unwrap().get(queue_id) {
            return Some(Arc::clone(q));
        }
        self.latest.read().unwrap().clone()
    }

    pub fn remove(&self, queue_id: &str) -> Option<Arc<EventQueue>> {
        debug!(queue_id = %queue_id, "removing event queue");
        self.queues.write().unwrap().remove(queue_id)
    }

    pub fn len(&self) -> usize {
        self.queues.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.read().unwrap().is_empty()
    }
}
