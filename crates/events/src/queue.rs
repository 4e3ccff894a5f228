//! The long-poll event queue.

use std::collections::VecDeque;

use {
    serde_json::Value,
    tokio::{
        sync::{Mutex, Notify},
        time::{Duration, Instant, timeout_at},
    },
    tracing::{debug, warn},
};

use gridway_protocol::{
    PollRequest, PollResponse, QueuedEvent,
    constants::{BATCH_WAIT_INTERVAL, CONNECTION_TIMEOUT, MAX_EVENTS_PER_RESPONSE},
};

use crate::llevents;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Enqueueing on a stopped queue is a producer-side protocol error.
    #[error("cannot add event while the queue is stopped")]
    Stopped,
}

struct QueueState {
    items: VecDeque<QueuedEvent>,
    running: bool,
    /// Id of the next response, starting at 1.
    next_response_id: i64,
}

enum Dequeued {
    Event(QueuedEvent),
    TimedOut,
    Stopped,
}

/// One session's event queue.
///
/// `poll` is the suspension point of the long-poll protocol: it parks the
/// caller on the tokio timer rather than a dedicated thread, so thousands of
/// concurrent handlers stay cheap.
pub struct EventQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    /// Short random id carried in logs to tell queues apart.
    debug_id: u32,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                running: true,
                next_response_id: 1,
            }),
            notify: Notify::new(),
            debug_id: rand::random_range(0..1000),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// Stop the queue permanently. Waiters observe the stop at their next
    /// wait cycle; there is deliberately no push-based cancellation.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.running = false;
        state.items.clear();
    }

    /// Number of events waiting to be delivered.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn enqueue(&self, name: impl Into<String>, body: Value) -> Result<(), QueueError> {
        self.enqueue_event(QueuedEvent::new(name, body)).await
    }

    pub async fn enqueue_event(&self, event: QueuedEvent) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if !state.running {
            return Err(QueueError::Stopped);
        }
        debug!(queue = self.debug_id, event = %event.message, "posting event");
        state.items.push_back(event);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// Run one long-poll round.
    ///
    /// Returns `None` when there is no response to send — the viewer closed
    /// the channel (`done`) or the queue was stopped — in which case the
    /// transport should tear the connection down with a non-200 status.
    pub async fn poll(&self, request: PollRequest) -> Option<PollResponse> {
        {
            let state = self.state.lock().await;
            let last_sent = state.next_response_id - 1;
            if request.ack != last_sent && request.ack != 0 {
                warn!(
                    queue = self.debug_id,
                    ack = request.ack,
                    last_sent,
                    "viewer acked an unexpected response id"
                );
            }
        }

        if request.done {
            debug!(queue = self.debug_id, "shutting down the event queue at the viewer's request");
            self.stop().await;
            return None;
        }

        let deadline = Instant::now() + CONNECTION_TIMEOUT;
        let first = loop {
            match self.dequeue_for(BATCH_WAIT_INTERVAL).await {
                Dequeued::Event(ev) => break Some(ev),
                Dequeued::Stopped => return None,
                Dequeued::TimedOut => {
                    if Instant::now() >= deadline {
                        debug!(queue = self.debug_id, "idle timeout, sending keep-alive");
                        break None;
                    }
                },
            }
        };

        let events = match first {
            // Nothing for the whole connection window: force a round trip so
            // middleboxes don't silently drop the idle request.
            None => vec![llevents::keep_alive()],
            Some(first) => {
                let mut batch = vec![first];
                let batch_deadline = Instant::now() + BATCH_WAIT_INTERVAL;
                while batch.len() < MAX_EVENTS_PER_RESPONSE {
                    let now = Instant::now();
                    if now >= batch_deadline {
                        break;
                    }
                    match self.dequeue_for(batch_deadline - now).await {
                        Dequeued::Event(ev) => batch.push(ev),
                        Dequeued::TimedOut | Dequeued::Stopped => break,
                    }
                }
                batch
            },
        };

        let id = {
            let mut state = self.state.lock().await;
            let id = state.next_response_id;
            state.next_response_id += 1;
            id
        };

        Some(PollResponse { events, id })
    }

    async fn dequeue_for(&self, wait: Duration) -> Dequeued {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if !state.running {
                    return Dequeued::Stopped;
                }
                if let Some(ev) = state.items.pop_front() {
                    return Dequeued::Event(ev);
                }
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Dequeued::TimedOut;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(name: &str) -> QueuedEvent {
        QueuedEvent::new(name, serde_json::json!({}))
    }

    fn poll_req(ack: i64) -> PollRequest {
        PollRequest { ack, done: false }
    }

    #[tokio::test]
    async fn batches_at_most_five_in_order() {
        let q = EventQueue::new();
        for i in 0..7 {
            q.enqueue_event(ev(&format!("e{i}"))).await.unwrap();
        }

        let first = q.poll(poll_req(0)).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.events.len(), 5);
        let names: Vec<_> = first.events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(names, ["e0", "e1", "e2", "e3", "e4"]);

        let second = q.poll(poll_req(1)).await.unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(second.events.len(), 2);
        assert_eq!(second.events[0].message, "e5");
        assert_eq!(second.events[1].message, "e6");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_poll_returns_single_keep_alive() {
        let q = EventQueue::new();
        let resp = q.poll(poll_req(0)).await.unwrap();
        assert_eq!(resp.events.len(), 1);
        assert_eq!(resp.events[0].message, "FAKEEVENT");
        assert!(q.is_running().await);

        // A later event still flows.
        q.enqueue_event(ev("after")).await.unwrap();
        let resp = q.poll(poll_req(resp.id)).await.unwrap();
        assert_eq!(resp.events[0].message, "after");
        assert_eq!(resp.id, 2);
    }

    #[tokio::test]
    async fn done_stops_the_queue_for_good() {
        let q = EventQueue::new();
        assert!(q.poll(PollRequest { ack: 0, done: true }).await.is_none());
        assert!(!q.is_running().await);
        assert!(matches!(
            q.enqueue_event(ev("too late")).await,
            Err(QueueError::Stopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_observed_at_the_next_wait_cycle() {
        let q = std::sync::Arc::new(EventQueue::new());
        let poller = {
            let q = q.clone();
            tokio::spawn(async move { q.poll(poll_req(0)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        q.stop().await;
        assert!(poller.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn event_arriving_mid_wait_is_delivered() {
        let q = std::sync::Arc::new(EventQueue::new());
        let poller = {
            let q = q.clone();
            tokio::spawn(async move { q.poll(poll_req(0)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.enqueue_event(ev("late")).await.unwrap();
        let resp = poller.await.unwrap().unwrap();
        assert_eq!(resp.events.len(), 1);
        assert_eq!(resp.events[0].message, "late");
    }
}
