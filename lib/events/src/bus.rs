//! In-process publish/subscribe dispatched by tagged event kind (§4.7).
//!
//! The reference's `Bus` type-erases arbitrary event structs behind `Any`
//! and downcasts per subscriber — convenient for an open-ended event
//! catalog, but unsafe machinery this gateway doesn't need: the domain
//! catalog here is a small, closed enum, so dispatch is a straightforward
//! per-variant subscriber list instead.

use async_trait::async_trait;
use slog::Logger;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub enum DomainEvent {
    LinkCreated {
        link_id: i64,
        name: String,
        mode: String,
        ip: String,
        port: u16,
    },
    LinkUpdated {
        link_id: i64,
        name: String,
        mode: String,
        ip: String,
        port: u16,
        enabled: bool,
        need_reload: bool,
    },
    LinkDeleted {
        link_id: i64,
    },
    DeviceUpdated {
        device_id: i64,
        link_id: i64,
        registration_changed: bool,
    },
}

impl DomainEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            DomainEvent::LinkCreated { .. } => "LinkCreated",
            DomainEvent::LinkUpdated { .. } => "LinkUpdated",
            DomainEvent::LinkDeleted { .. } => "LinkDeleted",
            DomainEvent::DeviceUpdated { .. } => "DeviceUpdated",
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Single-process publish/subscribe; subscribers register by event tag and
/// are invoked in registration order. No ordering guarantee across tags.
pub struct EventBus {
    handlers: RwLock<Vec<(&'static str, Arc<dyn EventHandler>)>>,
    logger: Logger,
}

impl EventBus {
    pub fn new(logger: Logger) -> EventBus {
        EventBus {
            handlers: RwLock::new(Vec::new()),
            logger,
        }
    }

    /// Registers `handler` against every `DomainEvent` carrying `tag`
    /// (e.g. `"LinkCreated"`). A closed enum means tag matching is just a
    /// string compare done once per publish, not a type map.
    pub async fn subscribe(&self, tag: &'static str, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push((tag, handler));
    }

    /// Dispatches to every subscriber of `event`'s tag, in registration
    /// order. Handler panics are not caught; handler-internal errors
    /// should be logged by the handler itself, matching the reference's
    /// per-handler try/catch around otherwise-fire-and-forget dispatch.
    pub async fn publish(&self, event: DomainEvent) {
        let tag = event.tag();
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .await
            .iter()
            .filter(|(t, _)| *t == tag)
            .map(|(_, h)| h.clone())
            .collect();

        slog::debug!(self.logger, "publishing event"; "tag" => tag, "subscribers" => handlers.len());
        for handler in handlers {
            handler.handle(&event).await;
        }
    }

    /// Publishes every event in `events`, in order. Used by the
    /// persist-pipeline discipline: queue events while the transaction is
    /// open, publish them only after `guard.commit()` succeeds.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        count: Arc<AtomicUsize>,
        order: Arc<std::sync::Mutex<Vec<usize>>>,
        id: usize,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &DomainEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(self.id);
        }
    }

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn dispatches_only_to_matching_tag_in_order() {
        let bus = EventBus::new(test_logger());
        let count = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        bus.subscribe(
            "LinkCreated",
            Arc::new(CountingHandler { count: count.clone(), order: order.clone(), id: 1 }),
        )
        .await;
        bus.subscribe(
            "LinkCreated",
            Arc::new(CountingHandler { count: count.clone(), order: order.clone(), id: 2 }),
        )
        .await;
        bus.subscribe(
            "LinkDeleted",
            Arc::new(CountingHandler { count: count.clone(), order: order.clone(), id: 3 }),
        )
        .await;

        bus.publish(DomainEvent::LinkCreated {
            link_id: 1,
            name: "a".to_string(),
            mode: "TCP Server".to_string(),
            ip: "0.0.0.0".to_string(),
            port: 9000,
        })
        .await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn publish_all_preserves_event_order() {
        let bus = EventBus::new(test_logger());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "LinkDeleted",
            Arc::new(CountingHandler { count: count.clone(), order: order.clone(), id: 9 }),
        )
        .await;

        bus.publish_all(vec![
            DomainEvent::LinkDeleted { link_id: 1 },
            DomainEvent::LinkDeleted { link_id: 2 },
        ])
        .await;

        assert_eq!(*order.lock().unwrap(), vec![9, 9]);
    }
}
