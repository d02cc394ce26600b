//! End-to-end scenarios exercising the full `gateway-core` wiring rather
//! than a single module in isolation.

use async_trait::async_trait;
use gateway_events::{DomainEvent, EventBus, EventHandler, TransactionDriver, TransactionGuard};
use gateway_link::TcpLinkManager;
use slog::Logger;
use std::io::Read;
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn test_logger() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

struct CountingHandler {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl EventHandler for CountingHandler {
    async fn handle(&self, _event: &DomainEvent) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scenario 5: a `DeviceUpdated{registrationChanged: true}` event on a
/// server-mode link forces every connected peer off, while the link
/// itself stays up.
#[tokio::test]
async fn registration_change_disconnects_every_connected_peer() {
    let manager = TcpLinkManager::shared(test_logger());
    manager.initialize(1).unwrap();
    manager.start_server(701, "registration-drop", "127.0.0.1", 18651).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let clients: Vec<TcpStream> = (0..3)
        .map(|_| TcpStream::connect("127.0.0.1:18651").expect("peer should connect"))
        .collect();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let bus = EventBus::new(test_logger());
    gateway_core::handlers::register_all(&bus, manager.clone(), test_logger()).await;

    bus.publish(DomainEvent::DeviceUpdated {
        device_id: 9001,
        link_id: 701,
        registration_changed: true,
    })
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    for mut client in clients {
        client.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        let mut buf = [0u8; 8];
        let n = client.read(&mut buf).expect("socket should report shutdown, not time out");
        assert_eq!(n, 0, "peer should see EOF after registration-change drop");
    }

    assert!(manager.is_running(701), "link itself must stay Listening, not stop");
}

struct FailingDriver;

#[async_trait]
impl TransactionDriver for FailingDriver {
    async fn exec(&mut self, _sql: &str, _params: &[String]) -> flux::GatewayResult<u64> {
        Ok(0)
    }

    async fn commit_ack(self: Box<Self>) -> bool {
        false
    }

    fn rollback(&mut self) {}
}

/// Scenario 6: a failed commit ack must surface `CommitFailed` and must
/// not let any `on_commit` callback publish its staged event.
#[tokio::test]
async fn failed_commit_suppresses_event_publication() {
    let bus = EventBus::new(test_logger());
    let seen = Arc::new(AtomicUsize::new(0));
    bus.subscribe("LinkCreated", Arc::new(CountingHandler { count: seen.clone() })).await;

    let mut guard = TransactionGuard::create(Box::new(FailingDriver), test_logger());

    let bus_for_commit = Arc::new(bus);
    let bus_in_callback = bus_for_commit.clone();
    guard.on_commit(move || async move {
        bus_in_callback
            .publish(DomainEvent::LinkCreated {
                link_id: 1,
                name: "staged".to_string(),
                mode: "TCP Server".to_string(),
                ip: "127.0.0.1".to_string(),
                port: 7,
            })
            .await;
    });

    let err = guard.commit().await.unwrap_err();
    assert!(matches!(err.kind, flux::ErrorKind::CommitFailed));
    assert_eq!(seen.load(Ordering::SeqCst), 0, "no event may be observed after a failed commit");
}
