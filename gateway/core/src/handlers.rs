//! Subscribes link lifecycle logic to the domain event bus so the link
//! manager reacts to configuration changes rather than being driven
//! directly by persistence code (§4.7's "Handlers observing events may
//! perform their own side effects").

use async_trait::async_trait;
use gateway_events::{DomainEvent, EventBus, EventHandler};
use gateway_link::{LinkMode, TcpLinkManager};
use slog::Logger;
use std::sync::Arc;

fn link_mode(mode: &str) -> Option<LinkMode> {
    match mode {
        "TCP Server" => Some(LinkMode::TcpServer),
        "TCP Client" => Some(LinkMode::TcpClient),
        _ => None,
    }
}

struct LinkCreatedHandler {
    manager: Arc<TcpLinkManager>,
    logger: Logger,
}

#[async_trait]
impl EventHandler for LinkCreatedHandler {
    async fn handle(&self, event: &DomainEvent) {
        if let DomainEvent::LinkCreated { link_id, name, mode, ip, port } = event {
            let result = match link_mode(mode) {
                Some(LinkMode::TcpServer) => self.manager.start_server(*link_id, name, ip, *port),
                Some(LinkMode::TcpClient) => self.manager.start_client(*link_id, name, ip, *port),
                None => {
                    slog::warn!(self.logger, "unsupported link mode"; "link_id" => link_id, "mode" => mode);
                    return;
                }
            };
            match result {
                Ok(()) => slog::info!(self.logger, "started tcp link"; "link_id" => link_id, "mode" => mode),
                Err(err) => slog::error!(self.logger, "failed to start link"; "link_id" => link_id, "error" => %err),
            }
        }
    }
}

struct LinkUpdatedHandler {
    manager: Arc<TcpLinkManager>,
    logger: Logger,
}

#[async_trait]
impl EventHandler for LinkUpdatedHandler {
    async fn handle(&self, event: &DomainEvent) {
        if let DomainEvent::LinkUpdated { link_id, name, mode, ip, port, enabled, need_reload } = event {
            if !need_reload {
                return;
            }
            let Some(mode_enum) = link_mode(mode) else {
                slog::warn!(self.logger, "unsupported link mode"; "link_id" => link_id, "mode" => mode);
                return;
            };
            match self.manager.reload(*link_id, name, mode_enum, ip, *port, *enabled) {
                Ok(()) => slog::info!(self.logger, "reloaded tcp link"; "link_id" => link_id),
                Err(err) => slog::error!(self.logger, "failed to reload link"; "link_id" => link_id, "error" => %err),
            }
        }
    }
}

struct LinkDeletedHandler {
    manager: Arc<TcpLinkManager>,
    logger: Logger,
}

#[async_trait]
impl EventHandler for LinkDeletedHandler {
    async fn handle(&self, event: &DomainEvent) {
        if let DomainEvent::LinkDeleted { link_id } = event {
            self.manager.stop(*link_id);
            slog::info!(self.logger, "stopped tcp link"; "link_id" => link_id);
        }
    }
}

struct DeviceUpdatedHandler {
    manager: Arc<TcpLinkManager>,
    logger: Logger,
}

#[async_trait]
impl EventHandler for DeviceUpdatedHandler {
    async fn handle(&self, event: &DomainEvent) {
        if let DomainEvent::DeviceUpdated { device_id, link_id, registration_changed } = event {
            if !registration_changed || *link_id <= 0 {
                return;
            }
            self.manager.disconnect_server_clients(*link_id);
            slog::info!(
                self.logger,
                "disconnected clients for re-registration";
                "link_id" => link_id, "device_id" => device_id
            );
        }
    }
}

/// Registers every link-facing handler against `bus`. Call once at
/// startup, after the link manager is constructed and before the first
/// event can be published.
pub async fn register_all(bus: &EventBus, manager: Arc<TcpLinkManager>, logger: Logger) {
    bus.subscribe("LinkCreated", Arc::new(LinkCreatedHandler { manager: manager.clone(), logger: logger.clone() }))
        .await;
    bus.subscribe("LinkUpdated", Arc::new(LinkUpdatedHandler { manager: manager.clone(), logger: logger.clone() }))
        .await;
    bus.subscribe("LinkDeleted", Arc::new(LinkDeletedHandler { manager: manager.clone(), logger: logger.clone() }))
        .await;
    bus.subscribe("DeviceUpdated", Arc::new(DeviceUpdatedHandler { manager, logger: logger.clone() }))
        .await;

    slog::info!(logger, "link event handlers registered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_link::TcpLinkManager;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn device_updated_without_registration_change_is_ignored() {
        let manager = TcpLinkManager::shared(test_logger());
        let bus = EventBus::new(test_logger());
        register_all(&bus, manager.clone(), test_logger()).await;

        bus.publish(DomainEvent::DeviceUpdated { device_id: 1, link_id: 9, registration_changed: false })
            .await;

        assert!(!manager.is_running(9));
    }

    #[tokio::test]
    async fn link_deleted_stops_link() {
        let manager = TcpLinkManager::shared(test_logger());
        manager.initialize(1).unwrap();
        manager.start_server(5, "test", "127.0.0.1", 0).unwrap();
        let bus = EventBus::new(test_logger());
        register_all(&bus, manager.clone(), test_logger()).await;

        bus.publish(DomainEvent::LinkDeleted { link_id: 5 }).await;

        assert!(!manager.is_running(5));
    }
}
