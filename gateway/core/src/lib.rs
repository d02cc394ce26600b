//! Wires the protocol layer (`gateway-protocol`), the TCP link manager
//! (`gateway-link`), and the domain event bus (`gateway-events`) into the
//! running gateway (§2 "Control flow").

pub mod config;
pub mod handlers;
pub mod registry;

pub use config::GatewayConfig;
pub use registry::ProtocolRegistry;

use config::LinkMode as ConfigLinkMode;
use flux::GatewayResult;
use gateway_events::{DomainEvent, EventBus};
use gateway_link::{LinkMode, TcpLinkManager};
use gateway_protocol::{
    build_ack_frame, build_link_keep_ack, decode_header, FrameControl, FuncCodes, ParseContext, ParseOutcome, ParsedFrameResult, Sl651Parser,
};
use parking_lot::Mutex;
use slog::Logger;
use std::collections::HashMap;
use std::sync::Arc;

/// Invoked with every finished record; the caller owns persistence, which
/// is explicitly an external collaborator of this core (§1).
pub type RecordSink = Arc<dyn Fn(ParsedFrameResult) + Send + Sync>;

pub struct Gateway {
    config: GatewayConfig,
    logger: Logger,
    pub registry: ProtocolRegistry,
    pub link_manager: Arc<TcpLinkManager>,
    pub parser: Arc<Sl651Parser>,
    pub event_bus: Arc<EventBus>,
    framers: Mutex<HashMap<i64, gateway_protocol::Framer>>,
    record_sink: Mutex<Option<RecordSink>>,
}

fn to_link_mode(mode: ConfigLinkMode) -> LinkMode {
    match mode {
        ConfigLinkMode::Server => LinkMode::TcpServer,
        ConfigLinkMode::Client => LinkMode::TcpClient,
    }
}

impl Gateway {
    pub fn new(config: GatewayConfig, logger: Logger) -> Arc<Gateway> {
        let link_manager = TcpLinkManager::shared(logger.new(slog::o!("component" => "link_manager")));
        Arc::new_cyclic(|weak: &std::sync::Weak<Gateway>| {
            let gateway = Gateway {
                config,
                logger: logger.clone(),
                registry: ProtocolRegistry::new(),
                link_manager: link_manager.clone(),
                parser: Arc::new(Sl651Parser::new()),
                event_bus: Arc::new(EventBus::new(logger.new(slog::o!("component" => "event_bus")))),
                framers: Mutex::new(HashMap::new()),
                record_sink: Mutex::new(None),
            };

            let weak_self = weak.clone();
            link_manager.set_data_callback(Arc::new(move |link_id, peer, data| {
                if let Some(gw) = weak_self.upgrade() {
                    gw.on_data(link_id, &peer, &data);
                }
            }));

            gateway
        })
    }

    pub fn set_record_sink(&self, sink: RecordSink) {
        *self.record_sink.lock() = Some(sink);
    }

    /// Initializes the link manager's worker pool, registers the link
    /// event handlers, and starts every enabled configured link.
    pub async fn start(self: &Arc<Gateway>) -> GatewayResult<()> {
        self.link_manager.initialize(self.config.io_threads)?;
        self.link_manager.configure_reconnect(
            self.config.reconnect.base_delay_sec,
            self.config.reconnect.max_delay_sec,
            self.config.reconnect.jitter_ratio,
        );

        handlers::register_all(&self.event_bus, self.link_manager.clone(), self.logger.clone()).await;

        for link in &self.config.links {
            if !link.enabled {
                continue;
            }
            self.event_bus
                .publish(DomainEvent::LinkCreated {
                    link_id: link.link_id,
                    name: link.name.clone(),
                    mode: to_link_mode(link.mode).as_str().to_string(),
                    ip: link.ip.clone(),
                    port: link.port,
                })
                .await;
        }

        Ok(())
    }

    pub fn stop_all(&self) {
        self.link_manager.stop_all();
    }

    fn on_data(&self, link_id: i64, peer: &str, data: &[u8]) {
        let drain = {
            let mut framers = self.framers.lock();
            framers.entry(link_id).or_default().push(data)
        };

        if drain.overflowed {
            slog::warn!(self.logger, "framer buffer overflow, buffer cleared"; "link_id" => link_id);
        }

        for raw in drain.frames {
            self.handle_frame(link_id, peer, raw);
        }
    }

    fn handle_frame(&self, link_id: i64, peer: &str, raw: Vec<u8>) {
        let ctx = ParseContext {
            link_id,
            peer_addr: Some(peer),
            now_ms: now_ms(),
        };

        let outcome = self.parser.parse(&raw, &ctx, &self.registry.devices, &self.registry.connections);
        match &outcome {
            ParseOutcome::Frame(result) => {
                if result.unparsed_len > 0 {
                    slog::debug!(
                        self.logger,
                        "frame had trailing unparsed bytes";
                        "link_id" => link_id, "func_code" => &result.func_code, "unparsed_len" => result.unparsed_len
                    );
                }
                if let Some(sink) = self.record_sink.lock().clone() {
                    sink(result.clone());
                }
            }
            ParseOutcome::Buffered => {}
            ParseOutcome::SessionDropped => {
                slog::warn!(self.logger, "multi-packet session dropped, table at capacity"; "link_id" => link_id);
            }
            ParseOutcome::NoDeviceConfig => {
                slog::warn!(self.logger, "no device configuration for frame"; "link_id" => link_id);
            }
            ParseOutcome::Malformed(reason) => {
                slog::warn!(self.logger, "malformed frame"; "link_id" => link_id, "reason" => reason);
            }
        }

        self.maybe_ack(link_id, peer, &raw);
    }

    fn maybe_ack(&self, link_id: i64, peer: &str, raw: &[u8]) {
        let Ok(frame) = decode_header(raw) else { return };
        if frame.etx != FrameControl::ETX_INQUIRY {
            return;
        }

        let ack = if frame.func_code == FuncCodes::LINK_KEEP {
            build_link_keep_ack(&frame)
        } else {
            build_ack_frame(&frame)
        };

        match ack {
            Ok(bytes) => {
                if !self.link_manager.send_to_client(link_id, peer, &bytes) {
                    self.link_manager.send_data(link_id, &bytes);
                }
            }
            Err(err) => slog::warn!(self.logger, "failed to build ack frame"; "link_id" => link_id, "error" => %err),
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
