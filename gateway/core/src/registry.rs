//! Builds the protocol-layer device/connection registries from a loaded
//! [`GatewayConfig`] (§3 "Device configuration (consumed, not owned)").

use gateway_protocol::{ConnectionTable, DeviceConfigRegistry};
use std::sync::Arc;

/// Bundles the two lookup tables the parser/builder pipeline consults:
/// per-`(linkId, remoteCode)` device element definitions, and the
/// last-seen-on reverse index used to route downlink commands.
pub struct ProtocolRegistry {
    pub devices: Arc<DeviceConfigRegistry>,
    pub connections: Arc<ConnectionTable>,
}

impl ProtocolRegistry {
    pub fn new() -> ProtocolRegistry {
        ProtocolRegistry {
            devices: Arc::new(DeviceConfigRegistry::new()),
            connections: Arc::new(ConnectionTable::new()),
        }
    }
}

impl Default for ProtocolRegistry {
    fn default() -> ProtocolRegistry {
        ProtocolRegistry::new()
    }
}
