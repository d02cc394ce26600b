//! Device/link/protocol configuration as consumed by the parser and
//! builder (§3). The registry is a read-mostly lookup table populated by
//! `gateway::core` from the configured device roster; the core never owns
//! mutation of element definitions at parse time.

use crate::frame::Direction;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encode {
    Bcd,
    TimeYyMmDdHhMmSs,
    Jpeg,
    Dict,
    Hex,
}

impl Encode {
    pub fn tag(self) -> &'static str {
        match self {
            Encode::TimeYyMmDdHhMmSs => "TIME",
            Encode::Jpeg => "JPEG",
            Encode::Dict => "DICT",
            Encode::Hex => "HEX",
            Encode::Bcd => "BCD",
        }
    }
}

/// One decodable/encodable field within a frame body.
#[derive(Debug, Clone)]
pub struct ElementDef {
    pub id: String,
    pub name: String,
    pub func_code: String,
    /// Hex-rendered guide byte prefix, e.g. `"81"`.
    pub guide_hex: String,
    pub encode: Encode,
    /// Byte length; `0` means variable-length, consumes the remainder of
    /// the body and must be the last element in its list.
    pub length: usize,
    /// Decimal digits for BCD scaling, clamped to `[0, 8]`.
    pub digits: i32,
    pub unit: String,
    pub remark: String,
}

/// Per-device configuration as registered on a given link.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub device_id: i64,
    pub device_name: String,
    pub device_code: String,
    pub protocol_config_id: i64,
    pub link_id: i64,
    pub timezone: String,
    pub elements_by_func: HashMap<String, Vec<ElementDef>>,
    pub response_elements_by_func: HashMap<String, Vec<ElementDef>>,
    pub func_names: HashMap<String, String>,
    pub func_directions: HashMap<String, Direction>,
}

impl DeviceConfig {
    pub fn new(device_id: i64, device_name: impl Into<String>, device_code: impl Into<String>, link_id: i64) -> DeviceConfig {
        DeviceConfig {
            device_id,
            device_name: device_name.into(),
            device_code: device_code.into(),
            protocol_config_id: 0,
            link_id,
            timezone: "+08:00".to_string(),
            elements_by_func: HashMap::new(),
            response_elements_by_func: HashMap::new(),
            func_names: HashMap::new(),
            func_directions: HashMap::new(),
        }
    }

    /// Element list for `func_code`, preferring the response-element list
    /// when `prefer_response` is set (uplink ack-to-downlink case, §4.3).
    pub fn elements_for(&self, func_code: &str, prefer_response: bool) -> Option<&[ElementDef]> {
        if prefer_response {
            if let Some(elements) = self.response_elements_by_func.get(func_code) {
                return Some(elements);
            }
        }
        self.elements_by_func.get(func_code).map(Vec::as_slice)
    }
}

/// Lookup table keyed by `(linkId, remoteCode)`, populated by `gateway::core`.
#[derive(Default)]
pub struct DeviceConfigRegistry {
    by_link_and_code: RwLock<HashMap<(i64, String), DeviceConfig>>,
}

impl DeviceConfigRegistry {
    pub fn new() -> DeviceConfigRegistry {
        DeviceConfigRegistry::default()
    }

    pub fn insert(&self, config: DeviceConfig) {
        let key = (config.link_id, config.device_code.clone());
        self.by_link_and_code.write().unwrap().insert(key, config);
    }

    pub fn remove(&self, link_id: i64, remote_code: &str) {
        self.by_link_and_code
            .write()
            .unwrap()
            .remove(&(link_id, remote_code.to_string()));
    }

    pub fn lookup(&self, link_id: i64, remote_code: &str) -> Option<DeviceConfig> {
        self.by_link_and_code
            .read()
            .unwrap()
            .get(&(link_id, remote_code.to_string()))
            .cloned()
    }
}

/// Maps a remote device address to the link/peer it last spoke on, so
/// downlink commands can route back (§4.3 "uplink registration").
#[derive(Default)]
pub struct ConnectionTable {
    table: Mutex<HashMap<String, (i64, String)>>,
}

impl ConnectionTable {
    pub fn new() -> ConnectionTable {
        ConnectionTable::default()
    }

    pub fn register(&self, remote_code: &str, link_id: i64, peer_addr: &str) {
        self.table
            .lock()
            .unwrap()
            .insert(remote_code.to_string(), (link_id, peer_addr.to_string()));
    }

    pub fn lookup(&self, remote_code: &str) -> Option<(i64, String)> {
        self.table.lock().unwrap().get(remote_code).cloned()
    }
}
