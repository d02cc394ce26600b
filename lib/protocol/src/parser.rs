//! SL651 parser: header decode, element decode, multi-packet reassembly
//! (§4.3).

use crate::config::{ConnectionTable, DeviceConfig, DeviceConfigRegistry, Encode};
use crate::frame::{Direction, FuncCodes, Sl651Frame, MAX_SESSION_COUNT, PROTOCOL_SL651, SESSION_TIMEOUT_MS};
use byteorder::{BigEndian, ByteOrder};
use gateway_codec::{b64_encode, bcd_read, bcd_time_decode, bcd_value_decode, hex_decode, hex_encode};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One decoded telemetry field.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParsedElement {
    pub name: String,
    pub guide_hex: String,
    pub raw_value: String,
    pub value: String,
    pub unit: String,
    pub element_id: String,
    pub encode: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedBody {
    pub data: Vec<ParsedElement>,
    pub unparsed: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CommandResponseDescriptor {
    pub success: bool,
    pub func_code: String,
}

/// Output handed to persistence (§3, §6).
#[derive(Debug, Clone)]
pub struct ParsedFrameResult {
    pub device_id: i64,
    pub link_id: i64,
    pub protocol: &'static str,
    pub func_code: String,
    pub report_time: String,
    pub data: serde_json::Value,
    pub command_response: Option<CommandResponseDescriptor>,
    /// Count of trailing body bytes that matched no configured element.
    /// Preserved for diagnostics only; callers typically just log it.
    pub unparsed_len: usize,
}

struct MultiPacketSession {
    total_pk: u32,
    received: HashSet<u32>,
    packets: HashMap<u32, Vec<u8>>,
    raw_frames: HashMap<u32, Vec<u8>>,
    start_ms: u64,
}

impl MultiPacketSession {
    fn new(total_pk: u32, start_ms: u64) -> MultiPacketSession {
        MultiPacketSession {
            total_pk,
            received: HashSet::new(),
            packets: HashMap::new(),
            raw_frames: HashMap::new(),
            start_ms,
        }
    }
}

#[derive(Debug, Default)]
pub struct ParserStatsSnapshot {
    pub frames_parsed: u64,
    pub crc_errors: u64,
    pub multi_packet_completed: u64,
    pub multi_packet_expired: u64,
    pub parse_errors: u64,
}

#[derive(Default)]
struct ParserStats {
    frames_parsed: AtomicU64,
    crc_errors: AtomicU64,
    multi_packet_completed: AtomicU64,
    multi_packet_expired: AtomicU64,
    parse_errors: AtomicU64,
}

/// Context a single `parse` call needs beyond the raw bytes: which link the
/// frame arrived on, the known peer address (server mode), and wall time
/// (threaded explicitly so session expiry is deterministically testable).
pub struct ParseContext<'a> {
    pub link_id: i64,
    pub peer_addr: Option<&'a str>,
    pub now_ms: u64,
}

#[derive(Debug)]
pub enum ParseOutcome {
    Frame(ParsedFrameResult),
    /// Multi-packet fragment stored; session not yet complete.
    Buffered,
    /// Session table full and this fragment's key is unseen.
    SessionDropped,
    /// No device configuration for `(linkId, remoteCode)`.
    NoDeviceConfig,
    /// Frame bytes did not decode as a well-formed SL651 header/trailer.
    Malformed(String),
}

#[derive(Default)]
pub struct Sl651Parser {
    sessions: Mutex<HashMap<String, MultiPacketSession>>,
    stats: ParserStats,
}

impl Sl651Parser {
    pub fn new() -> Sl651Parser {
        Sl651Parser::default()
    }

    pub fn stats(&self) -> ParserStatsSnapshot {
        ParserStatsSnapshot {
            frames_parsed: self.stats.frames_parsed.load(Ordering::Relaxed),
            crc_errors: self.stats.crc_errors.load(Ordering::Relaxed),
            multi_packet_completed: self.stats.multi_packet_completed.load(Ordering::Relaxed),
            multi_packet_expired: self.stats.multi_packet_expired.load(Ordering::Relaxed),
            parse_errors: self.stats.parse_errors.load(Ordering::Relaxed),
        }
    }

    pub fn parse(
        &self,
        raw: &[u8],
        ctx: &ParseContext<'_>,
        registry: &DeviceConfigRegistry,
        connections: &ConnectionTable,
    ) -> ParseOutcome {
        let frame = match decode_header(raw) {
            Ok(frame) => frame,
            Err(reason) => {
                self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                return ParseOutcome::Malformed(reason);
            }
        };

        self.stats.frames_parsed.fetch_add(1, Ordering::Relaxed);
        if !frame.crc_valid {
            self.stats.crc_errors.fetch_add(1, Ordering::Relaxed);
        }

        if frame.direction == Direction::Up {
            if let Some(peer_addr) = ctx.peer_addr {
                connections.register(&frame.remote_code, ctx.link_id, peer_addr);
            }
        }

        if frame.is_multi_packet {
            self.handle_fragment(frame, raw, ctx, registry)
        } else {
            let raw_vec = raw.to_vec();
            self.finish_frame(&frame, std::slice::from_ref(&raw_vec), ctx.link_id, registry)
        }
    }

    fn handle_fragment(
        &self,
        frame: Sl651Frame,
        raw: &[u8],
        ctx: &ParseContext<'_>,
        registry: &DeviceConfigRegistry,
    ) -> ParseOutcome {
        let key = format!("{}_{}", frame.remote_code, frame.func_code);
        let mut sessions = self.sessions.lock().unwrap();

        // Lazy sweep: runs opportunistically on every fragment arrival.
        let expired_keys: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| ctx.now_ms.saturating_sub(s.start_ms) > SESSION_TIMEOUT_MS)
            .map(|(k, _)| k.clone())
            .collect();
        for expired_key in expired_keys {
            sessions.remove(&expired_key);
            self.stats.multi_packet_expired.fetch_add(1, Ordering::Relaxed);
        }

        if !sessions.contains_key(&key) {
            if sessions.len() >= MAX_SESSION_COUNT {
                return ParseOutcome::SessionDropped;
            }
            sessions.insert(key.clone(), MultiPacketSession::new(frame.total_pk, ctx.now_ms));
        } else if sessions[&key].total_pk != frame.total_pk {
            sessions.insert(key.clone(), MultiPacketSession::new(frame.total_pk, ctx.now_ms));
        }

        let session = sessions.get_mut(&key).unwrap();
        session.packets.insert(frame.seq_pk, frame.body.clone());
        session.raw_frames.insert(frame.seq_pk, raw.to_vec());
        session.received.insert(frame.seq_pk);

        if session.received.len() as u32 == session.total_pk {
            let session = sessions.remove(&key).unwrap();
            drop(sessions);

            let mut merged_body = Vec::new();
            let mut raws = Vec::new();
            for seq in 1..=session.total_pk {
                if let Some(body) = session.packets.get(&seq) {
                    merged_body.extend_from_slice(body);
                }
                if let Some(raw_frame) = session.raw_frames.get(&seq) {
                    raws.push(raw_frame.clone());
                }
            }

            self.stats.multi_packet_completed.fetch_add(1, Ordering::Relaxed);

            let mut merged_frame = frame;
            merged_frame.body = merged_body;
            self.finish_frame(&merged_frame, &raws, ctx.link_id, registry)
        } else {
            ParseOutcome::Buffered
        }
    }

    fn finish_frame(
        &self,
        frame: &Sl651Frame,
        raw_frames: &[Vec<u8>],
        link_id: i64,
        registry: &DeviceConfigRegistry,
    ) -> ParseOutcome {
        let device = match registry.lookup(link_id, &frame.remote_code) {
            Some(device) => device,
            None => return ParseOutcome::NoDeviceConfig,
        };

        let is_ack_to_downlink =
            frame.direction == Direction::Up && device.func_directions.get(&frame.func_code) == Some(&Direction::Down);

        let body = parse_elements(&frame.body, &frame.func_code, &device, is_ack_to_downlink);

        let report_time = if frame.body.len() >= 8 {
            format!("{}{}", bcd_time_decode(&bcd_read(&frame.body, 2, 6)), device.timezone)
        } else {
            String::new()
        };

        let raw_hex: Vec<String> = raw_frames.iter().map(|r| hex_encode(r)).collect();

        let mut data_fields = serde_json::Map::new();
        for element in &body.data {
            let key = format!("{}_{}", frame.func_code, element.guide_hex);
            data_fields.insert(
                key,
                serde_json::json!({
                    "value": element.value,
                    "name": element.name,
                    "unit": element.unit,
                    "type": element.encode,
                }),
            );
        }

        let data = serde_json::json!({
            "funcCode": frame.func_code,
            "funcName": device.func_names.get(&frame.func_code).cloned().unwrap_or_default(),
            "direction": frame.direction.as_str(),
            "raw": raw_hex,
            "frame": {
                "centerCode": frame.center_code,
                "remoteCode": frame.remote_code,
                "password": frame.password,
                "crcValid": frame.crc_valid,
                "serialNumber": frame.serial_number,
            },
            "data": data_fields,
        });

        let command_response = if frame.direction == Direction::Up {
            Some(CommandResponseDescriptor {
                success: frame.func_code != FuncCodes::ACK_ERR,
                func_code: frame.func_code.clone(),
            })
        } else {
            None
        };

        ParseOutcome::Frame(ParsedFrameResult {
            device_id: device.device_id,
            link_id,
            protocol: PROTOCOL_SL651,
            func_code: frame.func_code.clone(),
            report_time,
            data,
            command_response,
            unparsed_len: body.unparsed.len(),
        })
    }
}

/// Decode the fixed header, body slice and trailer of a candidate frame
/// already isolated by the `Framer`. CRC failure is not an error here —
/// the frame still decodes, just with `crc_valid = false`.
pub fn decode_header(raw: &[u8]) -> Result<Sl651Frame, String> {
    if raw.len() < 13 {
        return Err("frame shorter than header".to_string());
    }

    let center_code = hex_encode(&raw[2..3]);
    let remote_code = bcd_read(raw, 3, 5);
    let password = bcd_read(raw, 8, 2);
    let func_code = hex_encode(&raw[10..11]);
    let len_field = BigEndian::read_u16(&raw[11..13]);
    let direction = Direction::from_nibble(((len_field >> 12) & 0xF) as u8);
    let body_len = (len_field & 0x0FFF) as usize;

    if raw.len() < 14 {
        return Err("frame missing STX".to_string());
    }
    let stx = raw[13];
    let is_multi = stx == crate::frame::FrameControl::STX_MULTI;

    let (body_start, effective_body_len, total_pk, seq_pk) = if is_multi {
        if raw.len() < 17 || body_len < 3 {
            return Err("multi-packet frame missing sequence header".to_string());
        }
        let packed = ((raw[14] as u32) << 16) | ((raw[15] as u32) << 8) | (raw[16] as u32);
        let total_pk = (packed >> 12) & 0xFFF;
        let seq_pk = packed & 0xFFF;
        (17usize, body_len - 3, total_pk, seq_pk)
    } else {
        (14usize, body_len, 1u32, 1u32)
    };

    let body_end = body_start + effective_body_len;
    if raw.len() < body_end + 3 {
        return Err("frame shorter than declared body length".to_string());
    }

    let body = raw[body_start..body_end].to_vec();
    let etx = raw[body_end];
    let crc_recv = BigEndian::read_u16(&raw[raw.len() - 2..]);
    let crc_calc = gateway_codec::crc16_modbus(&raw[..raw.len() - 2]);
    let crc_valid = crc_recv == crc_calc;

    let serial_number = if direction == Direction::Up && body.len() >= 2 {
        Some(hex_encode(&body[0..2]))
    } else {
        None
    };

    Ok(Sl651Frame {
        direction,
        center_code,
        remote_code,
        password,
        func_code,
        stx,
        etx,
        body,
        crc_recv,
        crc_calc,
        crc_valid,
        raw: raw.to_vec(),
        is_multi_packet: is_multi,
        total_pk,
        seq_pk,
        is_last_packet: seq_pk == total_pk,
        serial_number,
    })
}

/// Walk the device's configured elements for `func_code` against `body`,
/// locating each element's `guideHex` in order from the current offset.
fn parse_elements(body: &[u8], func_code: &str, device: &DeviceConfig, prefer_response: bool) -> ParsedBody {
    let elements = match device.elements_for(func_code, prefer_response) {
        Some(elements) => elements,
        None => {
            return ParsedBody {
                data: Vec::new(),
                unparsed: body.to_vec(),
            }
        }
    };

    let mut offset = 0usize;
    let mut data = Vec::new();

    for element in elements {
        let guide_bytes = match hex_decode(&element.guide_hex) {
            Some(bytes) => bytes,
            None => continue,
        };
        if guide_bytes.is_empty() || offset >= body.len() {
            continue;
        }

        let found = body[offset..]
            .windows(guide_bytes.len())
            .position(|w| w == guide_bytes.as_slice());

        let relative = match found {
            Some(pos) => pos,
            None => continue,
        };

        let value_start = offset + relative + guide_bytes.len();

        if element.length == 0 {
            let value_bytes = &body[value_start..];
            data.push(decode_element(element, value_bytes));
            offset = body.len();
            break;
        }

        let value_end = value_start + element.length;
        if value_end > body.len() {
            // Truncated fixed-length element: the rest of the body is
            // unrecoverable, not just this one field. Stop the walk here
            // rather than hunting for later elements past the corruption.
            break;
        }

        let value_bytes = &body[value_start..value_end];
        data.push(decode_element(element, value_bytes));
        offset = value_end;
    }

    let unparsed = if offset < body.len() {
        body[offset..].to_vec()
    } else {
        Vec::new()
    };

    ParsedBody { data, unparsed }
}

fn decode_element(element: &crate::config::ElementDef, value_bytes: &[u8]) -> ParsedElement {
    let raw_value = hex_encode(value_bytes);

    let value = match element.encode {
        Encode::Bcd => {
            let digits = bcd_read(value_bytes, 0, value_bytes.len());
            let numeric = bcd_value_decode(&digits, element.digits);
            if element.digits > 0 {
                format!("{:.*}", element.digits as usize, numeric)
            } else {
                format!("{}", numeric as i64)
            }
        }
        Encode::TimeYyMmDdHhMmSs => {
            let digits = bcd_read(value_bytes, 0, value_bytes.len());
            bcd_time_decode(&digits)
        }
        Encode::Jpeg => {
            if value_bytes.len() >= 2 && value_bytes[0] == 0xFF && value_bytes[1] == 0xD8 {
                format!("data:image/jpeg;base64,{}", b64_encode(value_bytes))
            } else {
                "INVALID_JPEG".to_string()
            }
        }
        Encode::Dict => hex_encode(value_bytes),
        Encode::Hex => hex_encode(value_bytes),
    };

    ParsedElement {
        name: element.name.clone(),
        guide_hex: element.guide_hex.clone(),
        raw_value,
        value,
        unit: element.unit.clone(),
        element_id: element.id.clone(),
        encode: element.encode.tag(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, ElementDef};
    use gateway_codec::{bcd_encode_address, bcd_value_encode, bcd_write, hex_decode as hd};

    fn build_uplink_frame(func_code_byte: u8, body: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x7E, 0x7E, 0x01];
        frame.extend(bcd_encode_address("1234567890", 5));
        frame.extend(bcd_write("0000"));
        frame.push(func_code_byte);
        let len_field: u16 = body.len() as u16 & 0x0FFF; // direction nibble 0 = up
        frame.push((len_field >> 8) as u8);
        frame.push((len_field & 0xFF) as u8);
        frame.push(0x02); // STX single
        frame.extend_from_slice(body);
        frame.push(0x03); // ETX
        let crc = gateway_codec::crc16_modbus(&frame);
        frame.push((crc >> 8) as u8);
        frame.push((crc & 0xFF) as u8);
        frame
    }

    fn report_body(serial: u16, digits: i32, guide: &str, value: f64) -> Vec<u8> {
        let mut body = vec![(serial >> 8) as u8, (serial & 0xFF) as u8];
        body.extend(bcd_write("221229102215")); // report time
        body.extend(hd(guide).unwrap());
        body.extend(bcd_value_encode(value, 2, digits));
        body
    }

    fn registry_with_device(func_code: &str, guide: &str, digits: i32) -> DeviceConfigRegistry {
        let registry = DeviceConfigRegistry::new();
        let mut device = DeviceConfig::new(1, "station-1", "1234567890", 7);
        device.elements_by_func.insert(
            func_code.to_string(),
            vec![ElementDef {
                id: "elem-1".to_string(),
                name: "water level".to_string(),
                func_code: func_code.to_string(),
                guide_hex: guide.to_string(),
                encode: Encode::Bcd,
                length: 2,
                digits,
                unit: "m".to_string(),
                remark: String::new(),
            }],
        );
        registry.insert(device);
        registry
    }

    #[test]
    fn single_uplink_crc_valid_and_success() {
        let registry = registry_with_device("32", "01", 2);
        let connections = ConnectionTable::new();
        let body = report_body(1, 2, "01", 12.34);
        let frame = build_uplink_frame(0x32, &body);

        let parser = Sl651Parser::new();
        let ctx = ParseContext {
            link_id: 7,
            peer_addr: Some("10.0.0.5:4000"),
            now_ms: 0,
        };
        match parser.parse(&frame, &ctx, &registry, &connections) {
            ParseOutcome::Frame(result) => {
                assert_eq!(result.report_time, "2022-12-29 10:22:15+08:00");
                assert!(result.command_response.unwrap().success);
                assert_eq!(connections.lookup("1234567890").unwrap().0, 7);
            }
            other => panic!("expected Frame, got {:?}", other),
        }
        assert_eq!(parser.stats().frames_parsed, 1);
        assert_eq!(parser.stats().crc_errors, 0);
    }

    #[test]
    fn unknown_device_is_not_persisted() {
        let registry = DeviceConfigRegistry::new();
        let connections = ConnectionTable::new();
        let body = report_body(1, 2, "01", 1.0);
        let frame = build_uplink_frame(0x32, &body);
        let parser = Sl651Parser::new();
        let ctx = ParseContext { link_id: 7, peer_addr: None, now_ms: 0 };
        assert!(matches!(
            parser.parse(&frame, &ctx, &registry, &connections),
            ParseOutcome::NoDeviceConfig
        ));
    }

    fn build_multi_fragment(seq: u32, total: u32, body: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x7E, 0x7E, 0x01];
        frame.extend(bcd_encode_address("1234567890", 5));
        frame.extend(bcd_write("0000"));
        frame.push(0x32);
        let body_len = (body.len() + 3) as u16 & 0x0FFF;
        frame.push((body_len >> 8) as u8);
        frame.push((body_len & 0xFF) as u8);
        frame.push(0x16); // STX multi
        let packed: u32 = (total << 12) | seq;
        frame.push(((packed >> 16) & 0xFF) as u8);
        frame.push(((packed >> 8) & 0xFF) as u8);
        frame.push((packed & 0xFF) as u8);
        frame.extend_from_slice(body);
        frame.push(0x03);
        let crc = gateway_codec::crc16_modbus(&frame);
        frame.push((crc >> 8) as u8);
        frame.push((crc & 0xFF) as u8);
        frame
    }

    #[test]
    fn two_fragment_multi_packet_reassembles_in_order() {
        let registry = registry_with_device("32", "01", 2);
        let connections = ConnectionTable::new();
        let parser = Sl651Parser::new();

        let body1 = report_body(1, 2, "01", 1.0);
        let body2 = report_body(1, 2, "02", 2.0);
        let frag2 = build_multi_fragment(2, 2, &body2);
        let frag1 = build_multi_fragment(1, 2, &body1);

        let ctx = ParseContext { link_id: 7, peer_addr: None, now_ms: 0 };
        assert!(matches!(
            parser.parse(&frag2, &ctx, &registry, &connections),
            ParseOutcome::Buffered
        ));
        match parser.parse(&frag1, &ctx, &registry, &connections) {
            ParseOutcome::Frame(result) => {
                let raw = result.data["raw"].as_array().unwrap();
                assert_eq!(raw.len(), 2);
            }
            other => panic!("expected Frame, got {:?}", other),
        }
        assert_eq!(parser.stats().multi_packet_completed, 1);
    }

    #[test]
    fn expired_session_is_swept_and_counted() {
        let registry = registry_with_device("32", "01", 2);
        let connections = ConnectionTable::new();
        let parser = Sl651Parser::new();

        let body1 = report_body(1, 2, "01", 1.0);
        let frag1 = build_multi_fragment(1, 2, &body1);
        let ctx0 = ParseContext { link_id: 7, peer_addr: None, now_ms: 0 };
        assert!(matches!(
            parser.parse(&frag1, &ctx0, &registry, &connections),
            ParseOutcome::Buffered
        ));

        let body2 = report_body(1, 2, "02", 2.0);
        let frag2 = build_multi_fragment(2, 2, &body2);
        let ctx_later = ParseContext {
            link_id: 7,
            peer_addr: None,
            now_ms: SESSION_TIMEOUT_MS + 1,
        };
        assert!(matches!(
            parser.parse(&frag2, &ctx_later, &registry, &connections),
            ParseOutcome::Buffered
        ));
        assert_eq!(parser.stats().multi_packet_expired, 1);
    }

    #[test]
    fn session_table_full_drops_new_key() {
        let registry = registry_with_device("32", "01", 2);
        let connections = ConnectionTable::new();
        let parser = Sl651Parser::new();
        let ctx = ParseContext { link_id: 7, peer_addr: None, now_ms: 0 };

        for i in 0..MAX_SESSION_COUNT {
            let remote = format!("{:010}", i);
            let mut frame = vec![0x7E, 0x7E, 0x01];
            frame.extend(bcd_encode_address(&remote, 5));
            frame.extend(bcd_write("0000"));
            frame.push(0x32);
            let body = report_body(1, 2, "01", 1.0);
            let body_len = (body.len() + 3) as u16 & 0x0FFF;
            frame.push((body_len >> 8) as u8);
            frame.push((body_len & 0xFF) as u8);
            frame.push(0x16);
            let packed: u32 = (2u32 << 12) | 1;
            frame.push(((packed >> 16) & 0xFF) as u8);
            frame.push(((packed >> 8) & 0xFF) as u8);
            frame.push((packed & 0xFF) as u8);
            frame.extend_from_slice(&body);
            frame.push(0x03);
            let crc = gateway_codec::crc16_modbus(&frame);
            frame.push((crc >> 8) as u8);
            frame.push((crc & 0xFF) as u8);
            assert!(matches!(
                parser.parse(&frame, &ctx, &registry, &connections),
                ParseOutcome::Buffered
            ));
        }

        let body = report_body(1, 2, "01", 1.0);
        let frag = build_multi_fragment(1, 2, &body); // remoteCode 1234567890, unseen key
        assert!(matches!(
            parser.parse(&frag, &ctx, &registry, &connections),
            ParseOutcome::SessionDropped
        ));
    }

    #[test]
    fn truncated_fixed_length_element_aborts_the_whole_walk() {
        let mut device = DeviceConfig::new(1, "station-1", "1234567890", 7);
        device.elements_by_func.insert(
            "32".to_string(),
            vec![
                ElementDef {
                    id: "elem-1".to_string(),
                    name: "water level".to_string(),
                    func_code: "32".to_string(),
                    guide_hex: "AA".to_string(),
                    encode: Encode::Bcd,
                    length: 2,
                    digits: 2,
                    unit: "m".to_string(),
                    remark: String::new(),
                },
                ElementDef {
                    id: "elem-2".to_string(),
                    name: "rainfall".to_string(),
                    func_code: "32".to_string(),
                    guide_hex: "BB".to_string(),
                    encode: Encode::Bcd,
                    length: 2,
                    digits: 2,
                    unit: "mm".to_string(),
                    remark: String::new(),
                },
            ],
        );

        // elem-2's guide + a full value comes first, legitimately decodable
        // on its own; elem-1 (checked first, per config order) then claims
        // a 2-byte value but only 1 byte remains before the body ends. A
        // buggy `continue` would still find and decode elem-2's earlier
        // bytes; the correct `break` must abort before ever looking.
        let mut body = hd("BB").unwrap();
        body.extend(bcd_value_encode(3.4, 2, 2));
        body.extend(hd("AA").unwrap());
        body.push(0x12);

        let parsed = parse_elements(&body, "32", &device, false);

        assert!(parsed.data.is_empty(), "truncated element must abort before elem-2 is reached");
        assert_eq!(parsed.unparsed, body, "everything stays unparsed once the walk aborts at offset 0");
    }
}
