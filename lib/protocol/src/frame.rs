//! SL651 frame constants and the parsed frame representation (§6).

use serde::{Deserialize, Serialize};

/// Transfer direction, carried in the frame's length-field top nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    #[inline]
    pub fn from_nibble(nibble: u8) -> Direction {
        if nibble == 0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

/// Frame control bytes (§6 wire table).
pub struct FrameControl;

impl FrameControl {
    pub const FRAME_HEADER: u8 = 0x7E;
    pub const STX_SINGLE: u8 = 0x02;
    pub const STX_MULTI: u8 = 0x16;
    pub const ETX_END: u8 = 0x03;
    pub const ETX_INQUIRY: u8 = 0x05;
}

/// Function codes referenced by name in the spec. Values are ASCII hex
/// strings as they appear on the wire (1 byte -> 2 hex chars).
pub struct FuncCodes;

impl FuncCodes {
    pub const LINK_KEEP: &'static str = "2F";
    pub const TEST: &'static str = "30";
    pub const TIMED_REPORT: &'static str = "32";
    pub const ACK_OK: &'static str = "E1";
    pub const ACK_ERR: &'static str = "E2";
}

pub const SL651_FRAME_HEADER_SIZE: usize = 13;
pub const MAX_BUFFER_SIZE: usize = 65_536;
pub const MAX_SESSION_COUNT: usize = 100;
pub const SESSION_TIMEOUT_MS: u64 = 900_000;
pub const PROTOCOL_SL651: &str = "SL651";

/// A fully decoded SL651 frame header plus its body/trailer (§3).
#[derive(Debug, Clone)]
pub struct Sl651Frame {
    pub direction: Direction,
    pub center_code: String,
    pub remote_code: String,
    pub password: String,
    pub func_code: String,
    pub stx: u8,
    pub etx: u8,
    pub body: Vec<u8>,
    pub crc_recv: u16,
    pub crc_calc: u16,
    pub crc_valid: bool,
    pub raw: Vec<u8>,
    pub is_multi_packet: bool,
    pub total_pk: u32,
    pub seq_pk: u32,
    pub is_last_packet: bool,
    pub serial_number: Option<String>,
}
