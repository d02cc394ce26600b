//! Stateless codecs for the SL651 wire format: BCD, CRC-16/Modbus, Base64,
//! hex and big-endian integer I/O. No link or parser state lives here.

pub mod bcd;
pub mod crc;
pub mod hex;
pub mod b64;
pub mod time;

pub use b64::{b64_decode, b64_encode};
pub use bcd::{bcd_encode_address, bcd_read, bcd_value_decode, bcd_value_encode, bcd_write};
pub use crc::crc16_modbus;
pub use hex::{hex_decode, hex_encode};
pub use time::{bcd_time_decode, bcd_time_encode};
