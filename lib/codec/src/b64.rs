//! Standard Base64 (`A-Z a-z 0-9 + /`) with `=` padding.

use base64::{engine::general_purpose::STANDARD, Engine as _};

pub fn b64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn b64_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}
