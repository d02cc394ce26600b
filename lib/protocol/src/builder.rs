//! Builds downlink command frames and uplink/downlink acks (§4.4).

use crate::config::Encode;
use crate::frame::{FrameControl, Sl651Frame};
use flux::{ErrorKind, GatewayError, GatewayResult};
use gateway_codec::{bcd_encode_address, bcd_time_encode, bcd_value_encode, bcd_write, crc16_modbus, hex_decode, hex_encode};

/// One element to encode into a downlink command body.
pub struct ElementValue {
    pub guide_hex: String,
    pub value: String,
    pub encode: Encode,
    pub length: usize,
    pub digits: i32,
}

pub struct BuildDownFrameParams {
    pub center_code: String,
    pub remote_code: String,
    pub password: String,
    pub func_code: String,
    /// Decimal-formatted monotonically-increasing counter value.
    pub serial_number: String,
    pub elements: Vec<ElementValue>,
}

fn encode_center_code(center_code: &str) -> GatewayResult<u8> {
    let bytes = hex_decode(center_code)
        .filter(|b| b.len() == 1)
        .ok_or_else(|| GatewayError::validation(format!("invalid centerCode: {}", center_code)))?;
    Ok(bytes[0])
}

fn encode_element(element: &ElementValue) -> GatewayResult<Vec<u8>> {
    let guide = hex_decode(&element.guide_hex)
        .ok_or_else(|| GatewayError::validation(format!("invalid guideHex: {}", element.guide_hex)))?;

    let value_bytes = match element.encode {
        Encode::Bcd => {
            let numeric: f64 = element
                .value
                .parse()
                .map_err(|_| GatewayError::validation(format!("non-numeric BCD value: {}", element.value)))?;
            if !numeric.is_finite() {
                return Err(GatewayError::validation("non-finite BCD value"));
            }
            bcd_value_encode(numeric, element.length, element.digits)
        }
        Encode::Hex => {
            if !element.value.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(GatewayError::validation(format!("non-hex value: {}", element.value)));
            }
            let target_digits = element.length * 2;
            let mut padded = element.value.clone();
            while padded.len() < target_digits {
                padded.insert(0, '0');
            }
            hex_decode(&padded).ok_or_else(|| GatewayError::validation("hex padding failed"))?
        }
        other => {
            return Err(GatewayError::new(
                ErrorKind::Validation,
                format!("builder does not support encoding {:?} elements", other.tag()),
            ))
        }
    };

    let mut bytes = guide;
    bytes.extend(value_bytes);
    Ok(bytes)
}

/// Downlink command frame: `remoteCode` is written before `centerCode`
/// (§6's "downlink frame ordering difference" — preserved as-is).
pub fn build_down_frame(params: &BuildDownFrameParams) -> GatewayResult<Vec<u8>> {
    let center_byte = encode_center_code(&params.center_code)?;

    let mut body = Vec::new();
    let serial: u16 = params
        .serial_number
        .parse()
        .map_err(|_| GatewayError::validation(format!("invalid serial number: {}", params.serial_number)))?;
    body.push((serial >> 8) as u8);
    body.push((serial & 0xFF) as u8);
    body.extend(bcd_time_encode());
    for element in &params.elements {
        body.extend(encode_element(element)?);
    }

    let mut frame = vec![FrameControl::FRAME_HEADER, FrameControl::FRAME_HEADER];
    frame.extend(bcd_encode_address(&params.remote_code, 5));
    frame.push(center_byte);
    frame.extend(bcd_write(&pad_digits(&params.password, 4)));
    let func_byte = hex_decode(&params.func_code)
        .filter(|b| b.len() == 1)
        .ok_or_else(|| GatewayError::validation(format!("invalid funcCode: {}", params.func_code)))?[0];
    frame.push(func_byte);

    let len_field: u16 = 0x8000 | (body.len() as u16 & 0x0FFF);
    frame.push((len_field >> 8) as u8);
    frame.push((len_field & 0xFF) as u8);
    frame.push(FrameControl::STX_SINGLE);
    frame.extend(body);
    frame.push(FrameControl::ETX_INQUIRY);

    let crc = crc16_modbus(&frame);
    frame.push((crc >> 8) as u8);
    frame.push((crc & 0xFF) as u8);

    Ok(frame)
}

fn pad_digits(digits: &str, width: usize) -> String {
    let mut padded = digits.to_string();
    while padded.len() < width {
        padded.insert(0, '0');
    }
    padded
}

fn ack_header(center_code: &str, remote_code: &str, password: &str, func_code: &str) -> GatewayResult<Vec<u8>> {
    let center_byte = encode_center_code(center_code)?;
    let func_byte = hex_decode(func_code)
        .filter(|b| b.len() == 1)
        .ok_or_else(|| GatewayError::validation(format!("invalid funcCode: {}", func_code)))?[0];

    let mut frame = vec![FrameControl::FRAME_HEADER, FrameControl::FRAME_HEADER, center_byte];
    frame.extend(bcd_encode_address(remote_code, 5));
    frame.extend(bcd_write(&pad_digits(password, 4)));
    frame.push(func_byte);
    Ok(frame)
}

/// Ack frame replying to a received uplink frame: echoes serial number (or
/// `00 00` if absent), carries the current time, ETX `0x03` (no reply
/// expected).
pub fn build_ack_frame(received: &Sl651Frame) -> GatewayResult<Vec<u8>> {
    let mut frame = ack_header(&received.center_code, &received.remote_code, &received.password, &received.func_code)?;

    let len_field: u16 = 0x8000 | 8;
    frame.push((len_field >> 8) as u8);
    frame.push((len_field & 0xFF) as u8);
    frame.push(FrameControl::STX_SINGLE);

    match &received.serial_number {
        Some(serial_hex) => frame.extend(hex_decode(serial_hex).unwrap_or_else(|| vec![0, 0])),
        None => frame.extend_from_slice(&[0x00, 0x00]),
    }
    frame.extend(bcd_time_encode());
    frame.push(FrameControl::ETX_END);

    let crc = crc16_modbus(&frame);
    frame.push((crc >> 8) as u8);
    frame.push((crc & 0xFF) as u8);

    Ok(frame)
}

/// Link-keep ack: funcCode `0x2F`, empty body, ETX `0x03`.
pub fn build_link_keep_ack(received: &Sl651Frame) -> GatewayResult<Vec<u8>> {
    let mut frame = ack_header(&received.center_code, &received.remote_code, &received.password, "2F")?;

    let len_field: u16 = 0x8000;
    frame.push((len_field >> 8) as u8);
    frame.push((len_field & 0xFF) as u8);
    frame.push(FrameControl::STX_SINGLE);
    frame.push(FrameControl::ETX_END);

    let crc = crc16_modbus(&frame);
    frame.push((crc >> 8) as u8);
    frame.push((crc & 0xFF) as u8);

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::decode_header;

    fn sample_params() -> BuildDownFrameParams {
        BuildDownFrameParams {
            center_code: "01".to_string(),
            remote_code: "1234567890".to_string(),
            password: "0000".to_string(),
            func_code: "45".to_string(),
            serial_number: "7".to_string(),
            elements: vec![ElementValue {
                guide_hex: "01".to_string(),
                value: "12.5".to_string(),
                encode: Encode::Bcd,
                length: 2,
                digits: 1,
            }],
        }
    }

    #[test]
    fn down_frame_crc_self_validates() {
        let frame = build_down_frame(&sample_params()).unwrap();
        let decoded = decode_header(&frame).unwrap();
        assert!(decoded.crc_valid);
    }

    #[test]
    fn rejects_non_numeric_bcd_value() {
        let mut params = sample_params();
        params.elements[0].value = "not-a-number".to_string();
        assert!(build_down_frame(&params).is_err());
    }

    #[test]
    fn rejects_non_hex_value() {
        let mut params = sample_params();
        params.elements[0].encode = Encode::Hex;
        params.elements[0].value = "zz".to_string();
        assert!(build_down_frame(&params).is_err());
    }

    #[test]
    fn ack_frame_crc_self_validates_and_echoes_serial() {
        let uplink = build_down_frame(&sample_params()).unwrap();
        let mut received = decode_header(&uplink).unwrap();
        received.serial_number = Some("0007".to_string());

        let ack = build_ack_frame(&received).unwrap();
        let decoded = decode_header(&ack).unwrap();
        assert!(decoded.crc_valid);
        assert_eq!(decoded.etx, FrameControl::ETX_END);
    }

    #[test]
    fn link_keep_ack_has_empty_body() {
        let uplink = build_down_frame(&sample_params()).unwrap();
        let received = decode_header(&uplink).unwrap();
        let ack = build_link_keep_ack(&received).unwrap();
        let decoded = decode_header(&ack).unwrap();
        assert!(decoded.crc_valid);
        assert_eq!(decoded.func_code, "2F");
        assert!(decoded.body.is_empty());
    }
}
