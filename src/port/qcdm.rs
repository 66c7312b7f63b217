// ABOUTME: Minimal QCDM framing: HDLC-style escaping with CRC-16/X.25 trailer
// ABOUTME: Just enough to send a version-info request and recognise a valid reply when probing

use super::serial::ResponseStatus;
use bytes::{BufMut, Bytes, BytesMut};

const FRAME_END: u8 = 0x7E;
const ESCAPE: u8 = 0x7D;
const ESCAPE_MASK: u8 = 0x20;

/// Diagnostic command code for version information
pub const DIAG_CMD_VERSION_INFO: u8 = 0x00;

fn crc16_x25(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8408 } else { crc >> 1 };
        }
    }
    !crc
}

/// Wraps a raw command: CRC appended little endian, special bytes escaped,
/// frame terminated with 0x7E
pub fn encapsulate(payload: &[u8]) -> Bytes {
    let crc = crc16_x25(payload).to_le_bytes();
    let mut frame = BytesMut::with_capacity(payload.len() * 2 + 4);
    for byte in payload.iter().chain(crc.iter()) {
        if *byte == FRAME_END || *byte == ESCAPE {
            frame.put_u8(ESCAPE);
            frame.put_u8(byte ^ ESCAPE_MASK);
        } else {
            frame.put_u8(*byte);
        }
    }
    frame.put_u8(FRAME_END);
    frame.freeze()
}

/// Reverses [`encapsulate`], returning the payload when the CRC checks out
pub fn decapsulate(frame: &[u8]) -> Option<Vec<u8>> {
    let end = frame.iter().position(|b| *b == FRAME_END)?;
    let mut unescaped = Vec::with_capacity(end);
    let mut bytes = frame[..end].iter();
    while let Some(&byte) = bytes.next() {
        if byte == ESCAPE {
            unescaped.push(bytes.next()? ^ ESCAPE_MASK);
        } else {
            unescaped.push(byte);
        }
    }
    if unescaped.len() < 3 {
        return None;
    }
    let (payload, crc) = unescaped.split_at(unescaped.len() - 2);
    (crc16_x25(payload).to_le_bytes() == crc).then(|| payload.to_vec())
}

/// The probe request sent to candidate QCDM ports
pub fn version_info_request() -> Bytes {
    encapsulate(&[DIAG_CMD_VERSION_INFO])
}

/// Processor completing once a whole frame has arrived
pub fn qcdm_response(buffer: &[u8]) -> ResponseStatus {
    // a leading frame marker is just a flush of the previous frame
    let body = match buffer.first() {
        Some(&FRAME_END) => &buffer[1..],
        _ => buffer,
    };
    if body.contains(&FRAME_END) {
        ResponseStatus::Complete
    } else {
        ResponseStatus::Incomplete
    }
}

/// Whether a response is a well-formed version-info reply
pub fn is_version_info_reply(response: &[u8]) -> bool {
    let body = response.strip_prefix(&[FRAME_END]).unwrap_or(response);
    matches!(decapsulate(body), Some(payload) if payload.first() == Some(&DIAG_CMD_VERSION_INFO))
}
