// ABOUTME: GSM 03.38 default alphabet and UCS-2 conversions used by the PDU codec
// ABOUTME: Handles septet packing with bit offsets and the escape-prefixed extension table

use super::error::{PduError, PduResult};

/// Escape septet introducing a character from the extension table
pub const GSM7_ESCAPE: u8 = 0x1B;

#[rustfmt::skip]
const GSM7_BASIC: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å',
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1b}', 'Æ', 'æ', 'ß', 'É',
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/',
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§',
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à',
];

const GSM7_EXTENDED: [(u8, char); 10] = [
    (0x0A, '\u{0c}'),
    (0x14, '^'),
    (0x28, '{'),
    (0x29, '}'),
    (0x2F, '\\'),
    (0x3C, '['),
    (0x3D, '~'),
    (0x3E, ']'),
    (0x40, '|'),
    (0x65, '€'),
];

/// A character's representation in the GSM default alphabet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gsm7Char {
    Basic(u8),
    Extended(u8),
}

impl Gsm7Char {
    /// Number of septets the character occupies on the wire
    pub fn septets(self) -> usize {
        match self {
            Gsm7Char::Basic(_) => 1,
            Gsm7Char::Extended(_) => 2,
        }
    }
}

/// Looks a character up in the default alphabet and its extension table
pub fn gsm7_lookup(c: char) -> Option<Gsm7Char> {
    if c == '\u{1b}' {
        return None;
    }
    if let Some(pos) = GSM7_BASIC.iter().position(|&g| g == c) {
        return Some(Gsm7Char::Basic(pos as u8));
    }
    GSM7_EXTENDED
        .iter()
        .find(|(_, g)| *g == c)
        .map(|(code, _)| Gsm7Char::Extended(*code))
}

/// Septet length of `text`, or `None` if any character is outside the alphabet
pub fn gsm7_septet_len(text: &str) -> Option<usize> {
    text.chars()
        .map(|c| gsm7_lookup(c).map(Gsm7Char::septets))
        .sum()
}

/// Converts UTF-8 text into unpacked septets, one byte per septet
pub fn utf8_to_unpacked_gsm(text: &str) -> PduResult<Vec<u8>> {
    let mut septets = Vec::with_capacity(text.len());
    for c in text.chars() {
        match gsm7_lookup(c) {
            Some(Gsm7Char::Basic(code)) => septets.push(code),
            Some(Gsm7Char::Extended(code)) => {
                septets.push(GSM7_ESCAPE);
                septets.push(code);
            }
            None => {
                return Err(PduError::EncodingFailure(format!(
                    "character {c:?} is not in the GSM default alphabet"
                )));
            }
        }
    }
    Ok(septets)
}

/// Converts unpacked septets back to UTF-8
///
/// An escape followed by a code with no extension mapping falls back to the
/// basic table; a dangling escape at the end is dropped.
pub fn unpacked_gsm_to_utf8(septets: &[u8]) -> String {
    let mut out = String::with_capacity(septets.len());
    let mut iter = septets.iter().map(|s| s & 0x7F);
    while let Some(septet) = iter.next() {
        if septet != GSM7_ESCAPE {
            out.push(GSM7_BASIC[septet as usize]);
            continue;
        }
        let Some(code) = iter.next() else { break };
        match GSM7_EXTENDED.iter().find(|(ext, _)| *ext == code) {
            Some((_, c)) => out.push(*c),
            None if code == GSM7_ESCAPE => out.push(' '),
            None => out.push(GSM7_BASIC[code as usize]),
        }
    }
    out
}

/// Packs septets into octets, starting `start_bit` bits into the first octet
///
/// The leading fill bits are left zero, which is how a user data header is
/// padded to a septet boundary.
pub fn gsm_pack(septets: &[u8], start_bit: usize) -> Vec<u8> {
    let total_bits = start_bit + septets.len() * 7;
    let mut packed = vec![0u8; total_bits.div_ceil(8)];
    for (i, septet) in septets.iter().enumerate() {
        let bit = start_bit + i * 7;
        let value = u16::from(septet & 0x7F) << (bit % 8);
        packed[bit / 8] |= value as u8;
        if value > 0xFF {
            packed[bit / 8 + 1] |= (value >> 8) as u8;
        }
    }
    packed
}

/// Unpacks `num_septets` septets, skipping `bit_offset` fill bits first
///
/// Stops early if `packed` runs out.
pub fn gsm_unpack(packed: &[u8], num_septets: usize, bit_offset: usize) -> Vec<u8> {
    let mut septets = Vec::with_capacity(num_septets);
    for i in 0..num_septets {
        let bit = bit_offset + i * 7;
        let shift = bit % 8;
        let Some(&low) = packed.get(bit / 8) else {
            break;
        };
        let mut value = u16::from(low) >> shift;
        if shift > 1 {
            if let Some(&high) = packed.get(bit / 8 + 1) {
                value |= u16::from(high) << (8 - shift);
            } else {
                break;
            }
        }
        septets.push((value & 0x7F) as u8);
    }
    septets
}

/// Encodes text as UCS-2 big endian (UTF-16BE for characters outside the BMP)
pub fn ucs2_encode(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// Decodes UCS-2 big endian bytes; a trailing odd byte is ignored
pub fn ucs2_decode(bytes: &[u8]) -> PduResult<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| PduError::EncodingFailure(e.to_string()))
}
