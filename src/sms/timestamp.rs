// ABOUTME: Service centre timestamp decoding for SMS-DELIVER PDUs
// ABOUTME: Turns seven semi-octet bytes into a YYMMDDHHMMSS±ZZ timestamp

use super::address::semi_octets_to_bcd;
use std::fmt;

/// Encoded length of a TP-SCTS field
pub const TIMESTAMP_LEN: usize = 7;

/// A service centre timestamp, kept as the digits the network sent
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SmsTimestamp {
    digits: String,
    quarters: u8,
    negative: bool,
}

impl SmsTimestamp {
    /// Decodes the 7-byte TP-SCTS field
    ///
    /// Returns `None` when fewer than seven bytes are available.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..TIMESTAMP_LEN)?;
        let mut digits = semi_octets_to_bcd(&raw[..6], 6);
        // a 0xF nibble ends the digit run early; keep the field width fixed
        while digits.len() < 12 {
            digits.push('0');
        }
        let tz = raw[6];
        Some(Self {
            digits,
            quarters: (tz & 0x07) * 10 + (tz >> 4),
            negative: tz & 0x08 != 0,
        })
    }

    fn field(&self, index: usize) -> u8 {
        self.digits
            .get(index * 2..index * 2 + 2)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    pub fn year(&self) -> u8 {
        self.field(0)
    }

    pub fn month(&self) -> u8 {
        self.field(1)
    }

    pub fn day(&self) -> u8 {
        self.field(2)
    }

    pub fn hour(&self) -> u8 {
        self.field(3)
    }

    pub fn minute(&self) -> u8 {
        self.field(4)
    }

    pub fn second(&self) -> u8 {
        self.field(5)
    }

    /// Offset from UTC in quarter hours
    pub fn offset_quarters(&self) -> i16 {
        let quarters = i16::from(self.quarters);
        if self.negative { -quarters } else { quarters }
    }
}

impl fmt::Display for SmsTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negative { '-' } else { '+' };
        let hours = self.quarters / 4;
        write!(f, "{}{}{:02}", self.digits, sign, hours)
    }
}
