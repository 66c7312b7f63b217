// ABOUTME: SMS address fields with type-of-number and numbering-plan handling
// ABOUTME: Encodes and decodes BCD semi-octet numbers and GSM-packed alphanumeric senders

use super::charset::{gsm_unpack, unpacked_gsm_to_utf8};
use super::error::{PduError, PduResult};
use bytes::{BufMut, BytesMut};
use num_enum::TryFromPrimitive;
use std::fmt;

const BCD_CHARS: &[u8; 15] = b"0123456789*#abc";

const TYPE_MASK: u8 = 0x70;
const PLAN_MASK: u8 = 0x0F;
const EXTENSION_BIT: u8 = 0x80;

/// Type of number, bits 4-6 of the address type octet
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum TypeOfNumber {
    #[default]
    Unknown = 0b000,
    International = 0b001,
    National = 0b010,
    NetworkSpecific = 0b011,
    Subscriber = 0b100,
    Alphanumeric = 0b101,
    Abbreviated = 0b110,
    Reserved = 0b111,
}

/// Numbering plan identification, bits 0-3 of the address type octet
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum NumberingPlan {
    #[default]
    Unknown = 0b0000,
    Telephone = 0b0001,
    Data = 0b0011,
    Telex = 0b0100,
    ServiceCentre = 0b0101,
    ServiceCentreAlt = 0b0110,
    National = 0b1000,
    Private = 0b1001,
    Ermes = 0b1010,
    Reserved = 0b1111,
}

/// Which length convention an encoded address uses
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressRole {
    /// Length octet counts the type octet plus the address octets
    Smsc,
    /// Length octet counts the digits
    Destination,
}

/// A phone number together with its type and numbering plan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressField {
    pub number: String,
    pub type_of_number: TypeOfNumber,
    pub numbering_plan: NumberingPlan,
}

impl AddressField {
    /// Splits an address type octet into its type and plan
    pub fn from_type_octet(type_octet: u8, number: String) -> Self {
        Self {
            number,
            type_of_number: TypeOfNumber::try_from((type_octet & TYPE_MASK) >> 4)
                .unwrap_or_default(),
            numbering_plan: NumberingPlan::try_from(type_octet & PLAN_MASK).unwrap_or_default(),
        }
    }

    /// The type octet, with the extension bit always set
    pub fn type_octet(&self) -> u8 {
        EXTENSION_BIT | ((self.type_of_number as u8) << 4) | self.numbering_plan as u8
    }

    pub fn is_international(&self) -> bool {
        self.type_of_number == TypeOfNumber::International
    }

    /// Decodes an address whose first octet is the type octet
    ///
    /// `semi_octets` is the number of useful semi-octets following it.
    pub fn decode(address: &[u8], semi_octets: usize) -> Self {
        let Some((&type_octet, digits)) = address.split_first() else {
            return Self::from_type_octet(0, String::new());
        };
        let mut field = Self::from_type_octet(type_octet, String::new());
        field.number = match (field.type_of_number, field.numbering_plan) {
            (TypeOfNumber::Alphanumeric, _) => {
                let septets = gsm_unpack(digits, (semi_octets * 4) / 7, 0);
                unpacked_gsm_to_utf8(&septets)
            }
            (TypeOfNumber::International, NumberingPlan::Telephone) => {
                format!("+{}", semi_octets_to_bcd(digits, semi_octets.div_ceil(2)))
            }
            _ => semi_octets_to_bcd(digits, semi_octets.div_ceil(2)),
        };
        field
    }
}

impl fmt::Display for AddressField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.number)
    }
}

/// Converts BCD octets to a string, stopping at the first 0xF filler nibble
pub fn semi_octets_to_bcd(octets: &[u8], num_octets: usize) -> String {
    let mut out = String::with_capacity(num_octets * 2);
    for octet in octets.iter().take(num_octets) {
        for nibble in [octet & 0x0F, octet >> 4] {
            match BCD_CHARS.get(nibble as usize) {
                Some(&c) => out.push(c as char),
                None => return out,
            }
        }
    }
    out
}

fn char_to_bcd(c: u8) -> Option<u8> {
    BCD_CHARS.iter().position(|&b| b == c).map(|p| p as u8)
}

/// Encodes a digit string as semi-octets, padding odd lengths with 0xF
pub fn bcd_to_semi_octets(digits: &str) -> PduResult<Vec<u8>> {
    let invalid = || PduError::InvalidAddress(digits.to_string());
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let low = char_to_bcd(pair[0]).ok_or_else(invalid)?;
            let high = match pair.get(1) {
                Some(&c) => char_to_bcd(c).ok_or_else(invalid)?,
                None => 0x0F,
            };
            Ok(low | (high << 4))
        })
        .collect()
}

/// Encodes `number` into `buf` as length octet, type octet and BCD digits
///
/// A leading `+` marks the number international. The plan is always
/// telephone.
pub fn encode_address(number: &str, role: AddressRole, buf: &mut BytesMut) -> PduResult<()> {
    let (type_of_number, digits) = match number.strip_prefix('+') {
        Some(rest) => (TypeOfNumber::International, rest),
        None => (TypeOfNumber::Unknown, number),
    };
    if digits.is_empty() {
        return Err(PduError::InvalidAddress(number.to_string()));
    }
    let octets =
        bcd_to_semi_octets(digits).map_err(|_| PduError::InvalidAddress(number.to_string()))?;
    let length = match role {
        AddressRole::Smsc => octets.len() + 1,
        AddressRole::Destination => digits.len(),
    };
    let field = AddressField {
        number: number.to_string(),
        type_of_number,
        numbering_plan: NumberingPlan::Telephone,
    };

    buf.put_u8(length as u8);
    buf.put_u8(field.type_octet());
    buf.put_slice(&octets);
    Ok(())
}
