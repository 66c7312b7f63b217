// ABOUTME: SMS data coding scheme (DCS) byte classification and message class extraction
// ABOUTME: Maps the 3GPP TS 23.038 coding groups onto the alphabets the codec can handle

use num_enum::TryFromPrimitive;
use std::fmt;

const CLASS_VALID: u8 = 0x10;
const CLASS_MASK: u8 = 0x03;

/// Alphabet used by the user data of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmsEncoding {
    /// GSM 7-bit default alphabet
    Gsm7,
    /// 8-bit data, never transcoded
    EightBit,
    /// UCS-2 (UTF-16BE)
    Ucs2,
}

impl SmsEncoding {
    /// Single-part capacity in this alphabet's units (septets, octets, characters)
    pub fn max_single_part(&self) -> usize {
        match self {
            SmsEncoding::Gsm7 => 160,
            SmsEncoding::EightBit => 140,
            SmsEncoding::Ucs2 => 70,
        }
    }

    /// Capacity of one part once a concatenation header is present
    pub fn max_multipart_part(&self) -> usize {
        match self {
            SmsEncoding::Gsm7 => 153,
            SmsEncoding::EightBit => 134,
            SmsEncoding::Ucs2 => 67,
        }
    }
}

/// Message class carried in the DCS byte when the class-valid bit is set
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// Class 0, displayed immediately and not stored
    Flash = 0,
    /// Class 1, mobile equipment specific
    MobileEquipment = 1,
    /// Class 2, SIM specific
    SimSpecific = 2,
    /// Class 3, terminal equipment specific
    TerminalEquipment = 3,
}

/// A raw DCS byte with typed accessors
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataCodingScheme(u8);

impl DataCodingScheme {
    pub const GSM7: DataCodingScheme = DataCodingScheme(0x00);
    pub const UCS2: DataCodingScheme = DataCodingScheme(0x08);

    pub fn from_byte(value: u8) -> Self {
        DataCodingScheme(value)
    }

    pub fn to_byte(&self) -> u8 {
        self.0
    }

    /// Classifies the byte by coding group
    ///
    /// Reserved groups and reserved alphabet bits are treated as the default
    /// alphabet.
    pub fn encoding(&self) -> SmsEncoding {
        let dcs = self.0;
        match dcs >> 4 {
            0x0..=0x3 => match dcs & 0x0C {
                0x08 => SmsEncoding::Ucs2,
                0x04 => SmsEncoding::EightBit,
                _ => SmsEncoding::Gsm7,
            },
            0xC | 0xD => SmsEncoding::Gsm7,
            0xE => SmsEncoding::Ucs2,
            0xF if dcs & 0x04 != 0 => SmsEncoding::EightBit,
            _ => SmsEncoding::Gsm7,
        }
    }

    /// The message class, only when the class-valid bit is set
    pub fn message_class(&self) -> Option<MessageClass> {
        if self.0 & CLASS_VALID == 0 {
            return None;
        }
        MessageClass::try_from(self.0 & CLASS_MASK).ok()
    }
}

impl fmt::Debug for DataCodingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataCodingScheme(0x{:02X}, {:?})", self.0, self.encoding())
    }
}

impl From<SmsEncoding> for DataCodingScheme {
    fn from(encoding: SmsEncoding) -> Self {
        match encoding {
            SmsEncoding::Gsm7 => DataCodingScheme::GSM7,
            SmsEncoding::EightBit => DataCodingScheme(0x04),
            SmsEncoding::Ucs2 => DataCodingScheme::UCS2,
        }
    }
}
