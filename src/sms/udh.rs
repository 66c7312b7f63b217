// ABOUTME: User data header parsing and construction for concatenated SMS
// ABOUTME: Recognises the 8-bit and 16-bit reference concatenation information elements

use super::error::{PduError, PduResult};

const IEI_CONCAT_8BIT: u8 = 0x00;
const IEI_CONCAT_16BIT: u8 = 0x08;

/// Length of the concatenation header this codec emits, length octet included
pub const CONCAT_UDH_LEN: usize = 6;

/// Position of one part within a concatenated message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConcatInfo {
    pub reference: u16,
    pub max: u8,
    pub sequence: u8,
}

impl ConcatInfo {
    fn checked(reference: u16, max: u8, sequence: u8) -> Option<Self> {
        // part 0 of M and part N > M are both nonsense
        if sequence == 0 || sequence > max {
            return None;
        }
        Some(Self {
            reference,
            max,
            sequence,
        })
    }
}

/// Parses the information elements of a user data header
///
/// `udh` starts at the UDHL octet. Returns the concatenation info carried by
/// the last valid concatenation element, if any. Elements running past the
/// declared header length make the PDU malformed.
pub fn parse_user_data_header(udh: &[u8]) -> PduResult<Option<ConcatInfo>> {
    let Some((&udhl, rest)) = udh.split_first() else {
        return Err(PduError::MalformedPdu("missing user data header".into()));
    };
    let elements = rest.get(..udhl as usize).ok_or_else(|| {
        PduError::MalformedPdu(format!(
            "user data header length {} exceeds {} available octets",
            udhl,
            rest.len()
        ))
    })?;

    let mut concat = None;
    let mut offset = 0;
    while offset < elements.len() {
        let (Some(&iei), Some(&ie_len)) = (elements.get(offset), elements.get(offset + 1)) else {
            return Err(PduError::MalformedPdu("truncated information element".into()));
        };
        let start = offset + 2;
        let data = elements
            .get(start..start + ie_len as usize)
            .ok_or_else(|| PduError::MalformedPdu(format!("information element 0x{iei:02x} overruns header")))?;

        match (iei, data) {
            (IEI_CONCAT_8BIT, &[reference, max, sequence, ..]) => {
                if let Some(info) = ConcatInfo::checked(reference.into(), max, sequence) {
                    concat = Some(info);
                }
            }
            (IEI_CONCAT_16BIT, &[hi, lo, max, sequence, ..]) => {
                if let Some(info) = ConcatInfo::checked(u16::from_be_bytes([hi, lo]), max, sequence) {
                    concat = Some(info);
                }
            }
            _ => {}
        }
        offset = start + ie_len as usize;
    }
    Ok(concat)
}

/// Builds the 6-octet concatenation header `05 00 03 ref total index`
pub fn concat_header(reference: u8, total: u8, index: u8) -> [u8; CONCAT_UDH_LEN] {
    [0x05, IEI_CONCAT_8BIT, 0x03, reference, total, index]
}
