// ABOUTME: SMS-DELIVER decoding from the hex PDU strings modems report
// ABOUTME: Validates lengths in three stages before extracting addresses, timestamp, text and concatenation info

use super::address::AddressField;
use super::charset::{gsm_unpack, ucs2_decode, unpacked_gsm_to_utf8};
use super::data_coding::{DataCodingScheme, MessageClass, SmsEncoding};
use super::error::{PduError, PduResult};
use super::timestamp::{SmsTimestamp, TIMESTAMP_LEN};
use super::udh::{ConcatInfo, parse_user_data_header};
use tracing::debug;

const TP_MTI_MASK: u8 = 0x03;
const TP_MTI_SMS_DELIVER: u8 = 0x00;
const TP_UDHI: u8 = 0x40;

/// Smallest TPDU with an empty sender and no user data
const SMS_MIN_PDU_LEN: usize = 7 + TIMESTAMP_LEN;

/// A decoded SMS-DELIVER
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    /// Service centre the message came through, when the PDU carries one
    pub smsc: Option<AddressField>,
    pub sender: AddressField,
    pub timestamp: SmsTimestamp,
    /// Decoded text; empty for 8-bit payloads
    pub text: String,
    /// User data after any header, as sent
    pub data: Vec<u8>,
    pub data_coding: DataCodingScheme,
    pub class: Option<MessageClass>,
    pub concat: Option<ConcatInfo>,
}

impl SmsMessage {
    pub fn number(&self) -> &str {
        &self.sender.number
    }

    pub fn is_multipart(&self) -> bool {
        self.concat.is_some()
    }
}

/// Decodes a hex-encoded SMS-DELIVER PDU, SMSC address included
pub fn parse_pdu(hex_pdu: &str) -> PduResult<SmsMessage> {
    let pdu = hex::decode(hex_pdu.trim())?;
    decode_deliver(&pdu)
}

fn check_length(stage: u8, actual: usize, variable: usize) -> PduResult<()> {
    let required = variable + SMS_MIN_PDU_LEN;
    if actual < required {
        return Err(PduError::MalformedPdu(format!(
            "PDU too short ({stage}): {actual} vs {required}"
        )));
    }
    Ok(())
}

/// Decodes a binary SMS-DELIVER PDU
pub fn decode_deliver(pdu: &[u8]) -> PduResult<SmsMessage> {
    let smsc_octets = pdu.first().copied().unwrap_or(0) as usize;
    let mut variable = smsc_octets;
    check_length(1, pdu.len(), variable)?;

    let msg_start = 1 + smsc_octets;
    let sender_digits = pdu[msg_start + 1] as usize;
    let sender_octets = (sender_digits + 1) >> 1;
    variable += sender_octets;
    check_length(2, pdu.len(), variable)?;

    let pid_offset = msg_start + 3 + sender_octets;
    let dcs_offset = pid_offset + 1;
    let udl_offset = dcs_offset + 1 + TIMESTAMP_LEN;
    let mut ud_offset = udl_offset + 1;
    let mut ud_len = pdu[udl_offset] as usize;

    let data_coding = DataCodingScheme::from_byte(pdu[dcs_offset]);
    let encoding = data_coding.encoding();
    variable += match encoding {
        SmsEncoding::Gsm7 => (7 * (ud_len + 1)) / 8,
        _ => ud_len,
    };
    check_length(3, pdu.len(), variable)?;

    let first_octet = pdu[msg_start];
    if first_octet & TP_MTI_MASK != TP_MTI_SMS_DELIVER {
        return Err(PduError::UnsupportedMessageType(first_octet));
    }

    let mut bit_offset = 0;
    let mut concat = None;
    if first_octet & TP_UDHI != 0 {
        concat = parse_user_data_header(&pdu[ud_offset..])?;
        let udhl = pdu[ud_offset] as usize + 1;
        ud_offset += udhl;
        if encoding == SmsEncoding::Gsm7 {
            // fill bits realign the text on a septet boundary
            bit_offset = (7 - udhl % 7) % 7;
            ud_len = ud_len.saturating_sub((udhl * 8 + bit_offset) / 7);
        } else {
            ud_len = ud_len.saturating_sub(udhl);
        }
    }

    let user_data = pdu.get(ud_offset..).unwrap_or_default();
    let (text, data_octets) = match encoding {
        SmsEncoding::Gsm7 => {
            let septets = gsm_unpack(user_data, ud_len, bit_offset);
            (unpacked_gsm_to_utf8(&septets), (ud_len * 7 + bit_offset).div_ceil(8))
        }
        SmsEncoding::Ucs2 => {
            let end = ud_len.min(user_data.len());
            (ucs2_decode(&user_data[..end])?, ud_len)
        }
        SmsEncoding::EightBit => (String::new(), ud_len),
    };
    let data = user_data[..data_octets.min(user_data.len())].to_vec();

    let smsc = (smsc_octets > 0)
        .then(|| AddressField::decode(&pdu[1..msg_start], 2 * (smsc_octets - 1)));
    let sender = AddressField::decode(&pdu[msg_start + 2..pid_offset], sender_digits);
    let timestamp = SmsTimestamp::decode(&pdu[dcs_offset + 1..udl_offset])
        .ok_or_else(|| PduError::MalformedPdu("truncated timestamp".into()))?;

    debug!(
        "decoded SMS-DELIVER from {} ({:?}, {} octets of user data)",
        sender, encoding, data.len()
    );

    Ok(SmsMessage {
        smsc,
        sender,
        timestamp,
        text,
        data,
        data_coding,
        class: data_coding.message_class(),
        concat,
    })
}
