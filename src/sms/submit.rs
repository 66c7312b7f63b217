// ABOUTME: SMS-SUBMIT PDU construction with automatic alphabet selection and concatenation
// ABOUTME: Splits long texts into parts sharing one random reference, each carrying a 6-octet UDH

use super::address::{AddressRole, encode_address};
use super::charset::{Gsm7Char, GSM7_ESCAPE, gsm_pack, gsm7_lookup, gsm7_septet_len};
use super::data_coding::{DataCodingScheme, SmsEncoding};
use super::error::{PduError, PduResult};
use super::udh::{CONCAT_UDH_LEN, ConcatInfo, concat_header};
use super::validity::validity_to_relative;
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use tracing::debug;

const TP_MTI_SMS_SUBMIT: u8 = 0x01;
const TP_VPF_RELATIVE: u8 = 0x10;
const TP_SRR: u8 = 0x20;
const TP_UDHI: u8 = 0x40;
const TP_PID_DEFAULT: u8 = 0x00;

/// Septets the concatenation header displaces in a GSM 7-bit part
const GSM7_UDH_SEPTETS: usize = 7;

/// Options for building SMS-SUBMIT PDUs
///
/// # Example
///
/// ```rust
/// use modemcore::sms::SubmitOptions;
///
/// let options = SubmitOptions::new()
///     .with_smsc("+31624000000")
///     .with_validity_minutes(60)
///     .with_status_report();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// SMSC to route through; the modem's default when unset
    pub smsc: Option<String>,
    /// Relative validity in minutes; zero omits the field
    pub validity_minutes: u32,
    /// Ask the network for a status report on the final part
    pub request_status: bool,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_smsc(mut self, smsc: impl Into<String>) -> Self {
        self.smsc = Some(smsc.into());
        self
    }

    pub fn with_validity_minutes(mut self, minutes: u32) -> Self {
        self.validity_minutes = minutes;
        self
    }

    pub fn with_status_report(mut self) -> Self {
        self.request_status = true;
        self
    }
}

/// One encoded SMS-SUBMIT, SMSC sub-PDU first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsPdu {
    bytes: Bytes,
    msg_start: usize,
    concat: Option<ConcatInfo>,
}

impl SmsPdu {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Offset of the TPDU, i.e. the length of the SMSC sub-PDU
    pub fn msg_start(&self) -> usize {
        self.msg_start
    }

    /// TPDU length, the value `AT+CMGS` expects
    pub fn tpdu_len(&self) -> usize {
        self.bytes.len() - self.msg_start
    }

    pub fn concat(&self) -> Option<ConcatInfo> {
        self.concat
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes)
    }
}

enum PartText {
    Gsm7(Vec<u8>),
    Ucs2(Vec<u16>),
}

/// Splits text into GSM septet runs, keeping escape sequences whole
fn split_gsm7(text: &str, total_septets: usize) -> Vec<PartText> {
    let limit = if total_septets <= SmsEncoding::Gsm7.max_single_part() {
        usize::MAX
    } else {
        SmsEncoding::Gsm7.max_multipart_part()
    };

    let mut parts = Vec::new();
    let mut current = Vec::new();
    for c in text.chars() {
        let Some(code) = gsm7_lookup(c) else { continue };
        if current.len() + code.septets() > limit {
            parts.push(PartText::Gsm7(std::mem::take(&mut current)));
        }
        match code {
            Gsm7Char::Basic(septet) => current.push(septet),
            Gsm7Char::Extended(septet) => current.extend_from_slice(&[GSM7_ESCAPE, septet]),
        }
    }
    parts.push(PartText::Gsm7(current));
    parts
}

/// Splits text into UTF-16 runs, never separating a surrogate pair
fn split_ucs2(text: &str) -> Vec<PartText> {
    let total_units = text.encode_utf16().count();
    let limit = if total_units <= SmsEncoding::Ucs2.max_single_part() {
        usize::MAX
    } else {
        SmsEncoding::Ucs2.max_multipart_part()
    };

    let mut parts = Vec::new();
    let mut current: Vec<u16> = Vec::new();
    let mut buf = [0u16; 2];
    for c in text.chars() {
        let units = c.encode_utf16(&mut buf);
        if current.len() + units.len() > limit {
            parts.push(PartText::Ucs2(std::mem::take(&mut current)));
        }
        current.extend_from_slice(units);
    }
    parts.push(PartText::Ucs2(current));
    parts
}

fn split_text(text: &str) -> Vec<PartText> {
    match gsm7_septet_len(text) {
        Some(septets) => split_gsm7(text, septets),
        None => split_ucs2(text),
    }
}

/// Writes DCS, optional validity, UDL, optional UDH and the encoded text
fn put_user_data(
    buf: &mut BytesMut,
    part: &PartText,
    validity: Option<u8>,
    udh: Option<[u8; CONCAT_UDH_LEN]>,
) -> PduResult<()> {
    let encoding = match part {
        PartText::Gsm7(_) => SmsEncoding::Gsm7,
        PartText::Ucs2(_) => SmsEncoding::Ucs2,
    };
    buf.put_u8(DataCodingScheme::from(encoding).to_byte());
    if let Some(vp) = validity {
        buf.put_u8(vp);
    }

    match part {
        PartText::Gsm7(septets) => {
            let header_septets = if udh.is_some() { GSM7_UDH_SEPTETS } else { 0 };
            let udl = u8::try_from(septets.len() + header_septets)
                .map_err(|_| PduError::EncodingFailure("GSM 7-bit part too long".into()))?;
            buf.put_u8(udl);
            match udh {
                Some(header) => {
                    buf.put_slice(&header);
                    // one fill bit pads the 48-bit header to 7 septets
                    buf.put_slice(&gsm_pack(septets, 1));
                }
                None => buf.put_slice(&gsm_pack(septets, 0)),
            }
        }
        PartText::Ucs2(units) => {
            let header_len = if udh.is_some() { CONCAT_UDH_LEN } else { 0 };
            let udl = u8::try_from(units.len() * 2 + header_len)
                .map_err(|_| PduError::EncodingFailure("UCS-2 part too long".into()))?;
            buf.put_u8(udl);
            if let Some(header) = udh {
                buf.put_slice(&header);
            }
            for unit in units {
                buf.put_u16(*unit);
            }
        }
    }
    Ok(())
}

/// Builds the SMS-SUBMIT PDUs needed to send `text` to `number`
///
/// The alphabet is chosen for the whole message: GSM 7-bit when every
/// character is representable, UCS-2 otherwise. Texts over one PDU's capacity
/// are split into concatenated parts with a random reference; only the last
/// part requests a status report.
pub fn build_submit_pdus(
    number: &str,
    text: &str,
    options: &SubmitOptions,
) -> PduResult<Vec<SmsPdu>> {
    let reference = rand::thread_rng().gen_range(1..255);
    build_submit_pdus_with_reference(number, text, options, reference)
}

pub(crate) fn build_submit_pdus_with_reference(
    number: &str,
    text: &str,
    options: &SubmitOptions,
    reference: u8,
) -> PduResult<Vec<SmsPdu>> {
    if text.is_empty() {
        return Err(PduError::EncodingFailure("empty message text".into()));
    }

    let mut smsc = BytesMut::with_capacity(12);
    match &options.smsc {
        Some(address) => encode_address(address, AddressRole::Smsc, &mut smsc)?,
        // zero-length SMSC: use the one stored in the modem
        None => smsc.put_u8(0x00),
    }
    let mut destination = BytesMut::with_capacity(12);
    encode_address(number, AddressRole::Destination, &mut destination)?;

    let validity = (options.validity_minutes > 0)
        .then(|| validity_to_relative(options.validity_minutes));
    let parts = split_text(text);
    let total = u8::try_from(parts.len())
        .map_err(|_| PduError::EncodingFailure(format!("{} parts exceed 255", parts.len())))?;
    let multipart = total > 1;

    let mut pdus = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        let index = i as u8 + 1;
        let last = index == total;

        let mut first_octet = TP_MTI_SMS_SUBMIT;
        if validity.is_some() {
            first_octet |= TP_VPF_RELATIVE;
        }
        if multipart {
            first_octet |= TP_UDHI;
        }
        if last && options.request_status {
            first_octet |= TP_SRR;
        }

        let mut buf = BytesMut::with_capacity(smsc.len() + destination.len() + 160);
        buf.put_slice(&smsc);
        buf.put_u8(first_octet);
        // message reference, assigned by the modem
        buf.put_u8(0x00);
        buf.put_slice(&destination);
        buf.put_u8(TP_PID_DEFAULT);
        let udh = multipart.then(|| concat_header(reference, total, index));
        put_user_data(&mut buf, part, validity, udh)?;

        pdus.push(SmsPdu {
            bytes: buf.freeze(),
            msg_start: smsc.len(),
            concat: multipart.then_some(ConcatInfo {
                reference: reference.into(),
                max: total,
                sequence: index,
            }),
        });
    }

    debug!("built {} SMS-SUBMIT PDU(s) for {}", pdus.len(), number);
    Ok(pdus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(number: &str, text: &str, options: &SubmitOptions) -> Vec<SmsPdu> {
        build_submit_pdus_with_reference(number, text, options, 0x42).unwrap()
    }

    #[test]
    fn test_single_part_gsm7() {
        let pdus = build("+15551234567", "hello", &SubmitOptions::new());
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].to_hex(), "0001000B915155214365F7000005E8329BFD06");
        assert_eq!(pdus[0].msg_start(), 1);
        assert_eq!(pdus[0].tpdu_len(), 18);
        assert_eq!(pdus[0].concat(), None);
    }

    #[test]
    fn test_smsc_validity_and_status() {
        let options = SubmitOptions::new()
            .with_smsc("+31624000000")
            .with_validity_minutes(1440)
            .with_status_report();
        let pdus = build("1234", "hello", &options);
        assert_eq!(
            pdus[0].to_hex(),
            "07911326040000F0310004812143 0000A705E8329BFD06".replace(' ', "")
        );
        assert_eq!(pdus[0].msg_start(), 8);
    }

    #[test]
    fn test_ucs2_single_part() {
        let pdus = build("1234", "Привет", &SubmitOptions::new());
        let bytes = pdus[0].as_bytes();
        // PID, DCS and UDL follow the 4 digit destination
        assert_eq!(&bytes[7..10], &[0x00, 0x08, 0x0C]);
        assert_eq!(&bytes[10..12], &[0x04, 0x1F]);
        assert_eq!(bytes.len(), 22);
    }

    #[test]
    fn test_gsm7_multipart() {
        let text = "a".repeat(161);
        let options = SubmitOptions::new().with_status_report();
        let pdus = build("1234", &text, &options);
        assert_eq!(pdus.len(), 2);

        let first = pdus[0].as_bytes();
        assert_eq!(first[1], 0x41);
        assert_eq!(&first[8..10], &[0x00, 160]);
        assert_eq!(&first[10..16], &[0x05, 0x00, 0x03, 0x42, 0x02, 0x01]);
        assert_eq!(first.len(), 16 + 134);

        let second = pdus[1].as_bytes();
        assert_eq!(second[1], 0x61);
        assert_eq!(second[9], 8 + 7);
        assert_eq!(&second[10..16], &[0x05, 0x00, 0x03, 0x42, 0x02, 0x02]);
        assert_eq!(
            pdus[1].concat(),
            Some(ConcatInfo {
                reference: 0x42,
                max: 2,
                sequence: 2
            })
        );
    }

    #[test]
    fn test_gsm7_part_count() {
        for (len, parts) in [(160, 1), (161, 2), (306, 2), (307, 3), (153 * 3 + 1, 4)] {
            let pdus = build("1234", &"x".repeat(len), &SubmitOptions::new());
            assert_eq!(pdus.len(), parts, "text of {len} septets");
        }
    }

    #[test]
    fn test_escape_never_split() {
        let text = format!("{}€{}", "a".repeat(152), "b".repeat(20));
        let pdus = build("1234", &text, &SubmitOptions::new());
        assert_eq!(pdus.len(), 2);
        assert_eq!(pdus[0].as_bytes()[9], 152 + 7);
        assert_eq!(pdus[1].as_bytes()[9], 22 + 7);
    }

    #[test]
    fn test_ucs2_multipart_uses_code_units() {
        let text = "П".repeat(71);
        let pdus = build("1234", &text, &SubmitOptions::new());
        assert_eq!(pdus.len(), 2);
        assert_eq!(pdus[0].as_bytes()[9], 140);
        assert_eq!(pdus[1].as_bytes()[9], 6 + 8);
    }

    #[test]
    fn test_ucs2_surrogate_pair_kept_together() {
        let text = format!("{}😀{}", "П".repeat(66), "П".repeat(10));
        let pdus = build("1234", &text, &SubmitOptions::new());
        assert_eq!(pdus[0].as_bytes()[9], 6 + 66 * 2);
        assert_eq!(pdus[1].as_bytes()[9], 6 + 12 * 2);
    }

    #[test]
    fn test_alphabet_chosen_for_whole_message() {
        let text = format!("{}ж", "a".repeat(200));
        let pdus = build("1234", &text, &SubmitOptions::new());
        assert!(pdus.iter().all(|p| p.as_bytes()[8] == 0x08));
        assert_eq!(pdus.len(), 3);
    }

    #[test]
    fn test_same_input_same_output() {
        let options = SubmitOptions::new().with_validity_minutes(30);
        let text = "z".repeat(400);
        assert_eq!(build("+4412", &text, &options), build("+4412", &text, &options));
    }

    #[test]
    fn test_random_reference_in_range() {
        let pdus = build_submit_pdus("1234", &"y".repeat(200), &SubmitOptions::new()).unwrap();
        let reference = pdus[0].concat().unwrap().reference;
        assert!((1..255).contains(&reference));
        assert!(pdus.iter().all(|p| p.concat().unwrap().reference == reference));
    }

    #[test]
    fn test_invalid_addresses() {
        assert_eq!(
            build_submit_pdus("555-1234", "hi", &SubmitOptions::new()),
            Err(PduError::InvalidAddress("555-1234".into()))
        );
        let options = SubmitOptions::new().with_smsc("smsc");
        assert!(matches!(
            build_submit_pdus("1234", "hi", &options),
            Err(PduError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_empty_text_rejected() {
        assert!(matches!(
            build_submit_pdus("1234", "", &SubmitOptions::new()),
            Err(PduError::EncodingFailure(_))
        ));
    }
}
