// ABOUTME: SMS PDU codec: SMS-DELIVER decoding, SMS-SUBMIT encoding and multipart handling
// ABOUTME: Pure functions over byte buffers with no shared state

pub mod address;
pub mod assembler;
pub mod charset;
pub mod data_coding;
pub mod deliver;
pub mod error;
pub mod submit;
pub mod timestamp;
pub mod udh;
pub mod validity;

pub use address::{AddressField, NumberingPlan, TypeOfNumber};
pub use assembler::SmsAssembler;
pub use data_coding::{DataCodingScheme, MessageClass, SmsEncoding};
pub use deliver::{SmsMessage, decode_deliver, parse_pdu};
pub use error::{PduError, PduResult};
pub use submit::{SmsPdu, SubmitOptions, build_submit_pdus};
pub use timestamp::SmsTimestamp;
pub use udh::ConcatInfo;
pub use validity::validity_to_relative;
