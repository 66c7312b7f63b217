// ABOUTME: SMS sending and reading over an AT port in PDU mode
// ABOUTME: Each SMS-SUBMIT part goes out as AT+CMGS=<tpdu_len>, then the hex PDU terminated by Ctrl-Z

use super::sink::ModemStatus;
use super::state::ModemState;
use crate::error::{ModemError, ModemResult};
use crate::port::at::{at_command, at_response, sms_prompt, strip_tag};
use crate::port::serial::CommandChannel;
use crate::sms::{SmsAssembler, SmsMessage, SubmitOptions, build_submit_pdus, parse_pdu};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const CTRL_Z: u8 = 0x1a;

/// Timeout for the network to accept one submitted part
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

fn parse_message_reference(response: &str) -> Option<u8> {
    response
        .lines()
        .find(|line| line.trim().starts_with("+CMGS"))
        .and_then(|line| strip_tag(line, "+CMGS").parse().ok())
}

/// SMS over the primary AT port of a modem
pub struct Messaging<C> {
    channel: C,
    status: Arc<ModemStatus>,
    command_timeout: Duration,
}

impl<C: CommandChannel> Messaging<C> {
    pub fn new(channel: C, status: Arc<ModemStatus>) -> Self {
        Self {
            channel,
            status,
            command_timeout: Duration::from_secs(3),
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    fn check_state(&self, operation: &'static str) -> ModemResult<()> {
        match self.status.state() {
            ModemState::Registered | ModemState::Connected => Ok(()),
            current => Err(ModemError::WrongState { current, operation }),
        }
    }

    /// Sends `text` to `number`, returning the message reference of each part
    ///
    /// A part the network accepted without reporting `+CMGS: <mr>` has no
    /// reference.
    pub async fn send(&self, number: &str, text: &str, options: &SubmitOptions) -> ModemResult<Vec<Option<u8>>> {
        self.check_state("send SMS")?;
        let pdus = build_submit_pdus(number, text, options)?;
        at_command(&self.channel, "AT+CMGF=0", self.command_timeout).await?;

        let mut references = Vec::with_capacity(pdus.len());
        for (index, pdu) in pdus.iter().enumerate() {
            let command = format!("AT+CMGS={}\r", pdu.tpdu_len());
            self.channel
                .send_command(command.as_bytes(), self.command_timeout, sms_prompt)
                .await?;

            let mut body = pdu.to_hex().into_bytes();
            body.push(CTRL_Z);
            let response = self.channel.send_command(&body, SUBMIT_TIMEOUT, at_response).await?;
            let response = String::from_utf8_lossy(&response);
            let reference = parse_message_reference(&response);
            match reference {
                Some(reference) => {
                    debug!("SMS part {}/{} sent, reference {}", index + 1, pdus.len(), reference)
                }
                None => warn!(
                    "SMS part {}/{} sent without a message reference: '{}'",
                    index + 1,
                    pdus.len(),
                    response.trim()
                ),
            }
            references.push(reference);
        }
        info!("SMS to {} sent in {} part(s)", number, pdus.len());
        Ok(references)
    }

    /// Reads every stored message, combining concatenated parts
    ///
    /// PDUs that fail to decode are logged and skipped. Parts whose
    /// siblings are missing are not returned.
    pub async fn list(&self) -> ModemResult<Vec<SmsMessage>> {
        self.check_state("list SMS")?;
        at_command(&self.channel, "AT+CMGF=0", self.command_timeout).await?;
        let response = at_command(&self.channel, "AT+CMGL=4", self.command_timeout).await?;

        let mut assembler = SmsAssembler::new();
        let mut messages = Vec::new();
        let mut lines = response.lines().map(str::trim);
        while let Some(line) = lines.next() {
            if !line.starts_with("+CMGL") {
                continue;
            }
            let Some(hex_pdu) = lines.next() else {
                break;
            };
            match parse_pdu(hex_pdu) {
                Ok(message) => messages.extend(assembler.push(message)),
                Err(err) => warn!("Couldn't decode stored SMS ({}): '{}'", line, err),
            }
        }
        if assembler.pending() > 0 {
            debug!("{} multipart message(s) incomplete", assembler.pending());
        }
        Ok(messages)
    }
}
