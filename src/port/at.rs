// ABOUTME: AT command helpers: final-result recognition, response processors and response cleanup
// ABOUTME: Shared by port probing, the 3GPP registration commands and SMS submission

use super::serial::{CommandChannel, ResponseStatus};
use crate::error::SerialResult;
use std::time::Duration;

const SUCCESS_RESULTS: [&str; 2] = ["OK", "CONNECT"];
const ERROR_RESULTS: [&str; 8] = [
    "ERROR",
    "+CME ERROR",
    "+CMS ERROR",
    "NO CARRIER",
    "BUSY",
    "NO ANSWER",
    "NO DIALTONE",
    "COMMAND NOT SUPPORT",
];

/// Final result codes defined by V.250 and 27.007
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinalResult {
    Success,
    Error,
}

fn final_result(line: &str) -> Option<FinalResult> {
    if SUCCESS_RESULTS.iter().any(|r| line == *r || line.starts_with("CONNECT ")) {
        return Some(FinalResult::Success);
    }
    if ERROR_RESULTS.iter().any(|r| line.starts_with(r)) {
        return Some(FinalResult::Error);
    }
    None
}

/// Complete lines of a response, trimmed, empty lines skipped
fn complete_lines(buffer: &[u8]) -> impl Iterator<Item = &str> {
    let end = buffer
        .iter()
        .rposition(|b| *b == b'\r' || *b == b'\n')
        .map_or(0, |p| p + 1);
    buffer[..end]
        .split(|b| *b == b'\r' || *b == b'\n')
        .filter_map(|line| std::str::from_utf8(line).ok())
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

/// Processor for ordinary AT commands: `OK` succeeds, error codes fail
pub fn at_response(buffer: &[u8]) -> ResponseStatus {
    match complete_lines(buffer).find_map(final_result) {
        Some(FinalResult::Success) => ResponseStatus::Complete,
        Some(FinalResult::Error) => ResponseStatus::Failed,
        None => ResponseStatus::Incomplete,
    }
}

/// Processor for AT detection: any final result code proves AT firmware
pub fn at_probe_response(buffer: &[u8]) -> ResponseStatus {
    match complete_lines(buffer).find_map(final_result) {
        Some(_) => ResponseStatus::Complete,
        None => ResponseStatus::Incomplete,
    }
}

/// Processor waiting for the `> ` prompt of `AT+CMGS`
pub fn sms_prompt(buffer: &[u8]) -> ResponseStatus {
    if buffer.windows(2).any(|w| w == b"> ") {
        return ResponseStatus::Complete;
    }
    at_response(buffer)
}

/// Removes the echo, blank lines and the final result code
pub fn strip_response(response: &[u8], command: &str) -> String {
    let text = String::from_utf8_lossy(response);
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != command && final_result(line).is_none())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strips a `+TAG:` prefix from an information response
pub fn strip_tag<'a>(response: &'a str, tag: &str) -> &'a str {
    response
        .trim()
        .strip_prefix(tag)
        .map(|rest| rest.strip_prefix(':').unwrap_or(rest))
        .unwrap_or(response)
        .trim()
}

/// Sends `command` terminated by a carriage return and returns the
/// information text of the response
pub async fn at_command<C: CommandChannel>(
    channel: &C,
    command: &str,
    timeout: Duration,
) -> SerialResult<String> {
    let raw = format!("{command}\r");
    let response = channel.send_command(raw.as_bytes(), timeout, at_response).await?;
    Ok(strip_response(&response, command))
}
