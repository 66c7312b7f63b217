// ABOUTME: Reassembly of concatenated SMS-DELIVER parts into complete messages
// ABOUTME: Buffers parts per sender and reference until every sequence number has arrived

use super::deliver::SmsMessage;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug)]
struct PendingMessage {
    max: u8,
    parts: BTreeMap<u8, SmsMessage>,
}

/// Collects concatenated message parts
///
/// Parts are keyed by sender and concatenation reference. Single-part
/// messages pass straight through.
#[derive(Debug, Default)]
pub struct SmsAssembler {
    pending: HashMap<(String, u16), PendingMessage>,
}

impl SmsAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a part, returning the combined message once it is complete
    pub fn push(&mut self, message: SmsMessage) -> Option<SmsMessage> {
        let Some(concat) = message.concat else {
            return Some(message);
        };
        let key = (message.sender.number.clone(), concat.reference);
        if concat.sequence == 0 || concat.sequence > concat.max {
            warn!(
                "dropping part {}/{} of reference {} from {}: sequence out of range",
                concat.sequence, concat.max, concat.reference, key.0
            );
            return None;
        }
        let pending = self.pending.entry(key.clone()).or_insert_with(|| PendingMessage {
            max: concat.max,
            parts: BTreeMap::new(),
        });
        // the first part seen fixes the part count
        if concat.max != pending.max {
            warn!(
                "dropping part {}/{} of reference {} from {}: expected {} parts",
                concat.sequence, concat.max, concat.reference, key.0, pending.max
            );
            return None;
        }
        if pending.parts.contains_key(&concat.sequence) {
            debug!(
                "duplicate part {}/{} of reference {} from {}",
                concat.sequence, concat.max, concat.reference, key.0
            );
            return None;
        }
        pending.parts.insert(concat.sequence, message);
        if pending.parts.len() < usize::from(pending.max) {
            return None;
        }

        let complete = self.pending.remove(&key)?;
        let mut parts = complete.parts.into_values();
        let mut combined = parts.next()?;
        for part in parts {
            combined.text.push_str(&part.text);
            combined.data.extend_from_slice(&part.data);
        }
        combined.concat = None;
        Some(combined)
    }

    /// Number of messages still waiting for parts
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
