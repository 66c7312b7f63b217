// ABOUTME: Scripted in-memory command channel standing in for modem hardware in tests
// ABOUTME: Replies are queued per command; unknown commands stay silent until they time out

use super::serial::{CommandChannel, ResponseProcessor, ResponseStatus, UnsolicitedMatcher};
use crate::error::{SerialError, SerialResult};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Respond(Vec<u8>),
    Delayed(Duration, Vec<u8>),
    Silent,
    IoError,
}

impl Reply {
    pub(crate) fn text(text: &str) -> Self {
        Reply::Respond(text.as_bytes().to_vec())
    }

    pub(crate) fn ok() -> Self {
        Reply::text("\r\nOK\r\n")
    }

    /// `OK` arriving after `delay`
    pub(crate) fn ok_after(delay: Duration) -> Self {
        Reply::Delayed(delay, b"\r\nOK\r\n".to_vec())
    }

    pub(crate) fn error() -> Self {
        Reply::text("\r\nERROR\r\n")
    }
}

/// Last queued reply for a command repeats forever
#[derive(Default)]
pub(crate) struct ScriptedChannel {
    script: Mutex<HashMap<Vec<u8>, VecDeque<Reply>>>,
    sent: Mutex<Vec<String>>,
    subscribers: Mutex<Vec<(UnsolicitedMatcher, mpsc::UnboundedSender<String>)>>,
}

impl ScriptedChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for an AT command (carriage return added)
    pub(crate) fn on(self, command: &str, reply: Reply) -> Self {
        self.on_bytes(format!("{command}\r").into_bytes(), reply)
    }

    pub(crate) fn on_bytes(self, command: impl Into<Vec<u8>>, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(command.into())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, command: &str) -> usize {
        self.sent().iter().filter(|c| *c == command).count()
    }

    /// Delivers `line` as if the modem sent it unprompted; false when no
    /// live subscriber matched
    pub(crate) fn push_unsolicited(&self, line: &str) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(_, sender)| !sender.is_closed());
        subscribers
            .iter()
            .filter(|(matcher, _)| matcher(line))
            .fold(false, |delivered, (_, sender)| sender.send(line.to_string()).is_ok() || delivered)
    }

    fn next_reply(&self, command: &[u8]) -> Reply {
        let mut script = self.script.lock().unwrap();
        match script.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Silent),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Silent),
            None => Reply::Silent,
        }
    }
}

impl CommandChannel for ScriptedChannel {
    async fn send_command(
        &self,
        command: &[u8],
        timeout: Duration,
        processor: ResponseProcessor,
    ) -> SerialResult<Bytes> {
        let logged = String::from_utf8_lossy(command).trim_end_matches('\r').to_string();
        self.sent.lock().unwrap().push(logged);

        let reply = match self.next_reply(command) {
            Reply::Delayed(delay, bytes) if delay < timeout => {
                tokio::time::sleep(delay).await;
                Reply::Respond(bytes)
            }
            Reply::Delayed(..) => Reply::Silent,
            reply => reply,
        };
        match reply {
            Reply::Respond(bytes) => match processor(&bytes) {
                ResponseStatus::Complete => Ok(Bytes::from(bytes)),
                ResponseStatus::Failed => Err(SerialError::CommandFailed(
                    String::from_utf8_lossy(&bytes).trim().to_string(),
                )),
                ResponseStatus::Incomplete => {
                    tokio::time::sleep(timeout).await;
                    Err(SerialError::Timeout)
                }
            },
            Reply::Silent | Reply::Delayed(..) => {
                tokio::time::sleep(timeout).await;
                Err(SerialError::Timeout)
            }
            Reply::IoError => Err(SerialError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            ))),
        }
    }

    fn subscribe_unsolicited(&self, matcher: UnsolicitedMatcher) -> Option<mpsc::UnboundedReceiver<String>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push((matcher, sender));
        Some(receiver)
    }
}
