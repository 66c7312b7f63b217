// ABOUTME: Serial command channel: one command in flight per port, FIFO queueing and per-command timeouts
// ABOUTME: A background reader splits unsolicited lines off to subscribers and feeds the rest to the waiting command

use crate::error::{SerialError, SerialResult};
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::io;
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Verdict of a response processor on the bytes received so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Keep reading
    Incomplete,
    /// The response is complete and successful
    Complete,
    /// The response is complete and reports an error
    Failed,
}

/// Classifies a raw response buffer
pub type ResponseProcessor = fn(&[u8]) -> ResponseStatus;

/// Decides whether a complete, trimmed line is an unsolicited report
pub type UnsolicitedMatcher = fn(&str) -> bool;

/// A byte-oriented command channel to a modem port
///
/// Implementations serialize commands: only one exchange is in flight at a
/// time and waiting callers are served in arrival order.
pub trait CommandChannel: Send + Sync {
    /// Sends `command` and waits for a response the processor accepts
    fn send_command(
        &self,
        command: &[u8],
        timeout: Duration,
        processor: ResponseProcessor,
    ) -> impl Future<Output = SerialResult<Bytes>> + Send;

    /// Diverts complete lines accepted by `matcher` into the returned receiver
    ///
    /// Diverted lines never reach a command response, whether they arrive
    /// between commands or in the middle of one. Dropping the receiver ends
    /// the subscription. Channels that can't deliver unsolicited lines
    /// return `None`.
    fn subscribe_unsolicited(&self, matcher: UnsolicitedMatcher) -> Option<mpsc::UnboundedReceiver<String>> {
        let _ = matcher;
        None
    }
}

impl<C: CommandChannel> CommandChannel for Arc<C> {
    fn send_command(
        &self,
        command: &[u8],
        timeout: Duration,
        processor: ResponseProcessor,
    ) -> impl Future<Output = SerialResult<Bytes>> + Send {
        (**self).send_command(command, timeout, processor)
    }

    fn subscribe_unsolicited(&self, matcher: UnsolicitedMatcher) -> Option<mpsc::UnboundedReceiver<String>> {
        (**self).subscribe_unsolicited(matcher)
    }
}

struct UnsolicitedHandler {
    matcher: UnsolicitedMatcher,
    sender: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Unsolicited {
    handlers: std::sync::Mutex<Vec<UnsolicitedHandler>>,
}

impl Unsolicited {
    fn handlers(&self) -> MutexGuard<'_, Vec<UnsolicitedHandler>> {
        self.handlers.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn subscribe(&self, matcher: UnsolicitedMatcher) -> mpsc::UnboundedReceiver<String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.handlers().push(UnsolicitedHandler { matcher, sender });
        receiver
    }

    /// Takes complete lines out of `pending`, hands unsolicited ones to
    /// their subscriber and returns everything else
    fn route(&self, name: &str, pending: &mut BytesMut) -> BytesMut {
        let mut handlers = self.handlers();
        handlers.retain(|handler| !handler.sender.is_closed());
        if handlers.is_empty() {
            return pending.split();
        }

        let mut response = BytesMut::new();
        while let Some(end) = pending.iter().position(|b| *b == b'\n') {
            let line = pending.split_to(end + 1);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            match handlers.iter().find(|h| !text.is_empty() && (h.matcher)(text)) {
                Some(handler) => {
                    debug!("({}) <-- unsolicited {:?}", name, text);
                    let _ = handler.sender.send(text.to_string());
                }
                None => response.extend_from_slice(&line),
            }
        }
        // a partial '+' line may still turn out to be unsolicited
        if !pending.trim_ascii_start().starts_with(b"+") {
            response.extend_from_slice(&pending.split());
        }
        response
    }
}

async fn read_loop<T>(
    name: String,
    mut reader: ReadHalf<T>,
    unsolicited: Arc<Unsolicited>,
    responses: mpsc::UnboundedSender<io::Result<Bytes>>,
) where
    T: AsyncRead,
{
    let mut pending = BytesMut::with_capacity(4 * 1024);
    loop {
        match reader.read_buf(&mut pending).await {
            Ok(0) => {
                debug!("({}) port closed", name);
                return;
            }
            Ok(_) => {}
            Err(err) => {
                let _ = responses.send(Err(err));
                return;
            }
        }
        let response = unsolicited.route(&name, &mut pending);
        if !response.is_empty() && responses.send(Ok(response.freeze())).is_err() {
            return;
        }
    }
}

struct PortIo<W> {
    writer: BufWriter<W>,
    responses: mpsc::UnboundedReceiver<io::Result<Bytes>>,
    buffer: BytesMut,
}

impl<W> PortIo<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Drops whatever an abandoned exchange left behind
    fn discard_stale(&mut self) {
        self.buffer.clear();
        while let Ok(stale) = self.responses.try_recv() {
            if let Ok(bytes) = stale {
                debug!("discarding stale response {:?}", String::from_utf8_lossy(&bytes));
            }
        }
    }

    async fn write_command(&mut self, command: &[u8], send_delay: Duration) -> SerialResult<()> {
        if send_delay.is_zero() {
            self.writer.write_all(command).await?;
            self.writer.flush().await?;
            return Ok(());
        }
        // slow firmware drops characters sent back to back
        for byte in command {
            self.writer.write_all(std::slice::from_ref(byte)).await?;
            self.writer.flush().await?;
            tokio::time::sleep(send_delay).await;
        }
        Ok(())
    }

    async fn read_response(&mut self, processor: ResponseProcessor) -> SerialResult<Bytes> {
        loop {
            match processor(&self.buffer) {
                ResponseStatus::Complete => return Ok(self.buffer.split().freeze()),
                ResponseStatus::Failed => {
                    let response = self.buffer.split();
                    return Err(SerialError::CommandFailed(
                        String::from_utf8_lossy(&response).trim().to_string(),
                    ));
                }
                ResponseStatus::Incomplete => {}
            }

            match self.responses.recv().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(err)) => return Err(err.into()),
                None => return Err(SerialError::PortClosed),
            }
        }
    }
}

/// A command channel over any async byte stream (tty, pty, socket)
///
/// The stream is read continuously by a background task, so unsolicited
/// reports are seen even while no command is pending.
pub struct SerialPort<T> {
    name: String,
    send_delay: Duration,
    io: Mutex<PortIo<WriteHalf<T>>>,
    unsolicited: Arc<Unsolicited>,
    reader: JoinHandle<()>,
}

impl<T> SerialPort<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps `stream` and starts its reader task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: impl Into<String>, stream: T) -> Self {
        let name = name.into();
        let (reader, writer) = tokio::io::split(stream);
        let (responses_tx, responses) = mpsc::unbounded_channel();
        let unsolicited = Arc::new(Unsolicited::default());
        let reader = tokio::spawn(read_loop(name.clone(), reader, unsolicited.clone(), responses_tx));
        Self {
            name,
            send_delay: Duration::ZERO,
            io: Mutex::new(PortIo {
                writer: BufWriter::new(writer),
                responses,
                buffer: BytesMut::with_capacity(4 * 1024),
            }),
            unsolicited,
            reader,
        }
    }

    /// Delay inserted after each written byte
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Drop for SerialPort<T> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl<T> CommandChannel for SerialPort<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send_command(
        &self,
        command: &[u8],
        timeout: Duration,
        processor: ResponseProcessor,
    ) -> SerialResult<Bytes> {
        // tokio's mutex is fair, so queued commands run in FIFO order
        let mut io = self.io.lock().await;
        io.discard_stale();

        debug!("({}) --> {:?}", self.name, String::from_utf8_lossy(command));
        let exchange = async {
            io.write_command(command, self.send_delay).await?;
            io.read_response(processor).await
        };
        let result = tokio::time::timeout(timeout, exchange).await;
        match result {
            Ok(Ok(response)) => {
                debug!("({}) <-- {:?}", self.name, String::from_utf8_lossy(&response));
                Ok(response)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!("({}) command timed out after {:?}", self.name, timeout);
                io.buffer.clear();
                Err(SerialError::Timeout)
            }
        }
    }

    fn subscribe_unsolicited(&self, matcher: UnsolicitedMatcher) -> Option<mpsc::UnboundedReceiver<String>> {
        Some(self.unsolicited.subscribe(matcher))
    }
}
