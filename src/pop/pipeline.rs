//! One-command-at-a-time request/response over a POP socket.
//!
//! The socket is split in two. A background reader task owns the read half
//! and the [`Framer`]; it receives expectations over a channel and feeds it
//! every inbound chunk. The pipeline owns the write half: each command queues
//! its expectation first, then writes, then awaits the reply. Callers await
//! each command before sending the next, so at most one is ever in flight.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use super::framer::{Expectation, Framer, Reply, Response, StreamFailure};
use crate::error::{Error, Result};

const READ_CHUNK: usize = 8 * 1024;

pub struct CommandPipeline<S> {
    writer: WriteHalf<S>,
    expectations: mpsc::UnboundedSender<Expectation>,
    reader: JoinHandle<()>,
    idle_timeout: Duration,
}

impl<S> CommandPipeline<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, idle_timeout: Duration) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        let (expectations, queue) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(read_half, queue, idle_timeout));
        Self {
            writer,
            expectations,
            reader,
            idle_timeout,
        }
    }

    /// Await the next single-line response without sending anything.
    ///
    /// Used for the unsolicited greeting.
    pub async fn read_line(&mut self) -> Result<Response> {
        let reply = self.expect(false)?;
        wait(reply).await
    }

    /// Write `command` and await its response.
    ///
    /// Fails with [`Error::Command`] when the status line is not `+OK`.
    pub async fn send_command(&mut self, command: &str, multiline: bool) -> Result<Response> {
        let shown = redact(command);
        debug!("C: {}", shown);

        let reply = self.expect(multiline)?;
        let wire = format!("{}\r\n", command);
        match timeout(self.idle_timeout, self.writer.write_all(wire.as_bytes())).await {
            Err(_) => return Err(Error::Timeout(self.idle_timeout)),
            Ok(result) => result?,
        }
        self.writer.flush().await?;

        let response = wait(reply).await?;
        debug!("S: {}", response.line);
        if !response.is_ok() {
            return Err(Error::Command {
                command: shown,
                line: response.line,
            });
        }
        Ok(response)
    }

    /// Shut the write side down and stop the reader. Safe to call more than once.
    pub async fn close(&mut self) {
        let _ = timeout(self.idle_timeout, self.writer.shutdown()).await;
        self.reader.abort();
    }

    fn expect(&self, multiline: bool) -> Result<oneshot::Receiver<Reply>> {
        let (expectation, reply) = Expectation::new(multiline);
        self.expectations
            .send(expectation)
            .map_err(|_| Error::StreamClosed)?;
        Ok(reply)
    }
}

impl<S> Drop for CommandPipeline<S> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn wait(reply: oneshot::Receiver<Reply>) -> Result<Response> {
    match reply.await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(failure)) => Err(failure.into()),
        // Reader task gone without answering.
        Err(_) => Err(Error::StreamClosed),
    }
}

/// Hide the secret in `PASS` commands before they reach logs or errors.
fn redact(command: &str) -> String {
    if command.len() >= 5 && command[..5].eq_ignore_ascii_case("PASS ") {
        "PASS ****".to_string()
    } else {
        command.to_string()
    }
}

async fn read_loop<S>(
    mut reader: ReadHalf<S>,
    mut queue: mpsc::UnboundedReceiver<Expectation>,
    idle_timeout: Duration,
) where
    S: AsyncRead + Send,
{
    let mut framer = Framer::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    let failure = loop {
        tokio::select! {
            // Queued expectations are taken first so a reply that arrives
            // together with EOF still finds its waiter.
            biased;
            next = queue.recv() => match next {
                Some(expectation) => framer.push(expectation),
                None => return,
            },
            read = timeout(idle_timeout, reader.read(&mut chunk)) => match read {
                Err(_) => break StreamFailure::TimedOut(idle_timeout),
                Ok(Ok(0)) => break StreamFailure::Closed,
                Ok(Ok(n)) => framer.feed(&chunk[..n]),
                Ok(Err(e)) => break StreamFailure::Io(e.kind(), e.to_string()),
            },
        }
    };

    debug!("POP stream ended: {:?}", failure);
    framer.fail_all(failure.clone());
    queue.close();
    while let Some(expectation) = queue.recv().await {
        expectation.reject(failure.clone());
    }
}
