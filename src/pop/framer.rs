//! Turns the inbound POP byte stream into discrete responses.
//!
//! The framer owns one growing byte buffer and a FIFO queue of
//! [`Expectation`]s. Every time bytes arrive or an expectation is queued it
//! resolves the head of the queue for as long as a complete response is
//! buffered, so one TCP chunk carrying several replies resolves all of them.
//! Responses are only ever matched against the oldest expectation.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::Error;

const CRLF: &[u8] = b"\r\n";
const TERMINATOR: &[u8] = b"\r\n.\r\n";
const OK: &str = "+OK";

/// A resolved server reply: the status line and, for multi-line replies,
/// the dot-unstuffed body without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub line: String,
    pub body: Option<String>,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.line.starts_with(OK)
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

/// Why the stream stopped producing responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    Closed,
    TimedOut(Duration),
    Io(io::ErrorKind, String),
}

impl From<StreamFailure> for Error {
    fn from(failure: StreamFailure) -> Self {
        match failure {
            StreamFailure::Closed => Error::StreamClosed,
            StreamFailure::TimedOut(idle) => Error::Timeout(idle),
            StreamFailure::Io(kind, msg) => Error::Io(io::Error::new(kind, msg)),
        }
    }
}

pub type Reply = Result<Response, StreamFailure>;

/// An in-flight command's awaited response shape.
#[derive(Debug)]
pub struct Expectation {
    multiline: bool,
    reply: oneshot::Sender<Reply>,
}

impl Expectation {
    pub fn new(multiline: bool) -> (Self, oneshot::Receiver<Reply>) {
        let (reply, rx) = oneshot::channel();
        (Expectation { multiline, reply }, rx)
    }

    pub fn reject(self, failure: StreamFailure) {
        // The waiter may have given up already; nothing to report then.
        let _ = self.reply.send(Err(failure));
    }

    fn resolve(self, response: Response) {
        let _ = self.reply.send(Ok(response));
    }
}

#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
    pending: VecDeque<Expectation>,
    /// Where the terminator search for the head expectation resumes.
    scan_from: usize,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an expectation and resolve whatever is already buffered.
    pub fn push(&mut self, expectation: Expectation) {
        self.pending.push_back(expectation);
        self.drain();
    }

    /// Append an inbound chunk and resolve every response it completes.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.drain();
    }

    /// Reject every queued expectation, oldest first.
    pub fn fail_all(&mut self, failure: StreamFailure) {
        self.scan_from = 0;
        while let Some(expectation) = self.pending.pop_front() {
            expectation.reject(failure.clone());
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn drain(&mut self) {
        while let Some(multiline) = self.pending.front().map(|head| head.multiline) {
            let Some(response) = self.take_frame(multiline) else {
                break;
            };
            if let Some(expectation) = self.pending.pop_front() {
                expectation.resolve(response);
            }
        }
    }

    /// Cut one complete response off the head of the buffer, if present.
    fn take_frame(&mut self, multiline: bool) -> Option<Response> {
        let line_end = find(&self.buffer, CRLF, 0)?;
        let line = String::from_utf8_lossy(&self.buffer[..line_end]).into_owned();

        // A negative reply never carries a body, even to a multi-line command.
        if !multiline || !line.starts_with(OK) {
            self.consume(line_end + CRLF.len());
            return Some(Response { line, body: None });
        }

        let start = self.scan_from.max(line_end);
        let Some(end) = find(&self.buffer, TERMINATOR, start) else {
            self.scan_from = self
                .buffer
                .len()
                .saturating_sub(TERMINATOR.len() - 1)
                .max(line_end);
            return None;
        };
        let body = if end == line_end {
            String::new()
        } else {
            unstuff(&String::from_utf8_lossy(&self.buffer[line_end + CRLF.len()..end]))
        };
        self.consume(end + TERMINATOR.len());
        Some(Response {
            line,
            body: Some(body),
        })
    }

    fn consume(&mut self, len: usize) {
        self.buffer.drain(..len);
        self.scan_from = 0;
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Undo byte-stuffing: a body line starting with `..` loses one dot.
pub fn unstuff(body: &str) -> String {
    body.split("\r\n")
        .map(|line| if line.starts_with("..") { &line[1..] } else { line })
        .collect::<Vec<_>>()
        .join("\r\n")
}
