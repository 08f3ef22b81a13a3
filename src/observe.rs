//! Uniform logging of every transport exchange.
//!
//! One wrapper type and one interception function cover the whole
//! primitive set; the per-operation formatting rules live in the
//! [`Summarize`] impls rather than in per-primitive logging code.

use errors::*;
use transport::{Retrieved, Stat, Transport};

/// Converts a raw transport result into a one-line summary for the log.
pub trait Summarize {
    fn summarize(&self) -> String;
}

/// Simple commands: the status text of the response line.
impl Summarize for String {
    fn summarize(&self) -> String {
        self.clone()
    }
}

/// Listing-style commands: the first data line.
impl Summarize for Vec<String> {
    fn summarize(&self) -> String {
        self.first().cloned().unwrap_or_else(|| "(no data)".to_string())
    }
}

impl Summarize for Stat {
    fn summarize(&self) -> String {
        format!(
            "message_count={}, mailbox_size={}",
            self.message_count, self.mailbox_size
        )
    }
}

/// Retrievals: the status line, never the message content.
impl Summarize for Retrieved {
    fn summarize(&self) -> String {
        self.status.clone()
    }
}

/// Transport wrapper that reports the outcome of every primitive to the
/// log, tagged with the operation name, then passes it through unchanged.
pub struct LoggedTransport<T> {
    inner: T,
    target: String,
}

impl<T> LoggedTransport<T> {
    /// Wrap `inner`, emitting log records under `target`.
    pub fn new(inner: T, target: String) -> LoggedTransport<T> {
        LoggedTransport {
            inner: inner,
            target: target,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn observe<R: Summarize>(&self, op: &str, outcome: Result<R>) -> Result<R> {
        match outcome {
            Ok(response) => {
                info!(target: self.target.as_str(), "{}: {}", op, response.summarize());
                Ok(response)
            }
            Err(err) => {
                match *err.kind() {
                    ErrorKind::Protocol(ref reason) => {
                        error!(target: self.target.as_str(), "{}: {}", op, reason);
                    }
                    _ => {
                        error!(target: self.target.as_str(), "{} failed: {:?}", op, err);
                    }
                }
                Err(err)
            }
        }
    }
}

impl<T: Transport> Transport for LoggedTransport<T> {
    fn user(&mut self, user: &str) -> Result<String> {
        let outcome = self.inner.user(user);
        self.observe("user", outcome)
    }

    fn pass(&mut self, password: &str) -> Result<String> {
        let outcome = self.inner.pass(password);
        self.observe("pass", outcome)
    }

    fn apop(&mut self, user: &str, password: &str) -> Result<String> {
        let outcome = self.inner.apop(user, password);
        self.observe("apop", outcome)
    }

    fn rpop(&mut self, user: &str) -> Result<String> {
        let outcome = self.inner.rpop(user);
        self.observe("rpop", outcome)
    }

    fn stat(&mut self) -> Result<Stat> {
        let outcome = self.inner.stat();
        self.observe("stat", outcome)
    }

    fn uidl(&mut self) -> Result<Vec<String>> {
        let outcome = self.inner.uidl();
        self.observe("uidl", outcome)
    }

    fn retr(&mut self, msg_no: u32) -> Result<Retrieved> {
        let outcome = self.inner.retr(msg_no);
        self.observe("retr", outcome)
    }

    fn dele(&mut self, msg_no: u32) -> Result<String> {
        let outcome = self.inner.dele(msg_no);
        self.observe("dele", outcome)
    }

    fn rset(&mut self) -> Result<String> {
        let outcome = self.inner.rset();
        self.observe("rset", outcome)
    }

    fn noop(&mut self) -> Result<String> {
        let outcome = self.inner.noop();
        self.observe("noop", outcome)
    }

    fn capa(&mut self) -> Result<Vec<String>> {
        let outcome = self.inner.capa();
        self.observe("capa", outcome)
    }

    fn quit(&mut self) -> Result<String> {
        let outcome = self.inner.quit();
        self.observe("quit", outcome)
    }
}
