//! The seam between the client and the POP3 wire protocol.
//!
//! Everything the client needs from a mailbox is expressed as the finite
//! primitive set below. The crate ships one implementation,
//! `NetTransport`; tests drive the client through scripted stand-ins.

use regex::Regex;

use errors::*;

lazy_static! {
    static ref STAT_REGEX: Regex = Regex::new(r"(?P<nmsg>\d+) (?P<size>\d+)").unwrap();
}

/// Mailbox totals reported by STAT.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stat {
    pub message_count: u32,
    pub mailbox_size: u32,
}

impl Stat {
    pub fn parse(stat_line: &str) -> Result<Stat> {
        let cap = STAT_REGEX.captures(stat_line).ok_or_else(|| {
            Error::from(ErrorKind::Protocol(format!(
                "unparseable STAT response: {:?}",
                stat_line
            )))
        })?;
        let number = |name: &str| -> Result<u32> {
            cap.name(name).unwrap().as_str().parse().map_err(|_| {
                ErrorKind::Protocol(format!("STAT field out of range: {:?}", stat_line)).into()
            })
        };
        Ok(Stat {
            message_count: number("nmsg")?,
            mailbox_size: number("size")?,
        })
    }
}

/// One RETR response: the status line plus the raw message lines.
///
/// Message lines stay as bytes; mail bodies are under no obligation to be
/// valid UTF-8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Retrieved {
    pub status: String,
    pub lines: Vec<Vec<u8>>,
}

impl Retrieved {
    /// Rejoin the line sequence with the protocol's line terminator.
    pub fn into_message_bytes(self) -> Vec<u8> {
        self.lines.join(&b"\r\n"[..])
    }
}

/// The primitive operations a POP3 mailbox exposes.
///
/// All calls are blocking and strictly sequential; implementations are not
/// reentrant. Simple commands resolve to the status text of the `+OK`
/// line; multi-line commands resolve to their data lines. A `-ERR`
/// response surfaces as [`ErrorKind::Protocol`].
pub trait Transport {
    fn user(&mut self, user: &str) -> Result<String>;
    fn pass(&mut self, password: &str) -> Result<String>;
    /// Combined-credential APOP handshake.
    fn apop(&mut self, user: &str, password: &str) -> Result<String>;
    /// Remote-trust user announcement; PASS still follows.
    fn rpop(&mut self, user: &str) -> Result<String>;
    fn stat(&mut self) -> Result<Stat>;
    /// `"<message_number> <unique_id>"` lines, one per message.
    fn uidl(&mut self) -> Result<Vec<String>>;
    fn retr(&mut self, msg_no: u32) -> Result<Retrieved>;
    fn dele(&mut self, msg_no: u32) -> Result<String>;
    fn rset(&mut self) -> Result<String>;
    fn noop(&mut self) -> Result<String>;
    fn capa(&mut self) -> Result<Vec<String>>;
    fn quit(&mut self) -> Result<String>;
}
