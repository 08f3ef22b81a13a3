//! A POP3 mailbox retrieval and parsing library.
//!
//! The entry point is [`POP3Client`], which wraps a POP3 transport in a
//! connect/authenticate/operate/quit lifecycle, tracks which messages have
//! already been fetched by their server-assigned unique ids, and parses each
//! retrieved message into a structured header/body representation.
//!
//! ```no_run
//! use pop3_mailbox::{AccountConfig, POP3Client};
//!
//! # fn run() -> pop3_mailbox::errors::Result<()> {
//! let config = AccountConfig::new("user", "secret", "pop.example.org");
//! let inbox = POP3Client::session(config, |client| client.get_new_messages())?;
//! for (uid, message) in &inbox {
//!     println!("{}: {:?}", uid, message.header("Subject"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Callers wanting delta retrieval across process runs persist the set
//! returned by [`POP3Client::seen_unique_id`] themselves and seed the next
//! client through [`POP3Client::with_seen`].

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
extern crate base64;
extern crate encoding_rs;
extern crate md5;
extern crate openssl;
extern crate regex;
extern crate serde;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod errors {
    error_chain! {
        foreign_links {
            Io(::std::io::Error);
            SslStack(::openssl::error::ErrorStack);
            SslHandshake(::openssl::ssl::HandshakeError<::std::net::TcpStream>);
            Utf8(::std::string::FromUtf8Error);
        }

        errors {
            // The server answered with -ERR, or its response could not be
            // understood at all.
            Protocol(reason: String) {
                description("server returned an error response")
                display("server error: {}", reason)
            }
            // The connection has already been shut down by the time this
            // surfaces.
            Authentication(reason: String) {
                description("authentication failed")
                display("authentication failed: {}", reason)
            }
            // A UIDL line that is not "<message_number> <unique_id>".
            // Fails the whole listing.
            MalformedListing(line: String) {
                description("unparseable unique-id listing line")
                display("malformed listing line: {:?}", line)
            }
            // None of the ids in the failed batch have been recorded.
            PartialBatch(uid: String, retrieved: usize) {
                description("message batch retrieval failed partway")
                display("batch stopped at message {:?} after {} retrieved", uid, retrieved)
            }
            UnknownUid(uid: String) {
                description("unique id not present in mailbox")
                display("unknown unique id: {:?}", uid)
            }
            NotConnected {
                description("session is not connected")
                display("session is not connected")
            }
        }
    }
}

mod client;
mod decode;
mod message;
mod net;
mod observe;
mod stream;
mod tracker;
mod transport;
mod utils;

pub use client::POP3Client;
pub use message::{parse_message, BodyPart, ParsedMessage, PartData, MAIL_HEADER_NAMES};
pub use net::NetTransport;
pub use observe::{LoggedTransport, Summarize};
pub use tracker::UidTracker;
pub use transport::{Retrieved, Stat, Transport};

/// Standard POP3 port for plaintext connections.
pub const POP3_PORT: u16 = 110;
/// Standard POP3 port for TLS connections.
pub const POP3_SSL_PORT: u16 = 995;

/// How the client proves its identity during `connect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    /// USER followed by PASS.
    Plain,
    /// Single APOP digest handshake using the greeting timestamp.
    Apop,
    /// RPOP followed by PASS.
    Rpop,
}

impl Default for AuthMethod {
    fn default() -> AuthMethod {
        AuthMethod::Plain
    }
}

fn default_use_ssl() -> bool {
    true
}

/// Everything needed to open and authenticate one mailbox session.
///
/// Immutable once a session has been constructed from it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    /// Overrides the protocol-standard port derived from `use_ssl`.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
    #[serde(default)]
    pub auth: AuthMethod,
    /// Opaque transport-constructor parameters. The client passes these
    /// through unexamined; `NetTransport` understands `timeout` (seconds).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl AccountConfig {
    /// A TLS, plain-password config on the standard port.
    pub fn new(user: &str, password: &str, host: &str) -> AccountConfig {
        AccountConfig {
            user: user.to_string(),
            password: password.to_string(),
            host: host.to_string(),
            port: None,
            use_ssl: true,
            auth: AuthMethod::Plain,
            options: BTreeMap::new(),
        }
    }

    /// The configured port, or the protocol-standard one for the
    /// configured transport security.
    pub fn effective_port(&self) -> u16 {
        self.port
            .unwrap_or(if self.use_ssl { POP3_SSL_PORT } else { POP3_PORT })
    }

    /// Log target identifying this mailbox in instrumentation output.
    pub fn log_target(&self) -> String {
        format!("pop3::{}@{}", self.user, self.host)
    }
}
