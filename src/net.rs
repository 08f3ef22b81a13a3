//! The line-oriented TCP/TLS transport.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::net::TcpStream;
use std::time::Duration;

use openssl::ssl::{SslConnector, SslMethod};
use regex::Regex;

use errors::*;
use stream::MailStream;
use transport::{Retrieved, Stat, Transport};
use utils;

lazy_static! {
    static ref RESPONSE: Regex = Regex::new(r"^(?P<status>\+OK|-ERR)(?: (?P<text>.*))?").unwrap();
    static ref TIMESTAMP: Regex = Regex::new(r"(<[^>]+>)").unwrap();
}

const LF: u8 = 0x0a;

/// A POP3 server connection over plain TCP or TLS.
///
/// Construction reads the server greeting and captures its APOP timestamp,
/// if the server announces one. The connection starts out unauthenticated;
/// the client drives the authentication exchange.
pub struct NetTransport {
    stream: MailStream,
    timestamp: Option<String>,
}

impl NetTransport {
    /// Dial `host:port` and read the greeting.
    ///
    /// `options` is the account's opaque option bag; the only key this
    /// transport interprets is `timeout`, a socket read/write timeout in
    /// seconds. Unknown keys are ignored.
    pub fn connect(
        host: &str,
        port: u16,
        use_ssl: bool,
        options: &BTreeMap<String, String>,
    ) -> Result<NetTransport> {
        trace!("Initiate POP3 connection to {}:{}", host, port);
        let tcp = TcpStream::connect((host, port))?;
        if let Some(timeout) = options.get("timeout").and_then(|s| s.parse::<u64>().ok()) {
            let timeout = Some(Duration::from_secs(timeout));
            tcp.set_read_timeout(timeout)?;
            tcp.set_write_timeout(timeout)?;
        }
        let stream = if use_ssl {
            debug!("Creating a TLS connection");
            let connector = SslConnector::builder(SslMethod::tls())?.build();
            MailStream::Ssl(BufReader::new(connector.connect(host, tcp)?))
        } else {
            debug!("Creating a plain TCP connection");
            MailStream::Plain(BufReader::new(tcp))
        };
        let mut transport = NetTransport {
            stream: stream,
            timestamp: None,
        };
        transport.read_greeting()?;
        trace!("Connection established");
        Ok(transport)
    }

    /// The APOP timestamp announced in the greeting, if any.
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_ref().map(|t| &t[..])
    }

    fn read_greeting(&mut self) -> Result<()> {
        trace!("Reading greeting from server");
        let greeting = self.read_status_line()?;
        self.timestamp = TIMESTAMP.captures(&greeting).map(|cap| cap[1].to_string());
        Ok(())
    }

    /// One response line with its terminator stripped.
    fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut buff = Vec::new();
        let n = self.stream.read_until(LF, &mut buff)?;
        if n == 0 {
            return Err(ErrorKind::Protocol("connection closed by server".to_string()).into());
        }
        if buff.last() == Some(&LF) {
            buff.pop();
            if buff.last() == Some(&b'\r') {
                buff.pop();
            }
        }
        Ok(buff)
    }

    /// Read and classify a status line. `+OK` resolves to the status text,
    /// `-ERR` becomes a protocol error.
    fn read_status_line(&mut self) -> Result<String> {
        let line = String::from_utf8(self.read_line()?)?;
        debug!("S: {}", line);
        let groups = RESPONSE
            .captures(&line)
            .ok_or_else(|| Error::from(ErrorKind::Protocol(format!("unparseable response: {:?}", line))))?;
        let text = groups
            .name("text")
            .map(|text| text.as_str().to_string())
            .unwrap_or_default();
        match &groups["status"] {
            "+OK" => Ok(text),
            _ => Err(ErrorKind::Protocol(text).into()),
        }
    }

    fn command(&mut self, command: &str, param: Option<&str>) -> Result<String> {
        let line = match param {
            Some(param) => format!("{} {}", command, param),
            None => command.to_string(),
        };
        if command == "PASS" {
            debug!("C: PASS ****");
        } else {
            debug!("C: {}", line);
        }
        self.stream.write_command(&line)?;
        self.read_status_line()
    }

    /// A command whose `+OK` is followed by data lines up to a lone `.`.
    fn command_multiline(
        &mut self,
        command: &str,
        param: Option<&str>,
    ) -> Result<(String, Vec<Vec<u8>>)> {
        let status = self.command(command, param)?;
        let mut lines = Vec::new();
        loop {
            let mut line = self.read_line()?;
            if line.as_slice() == b"." {
                break;
            }
            // Undo the byte-stuffing applied to lines starting with a dot.
            if line.starts_with(b"..") {
                line.remove(0);
            }
            lines.push(line);
        }
        Ok((status, lines))
    }

    fn command_lines(&mut self, command: &str, param: Option<&str>) -> Result<Vec<String>> {
        let (_, raw) = self.command_multiline(command, param)?;
        raw.into_iter()
            .map(|line| String::from_utf8(line).map_err(Error::from))
            .collect()
    }
}

impl Transport for NetTransport {
    fn user(&mut self, user: &str) -> Result<String> {
        self.command("USER", Some(user))
    }

    fn pass(&mut self, password: &str) -> Result<String> {
        self.command("PASS", Some(password))
    }

    fn apop(&mut self, user: &str, password: &str) -> Result<String> {
        let timestamp = match self.timestamp {
            Some(ref timestamp) => timestamp.clone(),
            None => {
                return Err(ErrorKind::Authentication(
                    "server greeting carries no APOP timestamp".to_string(),
                ).into())
            }
        };
        let digest = utils::apop_digest(&timestamp, password);
        self.command("APOP", Some(&format!("{} {}", user, digest)))
    }

    fn rpop(&mut self, user: &str) -> Result<String> {
        self.command("RPOP", Some(user))
    }

    fn stat(&mut self) -> Result<Stat> {
        let status = self.command("STAT", None)?;
        Stat::parse(&status)
    }

    fn uidl(&mut self) -> Result<Vec<String>> {
        self.command_lines("UIDL", None)
    }

    fn retr(&mut self, msg_no: u32) -> Result<Retrieved> {
        let (status, lines) = self.command_multiline("RETR", Some(&msg_no.to_string()))?;
        Ok(Retrieved {
            status: status,
            lines: lines,
        })
    }

    fn dele(&mut self, msg_no: u32) -> Result<String> {
        self.command("DELE", Some(&msg_no.to_string()))
    }

    fn rset(&mut self) -> Result<String> {
        self.command("RSET", None)
    }

    fn noop(&mut self) -> Result<String> {
        self.command("NOOP", None)
    }

    fn capa(&mut self) -> Result<Vec<String>> {
        self.command_lines("CAPA", None)
    }

    fn quit(&mut self) -> Result<String> {
        self.command("QUIT", None)
    }
}
