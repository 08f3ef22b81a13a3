use openssl::ssl::SslStream;
use std::io::{BufRead, BufReader, Error, Write};
use std::net::TcpStream;

/// A buffered line-oriented POP3 connection, plain TCP or TLS.
pub enum MailStream {
    Plain(BufReader<TcpStream>),
    Ssl(BufReader<SslStream<TcpStream>>),
}

impl MailStream {
    pub fn read_until(&mut self, byte: u8, buf: &mut Vec<u8>) -> Result<usize, Error> {
        match *self {
            MailStream::Plain(ref mut stream) => stream.read_until(byte, buf),
            MailStream::Ssl(ref mut stream) => stream.read_until(byte, buf),
        }
    }

    /// Send one command line, CRLF-terminated.
    pub fn write_command(&mut self, line: &str) -> Result<(), Error> {
        let data = format!("{}\r\n", line);
        match *self {
            MailStream::Plain(ref mut stream) => stream.get_mut().write_all(data.as_bytes()),
            MailStream::Ssl(ref mut stream) => stream.get_mut().write_all(data.as_bytes()),
        }
    }
}
