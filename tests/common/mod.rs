#![allow(dead_code)]

use gem_server::{Dispatcher, Server, ServerConfig};
use std::io::{self, Cursor, Read, Write};

/// An in-memory connection: reads from a fixed request, collects the response
pub struct ReadWriter {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
}

impl ReadWriter {
    pub fn new(request: &str) -> Self {
        Self {
            input: Cursor::new(request.as_bytes().to_vec()),
            output: Vec::new(),
        }
    }
}

impl Read for ReadWriter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for ReadWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A response read back from the wire
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn parse(bytes: &[u8]) -> Self {
        let split = bytes
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response has no header terminator");
        let head = std::str::from_utf8(&bytes[..split]).expect("response head is not UTF-8");
        let mut lines = head.split("\r\n");

        let status_line = lines.next().expect("missing status line");
        let status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("malformed status line");

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();

        Self {
            status,
            headers,
            body: bytes[split + 4..].to_vec(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).expect("body is not UTF-8")
    }
}

pub fn server(dispatcher: Dispatcher) -> Server {
    Server::new(ServerConfig::new(), move |exchange| dispatcher.serve(exchange))
}

/// Push one raw request through the server and parse what comes back
pub fn roundtrip(server: &Server, request: &str) -> RawResponse {
    let mut rw = ReadWriter::new(request);
    server.serve_conn(&mut rw).expect("serve_conn failed");
    RawResponse::parse(&rw.output)
}
