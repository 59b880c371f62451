use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::str::{self, FromStr};

/// HTTP Status Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Continue = 100,
    SwitchingProtocols = 101,

    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,

    MovedPermanently = 301,
    Found = 302,
    NotModified = 304,

    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    RequestTimeout = 408,
    PayloadTooLarge = 413,

    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
}

impl Status {
    /// Get the numeric status code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the text description for this status code
    pub fn as_str(&self) -> &'static str {
        match *self {
            Status::Continue => "Continue",
            Status::SwitchingProtocols => "Switching Protocols",

            Status::Ok => "OK",
            Status::Created => "Created",
            Status::Accepted => "Accepted",
            Status::NoContent => "No Content",

            Status::MovedPermanently => "Moved Permanently",
            Status::Found => "Found",
            Status::NotModified => "Not Modified",

            Status::BadRequest => "Bad Request",
            Status::Unauthorized => "Unauthorized",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::RequestTimeout => "Request Timeout",
            Status::PayloadTooLarge => "Payload Too Large",

            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
            Status::BadGateway => "Bad Gateway",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// HTTP Methods
///
/// The declaration order is the order used when listing methods, e.g. in an
/// `Allow` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Trace,
    Connect,
}

impl Method {
    /// Every method, in listing order
    pub const ALL: [Method; 9] = [
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Options,
        Method::Trace,
        Method::Connect,
    ];

    /// Convert the method to a string
    pub fn as_str(&self) -> &'static str {
        match *self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

impl FromStr for Method {
    type Err = ServerError;

    fn from_str(s: &str) -> ServerResult<Self> {
        Method::ALL
            .iter()
            .copied()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| ServerError::HttpParse(format!("Invalid method: {}", s)))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, multi-valued header list with case-insensitive names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Every value stored under `name`, in insertion order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace all values of `name` with a single value
    pub fn set(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Append a value, keeping existing ones
    pub fn add(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// HTTP Parser State
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpParserState {
    RequestLine,
    Headers,
    Body,
    Complete,
}

/// Incremental HTTP/1.1 request parser
///
/// Chunks are accumulated until the header block is complete, then the body
/// is collected up to `Content-Length` bytes.
pub struct HttpParser {
    pub state: HttpParserState,
    pub method: Option<Method>,
    pub uri: Option<String>,
    pub version: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_length: usize,
    pending: Vec<u8>,
}

impl HttpParser {
    /// Create a new HTTP parser
    pub fn new() -> Self {
        Self {
            state: HttpParserState::RequestLine,
            method: None,
            uri: None,
            version: None,
            headers: HashMap::new(),
            body: Vec::new(),
            content_length: 0,
            pending: Vec::new(),
        }
    }

    /// Parse a chunk of data
    pub fn parse(&mut self, data: &[u8]) -> ServerResult<()> {
        if self.state == HttpParserState::Complete {
            self.reset();
        }

        if self.state == HttpParserState::Body {
            self.append_body(data);
            return Ok(());
        }

        self.pending.extend_from_slice(data);
        let headers_end = match find_subsequence(&self.pending, b"\r\n\r\n") {
            Some(end) => end,
            None => return Ok(()),
        };

        let head = str::from_utf8(&self.pending[..headers_end])
            .map_err(|_| ServerError::HttpParse("Invalid UTF-8".to_string()))?
            .to_string();
        let mut lines = head.split("\r\n");

        self.parse_request_line(lines.next().unwrap_or(""))?;
        self.state = HttpParserState::Headers;

        for line in lines.filter(|line| !line.is_empty()) {
            self.parse_header(line)?;
        }

        self.content_length = match self.headers.get("content-length") {
            Some(value) => value.trim().parse().map_err(|_| {
                ServerError::HttpParse(format!("Invalid Content-Length: {}", value))
            })?,
            None => 0,
        };

        // +4 for \r\n\r\n
        let rest = self.pending.split_off(headers_end + 4);
        self.pending.clear();
        self.state = HttpParserState::Body;
        self.append_body(&rest);

        Ok(())
    }

    fn append_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
        if self.body.len() >= self.content_length {
            self.body.truncate(self.content_length);
            self.state = HttpParserState::Complete;
        }
    }

    /// Parse a request line
    fn parse_request_line(&mut self, line: &str) -> ServerResult<()> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ServerError::HttpParse("Invalid request line".to_string()));
        }

        self.method = Some(parts[0].parse()?);
        self.uri = Some(parts[1].to_string());
        self.version = Some(parts[2].to_string());

        Ok(())
    }

    /// Parse a header line
    fn parse_header(&mut self, line: &str) -> ServerResult<()> {
        match line.split_once(':') {
            Some((key, value)) => {
                self.headers
                    .insert(key.trim().to_lowercase(), value.trim().to_string());
                Ok(())
            }
            None => Err(ServerError::HttpParse("Invalid header".to_string())),
        }
    }

    /// Check if the parser has completed parsing a request
    pub fn is_complete(&self) -> bool {
        self.state == HttpParserState::Complete
    }

    /// Number of bytes held for the request being parsed
    pub fn buffered_len(&self) -> usize {
        self.pending.len() + self.body.len()
    }

    /// Reset the parser for a new request
    pub fn reset(&mut self) {
        self.state = HttpParserState::RequestLine;
        self.method = None;
        self.uri = None;
        self.version = None;
        self.headers.clear();
        self.body.clear();
        self.content_length = 0;
        self.pending.clear();
    }

    /// Get the parsed request
    pub fn get_request(&self) -> ServerResult<Request> {
        if !self.is_complete() {
            return Err(ServerError::HttpParse("Request not complete".to_string()));
        }

        let method = self
            .method
            .ok_or_else(|| ServerError::HttpParse("Method not set".to_string()))?;

        let uri = self
            .uri
            .as_deref()
            .ok_or_else(|| ServerError::HttpParse("URI not set".to_string()))?;

        let mut request = Request::new(method, uri);
        request.headers = self.headers.clone();
        request.body = self.body.clone();
        Ok(request)
    }
}

impl Default for HttpParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// HTTP Request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    /// Header names are stored lowercase
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Query parameters parsed from the URI
    pub query_params: HashMap<String, String>,
    path: String,
    authority: Option<String>,
}

impl Request {
    /// Create a new request
    ///
    /// `uri` may be in origin form (`/a?b=c`) or absolute form
    /// (`http://host/a?b=c`).
    pub fn new(method: Method, uri: &str) -> Self {
        let (authority, target) = split_absolute_form(uri);

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        let mut query_params = HashMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|pair| !pair.is_empty()) {
                match pair.split_once('=') {
                    Some((key, value)) => query_params.insert(key.to_string(), value.to_string()),
                    None => query_params.insert(pair.to_string(), String::new()),
                };
            }
        }

        Self {
            method,
            uri: uri.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
            query_params,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            authority: authority.map(str::to_string),
        }
    }

    /// The request path, without query string
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The request host: the absolute-form authority, else the `Host` header
    pub fn host(&self) -> &str {
        self.authority
            .as_deref()
            .or_else(|| self.get_header("host").map(String::as_str))
            .unwrap_or("")
    }

    /// Set a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_lowercase(), value.to_string());
    }

    /// Get a header
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers.get(&name.to_lowercase())
    }

    /// Set the body
    pub fn set_body(&mut self, body: &[u8]) {
        self.body = body.to_vec();
        self.set_header("Content-Length", &self.body.len().to_string());
    }
}

fn split_absolute_form(uri: &str) -> (Option<&str>, &str) {
    let rest = match uri
        .strip_prefix("http://")
        .or_else(|| uri.strip_prefix("https://"))
    {
        Some(rest) => rest,
        None => return (None, uri),
    };

    match rest.find('/') {
        Some(slash) => (Some(&rest[..slash]), &rest[slash..]),
        None => (Some(rest), "/"),
    }
}

/// HTTP Response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: Status,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    /// Create a new response
    pub fn new(status: Status) -> Self {
        let mut headers = Headers::new();
        headers.set("Server", concat!("gem-server/", env!("CARGO_PKG_VERSION")));

        Self {
            status,
            headers,
            body: Vec::new(),
        }
    }

    /// Set a header, replacing existing values
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.set(name, value);
    }

    /// Append a header value
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.add(name, value);
    }

    /// Get the first value of a header
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Set the body; `Content-Length` is computed on serialization
    pub fn set_body(&mut self, body: &[u8]) {
        self.body = body.to_vec();
    }

    /// Drop the body, keeping status and headers
    pub fn reset_body(&mut self) {
        self.body.clear();
    }

    /// Serialize the response to a byte vector
    pub fn serialize(&self, writer: &mut Vec<u8>) -> ServerResult<()> {
        write!(writer, "HTTP/1.1 {} {}\r\n", self.status.code(), self.status.as_str())?;

        for (name, value) in self
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("Content-Length"))
        {
            write!(writer, "{}: {}\r\n", name, value)?;
        }
        write!(writer, "Content-Length: {}\r\n", self.body.len())?;

        write!(writer, "\r\n")?;
        writer.extend_from_slice(&self.body);

        Ok(())
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(Status::Ok)
    }
}

/// The request/response pair of one HTTP exchange
///
/// Built by the transport for each request and handed to the dispatcher;
/// the transport writes `response` back once the handler chain returns.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: Request,
    pub response: Response,
}

impl Exchange {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::default(),
        }
    }
}
