use crate::error::{ServerError, ServerResult};
use crate::http::{Exchange, Method, Request, Response, Status};
use crate::logger::Logger;
use crate::session::SessionStore;
use crate::trie::Params;
use serde::Serialize;
use std::fmt;

pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
pub const CONTENT_TYPE_JSONP: &str = "application/javascript; charset=utf-8";
pub const CONTENT_TYPE_XML: &str = "application/xml; charset=utf-8";

/// Standard document prolog for [`Context::xml`]
pub const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Per-request view over an [`Exchange`]
///
/// A context borrows its exchange for the duration of one request and is
/// dropped when the handler chain returns.
pub struct Context<'a> {
    exchange: &'a mut Exchange,
    params: Params,
    logger: Option<&'a dyn Logger>,
    sessions: Option<&'a dyn SessionStore>,
}

impl<'a> Context<'a> {
    pub fn new(exchange: &'a mut Exchange) -> Self {
        Self {
            exchange,
            params: Params::new(),
            logger: None,
            sessions: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_logger(mut self, logger: Option<&'a dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_sessions_store(mut self, sessions: Option<&'a dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn request(&self) -> &Request {
        &self.exchange.request
    }

    pub fn response(&self) -> &Response {
        &self.exchange.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.exchange.response
    }

    pub fn method(&self) -> Method {
        self.exchange.request.method
    }

    pub fn method_string(&self) -> String {
        self.method().as_str().to_string()
    }

    pub fn path(&self) -> &str {
        self.exchange.request.path()
    }

    pub fn path_string(&self) -> String {
        self.path().to_string()
    }

    pub fn host(&self) -> &str {
        self.exchange.request.host()
    }

    pub fn host_string(&self) -> String {
        self.host().to_string()
    }

    /// Value of a path parameter, or `""` when the route has none by that name
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).unwrap_or("")
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.exchange
            .request
            .query_params
            .get(name)
            .map(String::as_str)
    }

    /// Request header lookup, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.exchange.request.get_header(name).map(String::as_str)
    }

    /// True when `X-Requested-With` is `XMLHttpRequest`, ignoring case
    pub fn is_ajax(&self) -> bool {
        self.header("X-Requested-With")
            .map_or(false, |value| value.eq_ignore_ascii_case("XMLHttpRequest"))
    }

    pub fn logger(&self) -> Option<&'a dyn Logger> {
        self.logger
    }

    pub fn sessions_store(&self) -> Option<&'a dyn SessionStore> {
        self.sessions
    }

    pub fn set_status(&mut self, status: Status) {
        self.exchange.response.status = status;
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.exchange.response.set_header("Content-Type", content_type);
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.exchange.response.set_header(name, value);
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.exchange.response.add_header(name, value);
    }

    /// Append raw bytes to the response body
    pub fn write(&mut self, bytes: &[u8]) {
        self.exchange.response.body.extend_from_slice(bytes);
    }

    fn respond(&mut self, status: Status, content_type: &str, body: Vec<u8>) {
        let response = &mut self.exchange.response;
        response.status = status;
        response.set_header("Content-Type", content_type);
        response.body = body;
    }

    /// Write `body` verbatim as an HTML response
    pub fn html(&mut self, status: Status, body: &str) {
        self.respond(status, CONTENT_TYPE_HTML, body.as_bytes().to_vec());
    }

    /// Write `value` as JSON
    ///
    /// On failure the response is left untouched.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: Status, value: &T) -> ServerResult<()> {
        let body = encode_json(value)?;
        self.respond(status, CONTENT_TYPE_JSON, body);
        Ok(())
    }

    /// Write `value` as JSON wrapped in a call to `callback`
    pub fn jsonp<T: Serialize + ?Sized>(
        &mut self,
        status: Status,
        value: &T,
        callback: &str,
    ) -> ServerResult<()> {
        let json = encode_json(value)?;

        let mut body = Vec::with_capacity(callback.len() + json.len() + 2);
        body.extend_from_slice(callback.as_bytes());
        body.push(b'(');
        body.extend_from_slice(&json);
        body.push(b')');

        self.respond(status, CONTENT_TYPE_JSONP, body);
        Ok(())
    }

    /// Write `value` as XML, preceded by each of `headers` (e.g. [`XML_HEADER`])
    pub fn xml<T: Serialize + ?Sized>(
        &mut self,
        status: Status,
        value: &T,
        headers: &[&str],
    ) -> ServerResult<()> {
        let document =
            quick_xml::se::to_string(value).map_err(|err| ServerError::encoding("XML", err))?;

        let mut body = Vec::with_capacity(document.len());
        for header in headers {
            body.extend_from_slice(header.as_bytes());
        }
        body.extend_from_slice(document.as_bytes());

        self.respond(status, CONTENT_TYPE_XML, body);
        Ok(())
    }
}

fn encode_json<T: Serialize + ?Sized>(value: &T) -> ServerResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|err| ServerError::encoding("JSON", err))
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method())
            .field("path", &self.path())
            .field("params", &self.params)
            .field("logger", &self.logger.map(|_| "<logger>"))
            .field("sessions", &self.sessions.map(|_| "<sessions store>"))
            .finish()
    }
}
