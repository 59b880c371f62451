//! Blocking HTTP/1.1 transport in front of a [`Dispatcher`](crate::router::Dispatcher).
//!
//! One request is served per connection. Accepted streams are handed to a
//! fixed pool of worker threads over a bounded channel.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::http::{Exchange, HttpParser, Response, Status};
use crossbeam::channel;
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;

const READ_CHUNK_SIZE: usize = 8 * 1024;

pub type ExchangeHandler = Arc<dyn Fn(&mut Exchange) + Send + Sync>;

pub struct Server {
    config: ServerConfig,
    handler: ExchangeHandler,
}

impl Server {
    pub fn new<F>(config: ServerConfig, handler: F) -> Self
    where
        F: Fn(&mut Exchange) + Send + Sync + 'static,
    {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Read one request from `stream`, run the handler and write the response
    ///
    /// Malformed requests get a 400, oversized ones a 413 and a read timeout
    /// a 408; the handler never sees them. A peer that closes before sending
    /// anything gets no response.
    pub fn serve_conn<S: Read + Write>(&self, stream: &mut S) -> ServerResult<()> {
        let mut parser = HttpParser::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        while !parser.is_complete() {
            let n = match stream.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    log::debug!("read timed out");
                    return write_error(stream, Status::RequestTimeout, "Request Timeout");
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                if parser.buffered_len() == 0 {
                    return Ok(());
                }
                return write_error(stream, Status::BadRequest, "Incomplete request");
            }

            if let Err(e) = parser.parse(&chunk[..n]) {
                log::debug!("rejecting request: {}", e);
                return write_error(stream, Status::BadRequest, "Bad Request");
            }

            if parser.content_length > self.config.max_request_size
                || parser.buffered_len() > self.config.max_request_size
            {
                return write_error(stream, Status::PayloadTooLarge, "Payload Too Large");
            }
        }

        let mut exchange = Exchange::new(parser.get_request()?);
        (self.handler)(&mut exchange);

        exchange.response.set_header("Connection", "close");
        write_response(stream, &exchange.response)
    }

    /// Bind the configured address and serve until the process exits
    pub fn listen_and_serve(&self) -> ServerResult<()> {
        let address = self.config.socket_address();
        let addr = address.to_socket_addrs()?.next().ok_or_else(|| {
            ServerError::Config(format!("No socket addresses found for {}", address))
        })?;

        let listener = bind(&addr, self.config.backlog_size)?;
        self.serve(listener)
    }

    /// Serve connections accepted on an already bound listener
    pub fn serve(&self, listener: TcpListener) -> ServerResult<()> {
        self.config.validate()?;
        let workers = self.config.worker_threads;
        log::info!(
            "Listening on {} with {} worker threads",
            listener.local_addr()?,
            workers
        );

        let (sender, receiver) = channel::bounded::<TcpStream>(self.config.backlog_size as usize);

        crossbeam::scope(|scope| {
            for id in 0..workers {
                let receiver = receiver.clone();
                scope.spawn(move |_| {
                    for mut stream in receiver.iter() {
                        if let Err(e) = self.handle_stream(&mut stream) {
                            log::warn!("worker {}: connection error: {}", id, e);
                        }
                    }
                });
            }

            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if sender.send(stream).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("accept failed: {}", e),
                }
            }
            drop(sender);
        })
        .map_err(|_| ServerError::Connection("worker thread panicked".to_string()))
    }

    fn handle_stream(&self, stream: &mut TcpStream) -> ServerResult<()> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.config.connection_timeout))?;
        stream.set_write_timeout(Some(self.config.connection_timeout))?;
        self.serve_conn(stream)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn bind(addr: &SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    Ok(socket.into())
}

fn write_error<S: Write>(stream: &mut S, status: Status, message: &str) -> ServerResult<()> {
    let mut response = Response::new(status);
    response.set_header("Content-Type", "text/plain; charset=utf-8");
    response.set_header("Connection", "close");
    response.set_body(message.as_bytes());
    write_response(stream, &response)
}

fn write_response<S: Write>(stream: &mut S, response: &Response) -> ServerResult<()> {
    let mut bytes = Vec::with_capacity(response.body.len() + 256);
    response.serialize(&mut bytes)?;
    stream.write_all(&bytes)?;
    stream.flush()?;
    Ok(())
}
