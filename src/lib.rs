pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod logger;
pub mod middleware;
pub mod router;
pub mod server;
pub mod session;
pub mod static_files;
pub mod trie;

/// Re-exports of common components for easier access
pub use config::ServerConfig;
pub use context::{
    Context, CONTENT_TYPE_HTML, CONTENT_TYPE_JSON, CONTENT_TYPE_JSONP, CONTENT_TYPE_XML, XML_HEADER,
};
pub use error::{ServerError, ServerResult};
pub use http::{Exchange, Headers, HttpParser, Method, Request, Response, Status};
pub use logger::{Logger, StdLogger};
pub use middleware::{
    compose, default_skipper, logging_middleware, middleware_fn, skipper, BasicAuth, Compress,
    Cors, CorsConfig, Middleware, Skipper,
};
pub use router::{handler_fn, Dispatcher, HandlerFn, Router};
pub use server::Server;
pub use session::{MemoryStore, Session, SessionStore};
pub use static_files::{FileServer, StaticFileConfig};
pub use trie::{Lookup, Params, PathTrie, Pattern, Segment};
