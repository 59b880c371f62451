//! Middleware: cross-cutting behavior wrapped around a handler.
//!
//! A middleware receives the request context and the next link of the chain.
//! It may run code before calling `next`, after it, both, or return without
//! calling it at all.

pub mod basic_auth;
pub mod compress;
pub mod cors;
pub mod logging;

pub use basic_auth::BasicAuth;
pub use compress::Compress;
pub use cors::{Cors, CorsConfig};
pub use logging::logging_middleware;

use crate::context::Context;
use crate::error::ServerResult;
use crate::router::{handler_fn, HandlerFn};
use std::sync::Arc;

/// A link in a handler chain
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: &mut Context<'_>, next: &HandlerFn) -> ServerResult<()>;
}

impl<F> Middleware for F
where
    F: Fn(&mut Context<'_>, &HandlerFn) -> ServerResult<()> + Send + Sync,
{
    fn handle(&self, ctx: &mut Context<'_>, next: &HandlerFn) -> ServerResult<()> {
        self(ctx, next)
    }
}

/// Pin a closure to the middleware signature so its argument types are inferred
pub fn middleware_fn<F>(middleware: F) -> F
where
    F: Fn(&mut Context<'_>, &HandlerFn) -> ServerResult<()> + Send + Sync + 'static,
{
    middleware
}

/// Predicate deciding whether a middleware steps aside for a request
pub type Skipper = Arc<dyn Fn(&Context<'_>) -> bool + Send + Sync>;

pub fn skipper<F>(predicate: F) -> Skipper
where
    F: Fn(&Context<'_>) -> bool + Send + Sync + 'static,
{
    Arc::new(predicate)
}

/// Skipper that never skips
pub fn default_skipper() -> Skipper {
    skipper(|_| false)
}

/// Wrap `handler` in `middleware`
///
/// `middleware[0]` becomes the outermost link: it runs first and decides
/// whether the rest of the chain runs.
pub fn compose(handler: HandlerFn, middleware: &[Arc<dyn Middleware>]) -> HandlerFn {
    middleware.iter().rev().fold(handler, |next, middleware| {
        let middleware = Arc::clone(middleware);
        handler_fn(move |ctx| middleware.handle(ctx, &next))
    })
}
