use crate::context::Context;
use crate::error::{ServerError, ServerResult};
use crate::http::{Exchange, Method, Response, Status};
use crate::logger::Logger;
use crate::middleware::{compose, Middleware};
use crate::session::SessionStore;
use crate::static_files::{FileServer, StaticFileConfig};
use crate::trie::{Lookup, Params, PathTrie, Pattern};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A handler function for processing HTTP requests
pub type HandlerFn = Arc<dyn Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync>;

/// Box a closure as a [`HandlerFn`], inferring its argument type
pub fn handler_fn<F>(handler: F) -> HandlerFn
where
    F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// A route entry in the router
struct RouteEntry {
    /// The path pattern for this route
    pattern: String,

    /// The handler function for this route
    handler: HandlerFn,

    /// Middleware applied inside the global middleware
    middleware: Vec<Arc<dyn Middleware>>,
}

// Custom Debug implementation for RouteEntry since handler can't be automatically derived
impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern)
            .field("handler", &"<function>")
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Route registration
///
/// Routes and middleware are collected here, then [`Router::build`] freezes
/// them into a [`Dispatcher`].
pub struct Router {
    tree: PathTrie<RouteEntry>,

    /// Middleware wrapped around every route, outermost first
    middleware: Vec<Arc<dyn Middleware>>,

    /// The handler to use when no route matches
    not_found_handler: HandlerFn,

    /// The handler to use when the path matches under other methods
    method_not_allowed_handler: HandlerFn,

    logger: Option<Arc<dyn Logger>>,
    sessions: Option<Arc<dyn SessionStore>>,
}

// Custom Debug implementation for Router
impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("tree", &self.tree)
            .field("middleware", &self.middleware.len())
            .field("not_found_handler", &"<function>")
            .field("method_not_allowed_handler", &"<function>")
            .finish()
    }
}

fn text_response(ctx: &mut Context<'_>, status: Status, body: &str) {
    ctx.set_status(status);
    ctx.set_content_type("text/plain; charset=utf-8");
    ctx.response_mut().set_body(body.as_bytes());
}

impl Router {
    /// Create a new router
    pub fn new() -> Self {
        let not_found_handler = handler_fn(|ctx| {
            let body = format!("Not Found: {}", ctx.path());
            text_response(ctx, Status::NotFound, &body);
            Ok(())
        });

        let method_not_allowed_handler = handler_fn(|ctx| {
            text_response(ctx, Status::MethodNotAllowed, Status::MethodNotAllowed.as_str());
            Ok(())
        });

        Self {
            tree: PathTrie::new(),
            middleware: Vec::new(),
            not_found_handler,
            method_not_allowed_handler,
            logger: None,
            sessions: None,
        }
    }

    /// Add a middleware wrapped around every route
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Register a handler for `method` at `pattern`
    pub fn handle<F>(&mut self, method: Method, pattern: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.handle_with(method, pattern, handler, Vec::new())
    }

    /// Register a handler with route-specific middleware
    ///
    /// Route middleware runs inside the global middleware.
    pub fn handle_with<F>(
        &mut self,
        method: Method,
        pattern: &str,
        handler: F,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> ServerResult<&mut Self>
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        let parsed = Pattern::parse(pattern)?;
        self.insert(method, &parsed, handler_fn(handler), middleware)?;
        Ok(self)
    }

    fn insert(
        &mut self,
        method: Method,
        pattern: &Pattern,
        handler: HandlerFn,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> ServerResult<()> {
        let entry = RouteEntry {
            pattern: pattern.as_str().to_string(),
            handler,
            middleware,
        };
        self.tree.insert(method, pattern, entry)?;
        log::debug!("registered route {} {}", method, pattern);
        Ok(())
    }

    /// Add a GET route
    pub fn get<F>(&mut self, pattern: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.handle(Method::Get, pattern, handler)
    }

    /// Add a HEAD route
    pub fn head<F>(&mut self, pattern: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.handle(Method::Head, pattern, handler)
    }

    /// Add a POST route
    pub fn post<F>(&mut self, pattern: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.handle(Method::Post, pattern, handler)
    }

    /// Add a PUT route
    pub fn put<F>(&mut self, pattern: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.handle(Method::Put, pattern, handler)
    }

    /// Add a PATCH route
    pub fn patch<F>(&mut self, pattern: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.handle(Method::Patch, pattern, handler)
    }

    /// Add a DELETE route
    pub fn delete<F>(&mut self, pattern: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.handle(Method::Delete, pattern, handler)
    }

    /// Add an OPTIONS route
    pub fn options<F>(&mut self, pattern: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.handle(Method::Options, pattern, handler)
    }

    /// Register one handler for every method at `pattern`
    pub fn any<F>(&mut self, pattern: &str, handler: F) -> ServerResult<&mut Self>
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        let parsed = Pattern::parse(pattern)?;
        // All or nothing: a taken method leaves the router untouched
        if let Some(method) = Method::ALL
            .iter()
            .copied()
            .find(|method| self.tree.contains(*method, &parsed))
        {
            return Err(ServerError::RouteConflict {
                method,
                pattern: parsed.as_str().to_string(),
            });
        }

        let handler = handler_fn(handler);
        for method in Method::ALL {
            self.insert(method, &parsed, Arc::clone(&handler), Vec::new())?;
        }
        Ok(self)
    }

    /// Serve files below `root` at a pattern ending in a wildcard,
    /// e.g. `/static/*filepath`
    pub fn serve_files(
        &mut self,
        pattern: &str,
        root: impl Into<PathBuf>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> ServerResult<&mut Self> {
        self.serve_files_with(pattern, StaticFileConfig::new(root), middleware)
    }

    /// Like [`Router::serve_files`] with full file server settings
    pub fn serve_files_with(
        &mut self,
        pattern: &str,
        config: StaticFileConfig,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> ServerResult<&mut Self> {
        let parsed = Pattern::parse(pattern)?;
        let name = parsed
            .wildcard_name()
            .ok_or_else(|| {
                ServerError::pattern(pattern, "file patterns must end with a wildcard, e.g. /static/*filepath")
            })?
            .to_string();

        let files = FileServer::new(config);
        let handler = handler_fn(move |ctx| {
            let relative = ctx.param(&name).to_string();
            files.serve(ctx, &relative)
        });

        self.insert(Method::Get, &parsed, handler, middleware)?;
        Ok(self)
    }

    /// Set the not found handler
    pub fn not_found<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.not_found_handler = handler_fn(handler);
        self
    }

    /// Set the handler for paths that exist under other methods
    ///
    /// The `Allow` header is already set when it runs.
    pub fn method_not_allowed<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.method_not_allowed_handler = handler_fn(handler);
        self
    }

    pub fn set_logger(&mut self, logger: Arc<dyn Logger>) -> &mut Self {
        self.logger = Some(logger);
        self
    }

    pub fn set_sessions_store(&mut self, sessions: Arc<dyn SessionStore>) -> &mut Self {
        self.sessions = Some(sessions);
        self
    }

    /// Number of registered (method, pattern) pairs
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Freeze the routes into a dispatcher
    ///
    /// Every route is composed once: global middleware outermost, then the
    /// route's own middleware, then the handler. The fallback handlers get
    /// the global middleware too.
    pub fn build(self) -> Dispatcher {
        let Router {
            tree,
            middleware,
            not_found_handler,
            method_not_allowed_handler,
            logger,
            sessions,
        } = self;

        let routes = tree.len();
        let tree = tree.map(|_, entry| {
            let chain: Vec<Arc<dyn Middleware>> = middleware
                .iter()
                .chain(entry.middleware.iter())
                .cloned()
                .collect();
            compose(entry.handler, &chain)
        });

        log::info!(
            "router built with {} routes and {} global middleware",
            routes,
            middleware.len()
        );

        Dispatcher {
            tree,
            not_found: compose(not_found_handler, &middleware),
            method_not_allowed: compose(method_not_allowed_handler, &middleware),
            logger,
            sessions,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable request entry point produced by [`Router::build`]
///
/// Shared by every worker; lookups take no locks.
pub struct Dispatcher {
    tree: PathTrie<HandlerFn>,
    not_found: HandlerFn,
    method_not_allowed: HandlerFn,
    logger: Option<Arc<dyn Logger>>,
    sessions: Option<Arc<dyn SessionStore>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.tree.len())
            .field("logger", &self.logger.is_some())
            .field("sessions", &self.sessions.is_some())
            .finish()
    }
}

impl Dispatcher {
    /// Route one exchange and run its handler chain
    ///
    /// Errors escaping the chain are logged and replace the response with a
    /// 500.
    pub fn serve(&self, exchange: &mut Exchange) {
        let method = exchange.request.method;

        let (handler, params) = match self.tree.lookup(method, exchange.request.path()) {
            Lookup::Matched { value, params } => (value, params),
            Lookup::MethodNotAllowed { allowed } => {
                let allow: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                exchange.response.set_header("Allow", &allow.join(", "));
                (&self.method_not_allowed, Params::new())
            }
            Lookup::PathNotFound => (&self.not_found, Params::new()),
        };

        let result = {
            let mut ctx = Context::new(exchange)
                .with_params(params)
                .with_logger(self.logger.as_deref())
                .with_sessions_store(self.sessions.as_deref());
            handler(&mut ctx)
        };

        if let Err(err) = result {
            let message = format!("{} {} failed: {}", method, exchange.request.path(), err);
            match &self.logger {
                Some(logger) => logger.error(&message),
                None => log::error!("{}", message),
            }

            let mut response = Response::new(Status::InternalServerError);
            response.set_header("Content-Type", "text/plain; charset=utf-8");
            response.set_body(Status::InternalServerError.as_str().as_bytes());
            exchange.response = response;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;
    use crate::middleware::middleware_fn;
    use parking_lot::Mutex;

    fn dispatch(dispatcher: &Dispatcher, method: Method, uri: &str) -> Response {
        let mut exchange = Exchange::new(Request::new(method, uri));
        dispatcher.serve(&mut exchange);
        exchange.response
    }

    fn body(text: &'static str) -> impl Fn(&mut Context<'_>) -> ServerResult<()> + Send + Sync {
        move |ctx: &mut Context<'_>| {
            ctx.html(Status::Ok, text);
            Ok(())
        }
    }

    #[test]
    fn test_router_exact_match() {
        let mut router = Router::new();
        router.get("/", body("Home")).unwrap();
        router.get("/users", body("Users")).unwrap();
        let dispatcher = router.build();

        let response = dispatch(&dispatcher, Method::Get, "/");
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.body, b"Home");

        let response = dispatch(&dispatcher, Method::Get, "/users?sort=name");
        assert_eq!(response.body, b"Users");

        let response = dispatch(&dispatcher, Method::Get, "/not-found");
        assert_eq!(response.status, Status::NotFound);
        assert_eq!(response.body, b"Not Found: /not-found");
    }

    #[test]
    fn test_router_method_not_allowed() {
        let mut router = Router::new();
        router.get("/api", body("GET")).unwrap();
        router.post("/api", body("POST")).unwrap();
        let dispatcher = router.build();

        let response = dispatch(&dispatcher, Method::Post, "/api");
        assert_eq!(response.body, b"POST");

        let response = dispatch(&dispatcher, Method::Put, "/api");
        assert_eq!(response.status, Status::MethodNotAllowed);
        assert_eq!(response.get_header("Allow"), Some("GET, POST"));
    }

    #[test]
    fn test_router_params() {
        let mut router = Router::new();
        router
            .get("/users/:id/posts/:post_id", |ctx| {
                let text = format!("{}:{}", ctx.param("id"), ctx.param("post_id"));
                ctx.html(Status::Ok, &text);
                Ok(())
            })
            .unwrap();
        let dispatcher = router.build();

        let response = dispatch(&dispatcher, Method::Get, "/users/123/posts/456");
        assert_eq!(response.body, b"123:456");
    }

    #[test]
    fn test_global_wraps_route_middleware() {
        let trace = Arc::new(Mutex::new(Vec::new()));

        let mut router = Router::new();
        let global = Arc::clone(&trace);
        router.use_middleware(middleware_fn(move |ctx, next| {
            global.lock().push("global");
            next(ctx)
        }));

        let local = Arc::clone(&trace);
        let route: Arc<dyn Middleware> = Arc::new(middleware_fn(move |ctx, next| {
            local.lock().push("route");
            next(ctx)
        }));
        let handler = Arc::clone(&trace);
        router
            .handle_with(
                Method::Get,
                "/",
                move |_| {
                    handler.lock().push("handler");
                    Ok(())
                },
                vec![route],
            )
            .unwrap();

        // Registered after the route, still applies
        let late = Arc::clone(&trace);
        router.use_middleware(middleware_fn(move |ctx, next| {
            late.lock().push("late global");
            next(ctx)
        }));

        let dispatcher = router.build();
        dispatch(&dispatcher, Method::Get, "/");
        assert_eq!(*trace.lock(), vec!["global", "late global", "route", "handler"]);

        trace.lock().clear();
        dispatch(&dispatcher, Method::Get, "/missing");
        assert_eq!(*trace.lock(), vec!["global", "late global"]);
    }

    #[test]
    fn test_custom_fallbacks() {
        let mut router = Router::new();
        router.delete("/items/:id", body("deleted")).unwrap();
        router.not_found(|ctx| {
            ctx.html(Status::NotFound, "<h1>nothing here</h1>");
            Ok(())
        });
        router.method_not_allowed(|ctx| {
            ctx.set_status(Status::MethodNotAllowed);
            ctx.write(b"try another verb");
            Ok(())
        });
        let dispatcher = router.build();

        let response = dispatch(&dispatcher, Method::Get, "/nope");
        assert_eq!(response.body, b"<h1>nothing here</h1>");

        let response = dispatch(&dispatcher, Method::Get, "/items/3");
        assert_eq!(response.status, Status::MethodNotAllowed);
        assert_eq!(response.get_header("Allow"), Some("DELETE"));
        assert_eq!(response.body, b"try another verb");
    }

    #[test]
    fn test_handler_error_becomes_500() {
        let mut router = Router::new();
        router
            .get("/broken", |ctx| {
                ctx.set_header("X-Partial", "yes");
                Err(ServerError::encoding("JSON", "boom"))
            })
            .unwrap();
        let dispatcher = router.build();

        let response = dispatch(&dispatcher, Method::Get, "/broken");
        assert_eq!(response.status, Status::InternalServerError);
        assert!(response.get_header("X-Partial").is_none());
    }

    #[test]
    fn test_registration_errors() {
        let mut router = Router::new();
        router.get("/users/:id", body("a")).unwrap();

        let err = router.get("/users/:id", body("b")).unwrap_err();
        assert!(matches!(err, ServerError::RouteConflict { .. }));

        let err = router.get("/files/*path/edit", body("c")).unwrap_err();
        assert!(matches!(err, ServerError::Pattern { .. }));

        let err = router.serve_files("/assets", "public", Vec::new()).unwrap_err();
        assert!(matches!(err, ServerError::Pattern { .. }));

        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_any_registers_every_method() {
        let mut router = Router::new();
        router
            .any("/echo", |ctx| {
                let method = ctx.method_string();
                ctx.html(Status::Ok, &method);
                Ok(())
            })
            .unwrap();
        assert_eq!(router.len(), Method::ALL.len());
        let dispatcher = router.build();

        for method in Method::ALL {
            let response = dispatch(&dispatcher, method, "/echo");
            assert_eq!(response.body, method.as_str().as_bytes());
        }
    }

    #[test]
    fn test_any_conflict_leaves_router_unchanged() {
        let mut router = Router::new();
        router
            .get("/echo", |ctx| {
                ctx.html(Status::Ok, "get");
                Ok(())
            })
            .unwrap();

        let err = router
            .any("/echo", |ctx| {
                ctx.html(Status::Ok, "any");
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::RouteConflict { method: Method::Get, .. }
        ));
        assert_eq!(router.len(), 1);

        let dispatcher = router.build();
        let response = dispatch(&dispatcher, Method::Post, "/echo");
        assert_eq!(response.status, Status::MethodNotAllowed);
        assert_eq!(response.get_header("Allow"), Some("GET"));
    }

    #[test]
    fn test_dispatcher_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Dispatcher>();
    }
}
