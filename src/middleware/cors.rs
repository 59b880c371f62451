//! Cross-Origin Resource Sharing.
//!
//! The wrapped handler always runs exactly once; access-control headers are
//! computed from the request afterwards and layered onto its response.

use super::{default_skipper, Middleware, Skipper};
use crate::context::Context;
use crate::error::ServerResult;
use crate::http::Method;
use crate::router::HandlerFn;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const HEADER_ORIGIN: &str = "Origin";
pub const HEADER_VARY: &str = "Vary";
pub const HEADER_ACCESS_CONTROL_REQUEST_METHOD: &str = "Access-Control-Request-Method";
pub const HEADER_ACCESS_CONTROL_REQUEST_HEADERS: &str = "Access-Control-Request-Headers";
pub const HEADER_ACCESS_CONTROL_ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const HEADER_ACCESS_CONTROL_ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
pub const HEADER_ACCESS_CONTROL_ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
pub const HEADER_ACCESS_CONTROL_ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
pub const HEADER_ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";
pub const HEADER_ACCESS_CONTROL_MAX_AGE: &str = "Access-Control-Max-Age";

/// Methods allowed when the configuration lists none
pub const DEFAULT_ALLOW_METHODS: [Method; 6] = [
    Method::Get,
    Method::Head,
    Method::Put,
    Method::Patch,
    Method::Post,
    Method::Delete,
];

/// CORS settings; empty origin and method lists fall back to the defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Accepted origins; `"*"` accepts any
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<Method>,
    /// Empty means: echo the request's `Access-Control-Request-Headers`
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    /// Preflight cache lifetime in seconds; 0 leaves the header out
    pub max_age: u32,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: DEFAULT_ALLOW_METHODS.to_vec(),
            allow_headers: Vec::new(),
            expose_headers: Vec::new(),
            max_age: 0,
            allow_credentials: false,
        }
    }
}

/// CORS middleware
pub struct Cors {
    config: CorsConfig,
    skipper: Skipper,
    allow_methods: String,
    allow_headers: String,
    expose_headers: String,
}

impl Cors {
    /// Build the middleware, normalizing the configuration once
    pub fn new(mut config: CorsConfig) -> Self {
        let defaults = CorsConfig::default();
        if config.allow_origins.is_empty() {
            config.allow_origins = defaults.allow_origins;
        }
        if config.allow_methods.is_empty() {
            config.allow_methods = defaults.allow_methods;
        }

        let allow_methods = config
            .allow_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let allow_headers = config.allow_headers.join(",");
        let expose_headers = config.expose_headers.join(",");

        Self {
            config,
            skipper: default_skipper(),
            allow_methods,
            allow_headers,
            expose_headers,
        }
    }

    pub fn with_skipper(mut self, skipper: Skipper) -> Self {
        self.skipper = skipper;
        self
    }

    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    /// The configured entry matching `origin`: `"*"` or the exact origin
    fn allowed_origin(&self, origin: &str) -> Option<&str> {
        self.config
            .allow_origins
            .iter()
            .find(|allowed| allowed.as_str() == "*" || allowed.as_str() == origin)
            .map(String::as_str)
    }

    /// `OPTIONS`: origin negotiation only
    fn options_request(&self, ctx: &mut Context<'_>, allowed_origin: Option<&str>) {
        ctx.add_header(HEADER_VARY, HEADER_ORIGIN);

        let allowed_origin = match allowed_origin {
            Some(origin) => origin,
            None => return,
        };

        ctx.set_header(HEADER_ACCESS_CONTROL_ALLOW_ORIGIN, allowed_origin);
        if self.config.allow_credentials {
            ctx.set_header(HEADER_ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
        }
        if !self.expose_headers.is_empty() {
            ctx.set_header(HEADER_ACCESS_CONTROL_EXPOSE_HEADERS, &self.expose_headers);
        }
    }

    /// Every other method: the full access-control header set, body dropped
    fn access_control_request(&self, ctx: &mut Context<'_>, allowed_origin: Option<&str>) {
        ctx.add_header(HEADER_VARY, HEADER_ORIGIN);
        ctx.add_header(HEADER_VARY, HEADER_ACCESS_CONTROL_REQUEST_METHOD);
        ctx.add_header(HEADER_VARY, HEADER_ACCESS_CONTROL_REQUEST_HEADERS);

        let allowed_origin = match allowed_origin {
            Some(origin) => origin,
            None => return,
        };

        ctx.set_header(HEADER_ACCESS_CONTROL_ALLOW_ORIGIN, allowed_origin);
        ctx.set_header(HEADER_ACCESS_CONTROL_ALLOW_METHODS, &self.allow_methods);
        if self.config.allow_credentials {
            ctx.set_header(HEADER_ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
        }

        if !self.allow_headers.is_empty() {
            ctx.set_header(HEADER_ACCESS_CONTROL_ALLOW_HEADERS, &self.allow_headers);
        } else if let Some(requested) = ctx
            .header(HEADER_ACCESS_CONTROL_REQUEST_HEADERS)
            .filter(|requested| !requested.is_empty())
            .map(str::to_string)
        {
            ctx.set_header(HEADER_ACCESS_CONTROL_ALLOW_HEADERS, &requested);
        }

        if self.config.max_age > 0 {
            ctx.set_header(HEADER_ACCESS_CONTROL_MAX_AGE, &self.config.max_age.to_string());
        }

        ctx.response_mut().reset_body();
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new(CorsConfig::default())
    }
}

impl fmt::Debug for Cors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cors")
            .field("config", &self.config)
            .field("skipper", &"<function>")
            .finish()
    }
}

impl Middleware for Cors {
    fn handle(&self, ctx: &mut Context<'_>, next: &HandlerFn) -> ServerResult<()> {
        if (self.skipper)(ctx) {
            return next(ctx);
        }

        next(ctx)?;

        let origin = ctx.header(HEADER_ORIGIN).unwrap_or("").to_string();
        let allowed_origin = if origin.is_empty() {
            None
        } else {
            self.allowed_origin(&origin)
        };

        if ctx.method() == Method::Options {
            self.options_request(ctx, allowed_origin);
        } else {
            self.access_control_request(ctx, allowed_origin);
        }

        Ok(())
    }
}
