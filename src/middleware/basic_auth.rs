use super::{default_skipper, Middleware, Skipper};
use crate::context::Context;
use crate::error::ServerResult;
use crate::http::Status;
use crate::router::HandlerFn;

/// HTTP Basic authentication; requests without valid credentials get a 401
/// and never reach the handler
pub struct BasicAuth {
    // `username:password` as the client sends it, before encoding
    credentials: Vec<u8>,
    realm: String,
    skipper: Skipper,
}

impl BasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            credentials: format!("{}:{}", username, password).into_bytes(),
            realm: "Restricted".to_string(),
            skipper: default_skipper(),
        }
    }

    pub fn with_realm(mut self, realm: &str) -> Self {
        self.realm = realm.to_string();
        self
    }

    pub fn with_skipper(mut self, skipper: Skipper) -> Self {
        self.skipper = skipper;
        self
    }

    fn authorized(&self, header: Option<&str>) -> bool {
        let encoded = match header.and_then(|value| value.strip_prefix("Basic ")) {
            Some(encoded) => encoded.trim(),
            None => return false,
        };

        match base64::decode(encoded) {
            Ok(decoded) => constant_time_eq(&decoded, &self.credentials),
            Err(_) => false,
        }
    }
}

/// Byte equality whose running time depends only on `expected`
fn constant_time_eq(candidate: &[u8], expected: &[u8]) -> bool {
    let mut diff = candidate.len() ^ expected.len();
    for (i, byte) in expected.iter().enumerate() {
        let other = candidate.get(i).copied().unwrap_or(0);
        diff |= usize::from(byte ^ other);
    }
    diff == 0
}

impl Middleware for BasicAuth {
    fn handle(&self, ctx: &mut Context<'_>, next: &HandlerFn) -> ServerResult<()> {
        if (self.skipper)(ctx) || self.authorized(ctx.header("Authorization")) {
            return next(ctx);
        }

        ctx.set_status(Status::Unauthorized);
        ctx.set_header("WWW-Authenticate", &format!("Basic realm=\"{}\"", self.realm));
        ctx.set_content_type("text/plain; charset=utf-8");
        ctx.response_mut().set_body(b"Unauthorized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Exchange, Method, Request, Response};
    use crate::middleware::compose;
    use crate::router::handler_fn;
    use std::sync::Arc;

    fn run(authorization: Option<&str>) -> Response {
        let handler = handler_fn(|ctx| {
            ctx.html(Status::Ok, "Secret data");
            Ok(())
        });
        let auth: Arc<dyn Middleware> =
            Arc::new(BasicAuth::new("admin", "password").with_realm("Server"));
        let chain = compose(handler, &[auth]);

        let mut request = Request::new(Method::Get, "/");
        if let Some(value) = authorization {
            request.set_header("Authorization", value);
        }
        let mut exchange = Exchange::new(request);
        chain(&mut Context::new(&mut exchange)).unwrap();
        exchange.response
    }

    #[test]
    fn test_basic_auth_middleware() {
        let response = run(None);
        assert_eq!(response.status, Status::Unauthorized);
        assert_eq!(
            response.get_header("WWW-Authenticate"),
            Some("Basic realm=\"Server\"")
        );

        let credentials = base64::encode("admin:password");
        let response = run(Some(&format!("Basic {}", credentials)));
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.body, b"Secret data");

        let credentials = base64::encode("admin:wrong");
        let response = run(Some(&format!("Basic {}", credentials)));
        assert_eq!(response.status, Status::Unauthorized);

        let response = run(Some("Bearer token"));
        assert_eq!(response.status, Status::Unauthorized);
    }

    #[test]
    fn test_rejects_near_misses() {
        for credentials in ["admin:passwor", "admin:password!", "admin", ":password", "Admin:password"] {
            let header = format!("Basic {}", base64::encode(credentials));
            assert_eq!(run(Some(&header)).status, Status::Unauthorized, "{}", credentials);
        }

        let response = run(Some("Basic not-base64!"));
        assert_eq!(response.status, Status::Unauthorized);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"admin:password", b"admin:password"));
        assert!(!constant_time_eq(b"admin:passwore", b"admin:password"));
        assert!(!constant_time_eq(b"admin:password\0", b"admin:password"));
        assert!(!constant_time_eq(b"", b"admin:password"));
        assert!(constant_time_eq(b"", b""));
    }
}
