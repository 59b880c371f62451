use crate::context::Context;
use crate::error::ServerResult;
use crate::router::HandlerFn;
use std::time::Instant;

/// Logging middleware - logs information about requests and responses
pub fn logging_middleware(ctx: &mut Context<'_>, next: &HandlerFn) -> ServerResult<()> {
    let start_time = Instant::now();
    let method = ctx.method();
    let path = ctx.path_string();
    log::debug!("[Request] {} {}", method, path);

    let result = next(ctx);

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => log::info!(
            "[Response] {} {} - {} - {:?}",
            method,
            path,
            ctx.response().status.code(),
            elapsed
        ),
        Err(e) => log::warn!("[Error] {} {} - Error: {} - {:?}", method, path, e, elapsed),
    }

    result
}
