use super::{default_skipper, Middleware, Skipper};
use crate::context::Context;
use crate::error::ServerResult;
use crate::router::HandlerFn;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// Gzip response bodies for clients that accept it
pub struct Compress {
    level: u32,
    min_length: usize,
    skipper: Skipper,
}

impl Compress {
    pub fn new() -> Self {
        Self {
            level: Compression::default().level(),
            min_length: 1024,
            skipper: default_skipper(),
        }
    }

    /// Compression level, 0 (none) to 9 (best)
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Bodies shorter than this are sent as is
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    pub fn with_skipper(mut self, skipper: Skipper) -> Self {
        self.skipper = skipper;
        self
    }
}

impl Default for Compress {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Compress {
    fn handle(&self, ctx: &mut Context<'_>, next: &HandlerFn) -> ServerResult<()> {
        if (self.skipper)(ctx) {
            return next(ctx);
        }

        next(ctx)?;

        let accepts_gzip = ctx
            .header("Accept-Encoding")
            .map_or(false, |value| value.contains("gzip"));
        let response = ctx.response();
        if !accepts_gzip
            || response.body.len() < self.min_length
            || response.headers.contains("Content-Encoding")
        {
            return Ok(());
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(&response.body)?;
        let compressed = encoder.finish()?;

        let response = ctx.response_mut();
        response.body = compressed;
        response.set_header("Content-Encoding", "gzip");
        response.add_header("Vary", "Accept-Encoding");

        Ok(())
    }
}
