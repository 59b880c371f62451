use crate::context::Context;
use crate::error::ServerResult;
use crate::http::Status;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the content type for a file based on its extension
fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        // Text types
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown",
        "csv" => "text/csv",

        // Application types
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        "wasm" => "application/wasm",

        // Image types
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",

        // Audio and video types
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",

        // Font types
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",

        _ => "application/octet-stream",
    }
}

/// Configuration for the static file server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticFileConfig {
    /// The root directory to serve files from
    pub root_dir: PathBuf,

    /// The index file to serve for directory requests
    pub index_file: String,

    /// Whether to follow symlinks
    pub follow_symlinks: bool,

    /// Whether to show directory listings
    pub directory_listing: bool,

    /// Maximum file size to serve, in bytes
    pub max_file_size: u64,

    /// Cache control header value
    pub cache_control: String,
}

impl Default for StaticFileConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("static"),
            index_file: "index.html".to_string(),
            follow_symlinks: false,
            directory_listing: false,
            max_file_size: 10 * 1024 * 1024, // 10 MB
            cache_control: "public, max-age=3600".to_string(),
        }
    }
}

impl StaticFileConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }
}

/// Serves files below a root directory
#[derive(Clone, Debug)]
pub struct FileServer {
    config: StaticFileConfig,
}

impl FileServer {
    pub fn new(config: StaticFileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StaticFileConfig {
        &self.config
    }

    /// Map a request-relative path onto the root, never leaving it
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let mut fs_path = self.config.root_dir.clone();
        for segment in relative.split('/') {
            // Skip empty segments and prevent directory traversal
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                continue;
            }
            fs_path.push(segment);
        }
        fs_path
    }

    /// Answer the request with the file at `relative`
    pub fn serve(&self, ctx: &mut Context<'_>, relative: &str) -> ServerResult<()> {
        let mut fs_path = self.resolve(relative);

        let metadata = match fs::symlink_metadata(&fs_path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                plain(ctx, Status::NotFound, &format!("File not found: {}", relative));
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if !self.config.follow_symlinks
            && (metadata.file_type().is_symlink() || self.crosses_symlink(&fs_path)?)
        {
            plain(ctx, Status::Forbidden, "Symlinks not allowed");
            return Ok(());
        }

        if fs_path.is_dir() {
            let index_path = fs_path.join(&self.config.index_file);
            if index_path.is_file() {
                if !self.config.follow_symlinks
                    && fs::symlink_metadata(&index_path)?.file_type().is_symlink()
                {
                    plain(ctx, Status::Forbidden, "Symlinks not allowed");
                    return Ok(());
                }
                fs_path = index_path;
            } else if self.config.directory_listing {
                return self.serve_directory_listing(ctx, &fs_path, relative);
            } else {
                plain(ctx, Status::Forbidden, "Directory listing not allowed");
                return Ok(());
            }
        }

        if fs::metadata(&fs_path)?.len() > self.config.max_file_size {
            plain(ctx, Status::PayloadTooLarge, "File too large");
            return Ok(());
        }

        let contents = fs::read(&fs_path)?;
        log::debug!("serving {} ({} bytes)", fs_path.display(), contents.len());

        ctx.set_status(Status::Ok);
        ctx.set_content_type(content_type(&fs_path));
        ctx.set_header("Cache-Control", &self.config.cache_control);
        ctx.response_mut().set_body(&contents);
        Ok(())
    }

    /// Whether any directory between the root and `path` is a symlink
    fn crosses_symlink(&self, path: &Path) -> io::Result<bool> {
        let relative = match path.strip_prefix(&self.config.root_dir) {
            Ok(relative) => relative,
            Err(_) => return Ok(true),
        };

        let mut current = self.config.root_dir.clone();
        let mut components = relative.components().peekable();
        while let Some(component) = components.next() {
            current.push(component);
            // The last component is checked by the caller
            if components.peek().is_none() {
                break;
            }
            if fs::symlink_metadata(&current)?.file_type().is_symlink() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn serve_directory_listing(
        &self,
        ctx: &mut Context<'_>,
        dir_path: &Path,
        relative: &str,
    ) -> ServerResult<()> {
        let mut entries: Vec<(String, bool)> = fs::read_dir(dir_path)?
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
                // Skip hidden files
                (!name.starts_with('.')).then_some((name, is_dir))
            })
            .collect();

        // Directories first, then files, alphabetically
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let base = ctx.path().trim_end_matches('/').to_string();
        let title = escape_html(relative.trim_matches('/'));

        let mut html = String::new();
        html.push_str("<!DOCTYPE html><html><head><title>Directory Listing</title></head><body>");
        html.push_str(&format!("<h1>Index of /{}</h1><ul>", title));
        for (name, is_dir) in entries {
            let suffix = if is_dir { "/" } else { "" };
            let name = escape_html(&name);
            html.push_str(&format!(
                "<li><a href=\"{}/{}\">{}{}</a></li>",
                base, name, name, suffix
            ));
        }
        html.push_str("</ul></body></html>");

        ctx.html(Status::Ok, &html);
        Ok(())
    }
}

fn plain(ctx: &mut Context<'_>, status: Status, message: &str) {
    ctx.set_status(status);
    ctx.set_content_type("text/plain; charset=utf-8");
    ctx.response_mut().set_body(message.as_bytes());
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Exchange, Method, Request, Response};

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir()
                .join(format!("gem-static-{}-{}", std::process::id(), name));
            let _ = fs::remove_dir_all(&path);
            fs::create_dir_all(&path).unwrap();
            TempDir(path)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn serve(config: StaticFileConfig, uri: &str, relative: &str) -> Response {
        let mut exchange = Exchange::new(Request::new(Method::Get, uri));
        FileServer::new(config)
            .serve(&mut Context::new(&mut exchange), relative)
            .unwrap();
        exchange.response
    }

    #[test]
    fn test_serves_file_with_content_type() {
        let dir = TempDir::new("file");
        fs::create_dir_all(dir.0.join("js")).unwrap();
        fs::write(dir.0.join("js/app.js"), "console.log(1);").unwrap();

        let response = serve(StaticFileConfig::new(&dir.0), "/static/js/app.js", "js/app.js");
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.get_header("Content-Type"), Some("text/javascript"));
        assert_eq!(response.get_header("Cache-Control"), Some("public, max-age=3600"));
        assert_eq!(response.body, b"console.log(1);");
    }

    #[test]
    fn test_missing_file_is_404() {
        let dir = TempDir::new("missing");
        let response = serve(StaticFileConfig::new(&dir.0), "/static/nope.txt", "nope.txt");
        assert_eq!(response.status, Status::NotFound);
    }

    #[test]
    fn test_traversal_stays_inside_root() {
        let dir = TempDir::new("traversal");
        let server = FileServer::new(StaticFileConfig::new(&dir.0));
        assert_eq!(server.resolve("../../etc/passwd"), dir.0.join("etc").join("passwd"));
        assert_eq!(server.resolve("./a//b/"), dir.0.join("a").join("b"));
    }

    #[test]
    fn test_directories() {
        let dir = TempDir::new("dirs");
        fs::create_dir_all(dir.0.join("docs/guide")).unwrap();
        fs::write(dir.0.join("docs/readme.md"), "# docs").unwrap();
        fs::create_dir_all(dir.0.join("site")).unwrap();
        fs::write(dir.0.join("site/index.html"), "<h1>home</h1>").unwrap();

        let response = serve(StaticFileConfig::new(&dir.0), "/static/site/", "site/");
        assert_eq!(response.body, b"<h1>home</h1>");
        assert_eq!(response.get_header("Content-Type"), Some("text/html; charset=utf-8"));

        let response = serve(StaticFileConfig::new(&dir.0), "/static/docs", "docs");
        assert_eq!(response.status, Status::Forbidden);

        let config = StaticFileConfig {
            directory_listing: true,
            ..StaticFileConfig::new(&dir.0)
        };
        let response = serve(config, "/static/docs/", "docs/");
        let html = String::from_utf8(response.body).unwrap();
        assert!(html.contains("<a href=\"/static/docs/guide\">guide/</a>"));
        assert!(html.contains("<a href=\"/static/docs/readme.md\">readme.md</a>"));
        assert!(html.find("guide/").unwrap() < html.find("readme.md").unwrap());
    }

    #[test]
    fn test_file_too_large() {
        let dir = TempDir::new("large");
        fs::write(dir.0.join("big.bin"), vec![0u8; 64]).unwrap();

        let config = StaticFileConfig {
            max_file_size: 16,
            ..StaticFileConfig::new(&dir.0)
        };
        let response = serve(config, "/static/big.bin", "big.bin");
        assert_eq!(response.status, Status::PayloadTooLarge);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_anywhere_in_the_path() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new("links-root");
        let outside = TempDir::new("links-outside");
        fs::write(outside.0.join("secret.txt"), "secret").unwrap();
        fs::write(outside.0.join("index.html"), "<h1>elsewhere</h1>").unwrap();
        fs::create_dir_all(dir.0.join("site")).unwrap();
        symlink(&outside.0, dir.0.join("linked")).unwrap();
        symlink(outside.0.join("secret.txt"), dir.0.join("secret.txt")).unwrap();
        symlink(outside.0.join("index.html"), dir.0.join("site/index.html")).unwrap();

        for (uri, relative) in [
            ("/static/linked/secret.txt", "linked/secret.txt"),
            ("/static/secret.txt", "secret.txt"),
            ("/static/site/", "site/"),
        ] {
            let response = serve(StaticFileConfig::new(&dir.0), uri, relative);
            assert_eq!(response.status, Status::Forbidden, "{}", uri);
            assert_eq!(response.body, b"Symlinks not allowed");
        }

        let config = StaticFileConfig {
            follow_symlinks: true,
            ..StaticFileConfig::new(&dir.0)
        };
        let response = serve(config, "/static/linked/secret.txt", "linked/secret.txt");
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.body, b"secret");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("a/b.PNG")), "image/png");
        assert_eq!(content_type(Path::new("noext")), "application/octet-stream");
    }
}
