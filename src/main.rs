use gem_server::{
    logging_middleware, Compress, Cors, MemoryStore, Middleware, Router, Server, ServerConfig,
    ServerError, ServerResult, Status, StdLogger, XML_HEADER,
};
use serde::Serialize;
use std::env;
use std::path::Path;
use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename = "user")]
struct User {
    name: String,
}

fn main() -> ServerResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    if args.len() > 2 && args[1] == "--save-config" {
        return save_default_config(&args[2]);
    }

    let config = if args.len() > 1 && Path::new(&args[1]).exists() {
        // Load configuration from file
        ServerConfig::from_json_file(&args[1])?
    } else {
        // Use default configuration
        ServerConfig::new()
    };

    let router = routes(&config)?;
    let dispatcher = router.build();

    // Set up a signal handler for graceful shutdown
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal. Stopping server...");
        std::process::exit(0);
    })
    .map_err(|e| ServerError::Config(format!("Error setting Ctrl-C handler: {}", e)))?;

    let server = Server::new(config, move |exchange| dispatcher.serve(exchange));
    server.listen_and_serve()
}

fn routes(config: &ServerConfig) -> ServerResult<Router> {
    let mut router = Router::new();
    router
        .set_logger(Arc::new(StdLogger::new("gem::app")))
        .set_sessions_store(Arc::new(MemoryStore::new()))
        .use_middleware(logging_middleware);

    if let Some(cors) = &config.cors {
        router.use_middleware(Cors::new(cors.clone()));
    }

    router
        .get("/", |ctx| {
            ctx.html(Status::Ok, "<h1>Hello, GEM</h1>");
            Ok(())
        })?
        .get("/json", |ctx| ctx.json(Status::Ok, &User { name: "GEM".into() }))?
        .get("/jsonp", |ctx| {
            let callback = ctx.query("callback").unwrap_or("callback").to_string();
            ctx.jsonp(Status::Ok, &User { name: "GEM".into() }, &callback)
        })?
        .get("/xml", |ctx| {
            ctx.xml(Status::Ok, &User { name: "GEM".into() }, &[XML_HEADER])
        })?
        .get("/users/:name", |ctx| {
            let user = User {
                name: ctx.param("name").to_string(),
            };
            if let Some(logger) = ctx.logger() {
                logger.info(&format!("user lookup: {}", user.name));
            }
            ctx.json(Status::Ok, &user)
        })?
        .get("/visits", |ctx| {
            let store = match ctx.sessions_store() {
                Some(store) => store,
                None => return ctx.json(Status::Ok, &0u64),
            };

            let mut session = store.get(ctx.request(), "gem")?;
            let visits = session.get("visits").and_then(|v| v.parse::<u64>().ok()).unwrap_or(0) + 1;
            session.set("visits", &visits.to_string());
            store.save(ctx.response_mut(), &session)?;
            ctx.json(Status::Ok, &visits)
        })?;

    if let Some(dir) = &config.static_dir {
        let compress: Arc<dyn Middleware> = Arc::new(Compress::new());
        router.serve_files("/static/*filepath", dir.clone(), vec![compress])?;
    }

    Ok(router)
}

// Save default configuration to a file
fn save_default_config(path: &str) -> ServerResult<()> {
    let config = ServerConfig::new();
    config.save_to_json_file(path)?;
    println!("Default configuration saved to: {}", path);
    Ok(())
}
