mod common;

use common::RawResponse;
use gem_server::{Router, Server, ServerConfig, Status};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn request(port: u16, raw: &str) -> RawResponse {
    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    client.write_all(raw.as_bytes()).unwrap();

    // The server closes the connection after one response
    let mut buffer = Vec::new();
    client.read_to_end(&mut buffer).unwrap();
    RawResponse::parse(&buffer)
}

#[test]
fn test_listen_and_serve_over_tcp() {
    let mut router = Router::new();
    router
        .get("/hello/:name", |ctx| {
            let body = format!("Hello, {}!", ctx.param("name"));
            ctx.html(Status::Ok, &body);
            Ok(())
        })
        .unwrap();
    let dispatcher = router.build();

    let config = ServerConfig::new()
        .with_worker_threads(2)
        .with_connection_timeout(Duration::from_secs(2));
    let server = Arc::new(Server::new(config, move |exchange| dispatcher.serve(exchange)));

    // Bind to a random port
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let background = Arc::clone(&server);
    thread::spawn(move || background.serve(listener));

    let clients: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                request(
                    port,
                    &format!("GET /hello/client{} HTTP/1.1\r\nHost: localhost\r\n\r\n", i),
                )
            })
        })
        .collect();

    for (i, client) in clients.into_iter().enumerate() {
        let response = client.join().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body_str(), format!("Hello, client{}!", i));
        assert_eq!(response.header("Connection"), Some("close"));
    }

    let response = request(port, "GET /nowhere HTTP/1.1\r\n\r\n");
    assert_eq!(response.status, 404);
}
