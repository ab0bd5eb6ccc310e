//! Utility code to help writing gh-inbox tests.
//!
//! The tests work by launching a primitive HTTP server on a loopback port
//! and pointing a `GithubClient` at it, so the pipeline runs against canned
//! JSON instead of the real https://api.github.com.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

/// The callback type for HTTP route handlers.
pub type RequestCallback = Box<dyn Send + Sync + Fn(&Request) -> Response>;

/// A request received on the HTTP server.
#[derive(Clone, Debug)]
pub struct Request {
    /// The HTTP method, such as `GET` or `PATCH`.
    pub method: String,
    /// The path of the request, such as `/notifications`.
    pub path: String,
    /// The query components of the URL (the stuff after `?`).
    pub query: Vec<(String, String)>,
    /// HTTP headers, keys lowercased.
    pub headers: HashMap<String, String>,
    /// The body of the HTTP request (usually a JSON blob).
    pub body: Vec<u8>,
}

impl Request {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The `Host` header, i.e. the address this server is listening on.
    pub fn host(&self) -> &str {
        self.headers.get("host").map(String::as_str).unwrap_or("")
    }

    fn event(&self) -> (String, String) {
        let mut path = self.path.clone();
        if !self.query.is_empty() {
            let pairs: Vec<String> = self
                .query
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            path = format!("{path}?{}", pairs.join("&"));
        }
        (self.method.clone(), path)
    }
}

/// The response the HTTP server should send to the client.
pub struct Response {
    pub code: u32,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json(value: &serde_json::Value) -> Response {
        Response {
            code: 200,
            body: value.to_string().into_bytes(),
        }
    }

    pub fn empty() -> Response {
        Response {
            code: 200,
            body: Vec::new(),
        }
    }

    pub fn not_found() -> Response {
        Response {
            code: 404,
            body: br#"{"message": "Not Found"}"#.to_vec(),
        }
    }

    pub fn server_error() -> Response {
        Response {
            code: 500,
            body: Vec::new(),
        }
    }
}

/// A recording of HTTP requests which can then be validated they were
/// performed in the correct order.
#[derive(Clone)]
pub struct Events(Arc<Mutex<Vec<(String, String)>>>);

impl Events {
    fn new() -> Events {
        Events(Arc::new(Mutex::new(Vec::new())))
    }

    fn push(&self, event: (String, String)) {
        self.0.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().clone()
    }

    pub fn assert_eq(&self, expected: &[(&str, &str)]) {
        let es = self.snapshot();
        for (actual, expected) in es.iter().zip(expected.iter()) {
            if actual.0 != expected.0 || actual.1 != expected.1 {
                panic!("expected request to {expected:?}, but next event was {actual:?}");
            }
        }
        if es.len() > expected.len() {
            panic!(
                "got unexpected extra requests: {:?}",
                &es[expected.len()..]
            );
        } else if es.len() < expected.len() {
            panic!(
                "expected requests that were never made: {:?}",
                &expected[es.len()..]
            );
        }
    }
}

/// A builder collecting routes for a test server.
#[derive(Default)]
pub struct TestBuilder {
    routes: HashMap<(String, String), RequestCallback>,
}

impl TestBuilder {
    pub fn new() -> TestBuilder {
        TestBuilder::default()
    }

    /// Mounts a handler on `(method, path)`. The path is matched exactly,
    /// ignoring the query string, which the handler can inspect itself.
    pub fn route<F>(mut self, method: &str, path: &str, handler: F) -> TestBuilder
    where
        F: Send + Sync + Fn(&Request) -> Response + 'static,
    {
        self.routes
            .insert((method.to_string(), path.to_string()), Box::new(handler));
        self
    }

    /// Mounts a fixed JSON response.
    pub fn json(self, method: &str, path: &str, value: serde_json::Value) -> TestBuilder {
        self.route(method, path, move |_| Response::json(&value))
    }

    pub fn build(self) -> HttpServer {
        HttpServer::new(self.routes)
    }
}

/// A primitive HTTP server.
pub struct HttpServer {
    pub addr: SocketAddr,
    pub events: Events,
}

impl HttpServer {
    pub fn new(routes: HashMap<(String, String), RequestCallback>) -> HttpServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let events = Events::new();
        let thread_events = events.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                handle_client(stream, &routes, &thread_events);
            }
        });
        HttpServer { addr, events }
    }
}

fn handle_client(
    stream: TcpStream,
    routes: &HashMap<(String, String), RequestCallback>,
    events: &Events,
) {
    let Some(request) = read_request(&stream) else {
        return;
    };
    events.push(request.event());
    let response = match routes.get(&(request.method.clone(), request.path.clone())) {
        Some(handler) => handler(&request),
        None => {
            eprintln!(
                "unexpected request {} {} (no route mounted)",
                request.method, request.path
            );
            Response::not_found()
        }
    };
    write_response(stream, &response);
}

fn read_request(stream: &TcpStream) -> Option<Request> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    // e.g. "GET /notifications?page=1 HTTP/1.1"
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?;
    let url = url::Url::parse(&format!("http://localhost{target}")).ok()?;
    let path = url.path().to_string();
    let query = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.to_lowercase(), value.trim().to_string());
        }
    }

    let len: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0; len];
    if len > 0 {
        reader.read_exact(&mut body).ok()?;
    }

    Some(Request {
        method,
        path,
        query,
        headers,
        body,
    })
}

fn write_response(mut stream: TcpStream, response: &Response) {
    let reason = match response.code {
        200 => "OK",
        404 => "Not Found",
        _ => "Error",
    };
    let head = format!(
        "HTTP/1.1 {} {reason}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        response.code,
        response.body.len(),
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&response.body);
}
