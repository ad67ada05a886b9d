//! A tiny threaded HTTP/1.1 server answering with canned responses.
//!
//! Each connection carries exactly one request (`Connection: close`), which keeps the
//! request parser trivial while still exercising the real client stack.

use std::io::{Read as _, Write as _};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;

/// One request as seen by the stub.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

/// Where a stalled reply goes quiet.
#[derive(Debug, Clone, Copy)]
pub enum Stall {
    /// Read the request, then say nothing for this long.
    BeforeHead(Duration),
    /// Send the head and the first `after` body bytes, then pause.
    MidBody { after: usize, pause: Duration },
}

/// Canned reply.
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub stall: Option<Stall>,
}

impl StubResponse {
    pub fn json(value: &Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: value.to_string(),
            stall: None,
        }
    }

    /// An SSE body with one `data:` event per payload, terminated by `[DONE]`.
    pub fn sse(payloads: &[Value]) -> Self {
        let mut body = String::new();
        for payload in payloads {
            body.push_str("data: ");
            body.push_str(&payload.to_string());
            body.push_str("\n\n");
        }
        body.push_str("data: [DONE]\n\n");
        Self::raw_sse(body)
    }

    pub fn raw_sse(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body: body.into(),
            stall: None,
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
            stall: None,
        }
    }

    #[must_use]
    pub fn stalled(mut self, stall: Stall) -> Self {
        self.stall = Some(stall);
        self
    }

    fn write_to(&self, stream: &mut TcpStream) {
        let reason = match self.status {
            200 => "OK",
            404 => "Not Found",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Status",
        };
        let head = format!(
            "HTTP/1.1 {} {reason}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.content_type,
            self.body.len()
        );
        let body = self.body.as_bytes();
        match self.stall {
            None => {
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(body);
            }
            Some(Stall::BeforeHead(pause)) => {
                thread::sleep(pause);
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(body);
            }
            Some(Stall::MidBody { after, pause }) => {
                let (first, rest) = body.split_at(after.min(body.len()));
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(first);
                let _ = stream.flush();
                thread::sleep(pause);
                let _ = stream.write_all(rest);
            }
        }
        let _ = stream.flush();
    }
}

pub struct StubServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StubServer {
    pub fn start(handler: impl Fn(&RecordedRequest) -> StubResponse + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let addr = listener.local_addr().expect("stub server addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let join = {
            let requests = Arc::clone(&requests);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(mut stream) = stream else { continue };
                    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
                    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
                    let Some(request) = read_request(&mut stream) else {
                        continue;
                    };
                    let response = handler(&request);
                    requests
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .push(request);
                    response.write_to(&mut stream);
                }
            })
        };

        Self {
            addr,
            requests,
            shutdown,
            join: Some(join),
        }
    }

    /// Routes `GET /v1/models` to a ready reply and everything else to `handler`.
    pub fn openai(handler: impl Fn(&RecordedRequest) -> StubResponse + Send + Sync + 'static) -> Self {
        Self::start(move |request| {
            if request.method == "GET" && request.path == "/v1/models" {
                StubResponse::json(&serde_json::json!({"object": "list", "data": []}))
            } else {
                handler(request)
            }
        })
    }

    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.addr.port())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Requests other than readiness probes.
    pub fn completion_requests(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == "/v1/chat/completions")
            .collect()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(self.addr);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// A port nothing is listening on (bound then released).
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("ephemeral addr").port()
}

fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut scratch = [0u8; 4096];
    let headers_end = loop {
        match stream.read(&mut scratch) {
            Ok(0) | Err(_) => return None,
            Ok(n) => {
                buf.extend_from_slice(&scratch[..n]);
                if let Some(end) = find_double_crlf(&buf) {
                    break end;
                }
            }
        }
    };

    let head = String::from_utf8_lossy(&buf[..headers_end]).into_owned();
    let body_len = parse_content_length(&head).unwrap_or(0);
    while buf.len() < headers_end + body_len {
        match stream.read(&mut scratch) {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&scratch[..n]),
        }
    }

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let body = String::from_utf8_lossy(&buf[headers_end..]).into_owned();
    Some(RecordedRequest { method, path, body })
}

fn parse_content_length(headers: &str) -> Option<usize> {
    headers.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}
