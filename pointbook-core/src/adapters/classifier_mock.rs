//! Mock classifier server for testing
//!
//! Minimal HTTP/1.1 server on a random local port, answering:
//! - POST /verify with `{ "valid": ..., "reason": ... }`
//! - POST /extract with a partial price-tag report
//!
//! Each server behaves according to one fixed [`MockMode`].

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How the mock answers every request
#[derive(Debug, Clone, Copy)]
pub enum MockMode {
    Valid,
    Rejected(&'static str),
    /// Reply with this HTTP status and an error body
    Status(u16),
    /// 200 with a body that isn't the expected JSON
    Garbage,
    /// Sleep this many milliseconds, then answer as `Valid`
    Slow(u64),
}

pub struct MockClassifierServer {
    port: u16,
    running: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MockClassifierServer {
    pub fn start(mode: MockMode) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        listener.set_nonblocking(true)?;

        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        thread::spawn(move || handle_connection(stream, mode));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockClassifierServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_connection(mut stream: TcpStream, mode: MockMode) {
    // Accepted sockets can inherit non-blocking mode on some platforms
    let _ = stream.set_nonblocking(false);
    let mut buffer = [0; 8192];
    let Ok(n) = stream.read(&mut buffer) else {
        return;
    };
    let request = String::from_utf8_lossy(&buffer[..n]);
    let first_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 {
        send_response(&mut stream, 400, "Bad Request", r#"{"error":"invalid request"}"#);
        return;
    }
    let (method, path) = (parts[0], parts[1]);

    if method != "POST" {
        send_response(&mut stream, 405, "Method Not Allowed", r#"{"error":"method not allowed"}"#);
        return;
    }

    match mode {
        MockMode::Status(code) => {
            send_response(&mut stream, code, "Error", r#"{"error":"mock failure"}"#);
            return;
        }
        MockMode::Garbage => {
            send_response(&mut stream, 200, "OK", "<html>definitely not json</html>");
            return;
        }
        MockMode::Slow(ms) => thread::sleep(Duration::from_millis(ms)),
        MockMode::Valid | MockMode::Rejected(_) => {}
    }

    let body = if path.ends_with("/verify") {
        match mode {
            MockMode::Rejected(reason) => format!(r#"{{"valid":false,"reason":"{}"}}"#, reason),
            _ => r#"{"valid":true}"#.to_string(),
        }
    } else if path.ends_with("/extract") {
        r#"{"productName":"Milk 1L","currentPrice":"2,990","originalPrice":null}"#.to_string()
    } else {
        send_response(&mut stream, 404, "Not Found", r#"{"error":"endpoint not found"}"#);
        return;
    };
    send_response(&mut stream, 200, "OK", &body);
}

fn send_response(stream: &mut TcpStream, status: u16, status_text: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
