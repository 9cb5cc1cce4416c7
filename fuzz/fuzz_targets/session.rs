#![no_main]

use std::io::{self, Cursor, Read, Write};
use std::time::Duration;

use http1_session::client::Client;
use http1_session::http::Method;
use http1_session::transport::{Connection, Dialer};
use libfuzzer_sys::fuzz_target;

// HTTP methods to randomly choose from
const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];

// Request headers that change how the session frames and sends
const RELEVANT_REQUEST_HEADERS: &[(&str, &[&str])] = &[
    ("content-length", &["3", "10"]),
    ("transfer-encoding", &["chunked"]),
    ("connection", &["close", "keep-alive"]),
    ("accept-encoding", &["gzip", "identity"]),
    ("authorization", &["Basic dXNlcjpwYXNz", "Bearer token123"]),
];

// Response headers that drive framing and the retry decision
const RELEVANT_RESPONSE_HEADERS: &[(&str, &[&str])] = &[
    ("content-length", &["0", "5", "100", "-1", "x"]),
    ("transfer-encoding", &["chunked", "gzip, chunked"]),
    ("content-encoding", &["gzip"]),
    ("connection", &["close", "keep-alive"]),
    (
        "location",
        &[
            "http://example.com/redirect",
            "/relative/path",
            "../parent/path",
            "https://other.test/",
            "http://",
        ],
    ),
    ("www-authenticate", &["Basic realm=\"x\"", "Digest nonce=1"]),
];

// Status codes to randomly choose from
const STATUS_CODES: &[u16] = &[
    100, 200, 204, // Informational and success
    300, 301, 302, 303, 304, 305, // Redirects
    401, 404, 407, // Client errors
    500, // Server errors
];

/// Answers every dial with the same canned bytes.
#[derive(Debug)]
struct CannedDialer(Vec<u8>);

impl Dialer for CannedDialer {
    fn connect(&self, _: &str, _: u16, _: Option<Duration>) -> io::Result<Box<dyn Connection>> {
        Ok(Box::new(CannedConnection(Cursor::new(self.0.clone()))))
    }
}

#[derive(Debug)]
struct CannedConnection(Cursor<Vec<u8>>);

impl Read for CannedConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for CannedConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for CannedConnection {
    fn set_timeout(&mut self, _: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

fuzz_target!(|data: &[u8]| {
    // Ensure we have enough data to work with
    if data.len() < 17 {
        return;
    }

    let client = Client::builder()
        .dialer(CannedDialer(response(data)))
        .build();

    let Ok(mut session) = client.open("http://example.com/test") else {
        return;
    };

    // Use the first byte to select a method
    let method = METHODS[(data[0] as usize) % METHODS.len()];
    let Ok(method) = Method::from_bytes(method.as_bytes()) else {
        return;
    };
    let _ = session.set_method(method);

    // Use the second byte to determine how many headers to add
    let header_count = (data[1] as usize) % 4;
    for i in 0..header_count {
        let (name, values) =
            RELEVANT_REQUEST_HEADERS[(data[2 + i] as usize) % RELEVANT_REQUEST_HEADERS.len()];
        let value = values[(data[3 + i] as usize) % values.len()];
        let _ = session.add_header(name, value);
    }

    match data[6] % 3 {
        1 => {
            let _ = session.set_chunked_streaming_mode(4);
        }
        2 => {
            let _ = session.set_fixed_length_streaming_mode(3);
        }
        _ => {}
    }

    if let Ok(mut out) = session.output_stream() {
        let _ = out.write_all(&data[7..10]);
        let _ = out.finish();
    }

    if session.response_code().is_err() {
        return;
    }
    let _ = session.response_message();

    let mut sink = Vec::new();
    match session.input_stream() {
        Ok(mut body) => {
            let _ = body.read_to_end(&mut sink);
        }
        Err(_) => {
            if let Some(mut body) = session.error_stream() {
                let _ = body.read_to_end(&mut sink);
            }
        }
    }
});

// Status line and headers picked from the fuzz data, followed by the raw
// remainder as body
fn response(data: &[u8]) -> Vec<u8> {
    let status = STATUS_CODES[(data[10] as usize) % STATUS_CODES.len()];
    let mut out = format!("HTTP/1.1 {} Fuzz\r\n", status);

    let header_count = (data[11] as usize) % 4;
    for i in 0..header_count {
        let (name, values) =
            RELEVANT_RESPONSE_HEADERS[(data[12 + i] as usize) % RELEVANT_RESPONSE_HEADERS.len()];
        let value = values[(data[13 + i] as usize) % values.len()];
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");

    let mut out = out.into_bytes();
    out.extend_from_slice(&data[17..]);
    out
}
