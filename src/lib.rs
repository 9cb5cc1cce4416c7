//! Blocking HTTP/1.1 client session engine.
//!
//! A [`Session`](client::Session) turns one logical request (method, URL,
//! headers, optional body) into zero or more wire exchanges over pooled
//! connections. Redirects, authentication challenges, transfer-encoding
//! framing and connection reuse are handled transparently until a final
//! response can be handed to the caller.
//!
//! ```text
//!            ┌──────────────┐
//!            │    Unsent    │
//!            └──────────────┘
//!                    │
//!                    ▼
//!            ┌──────────────┐
//!  ┌ ─ ─ ─ ─▶│  Connecting  │◀─ ─ ─ ─ ─ ─ ─ ─ ─ ┐
//!            └──────────────┘                    NewConnection
//!  │                 │                           │
//!                    ▼
//!  │         ┌──────────────┐                    │
//!   ─ ─ ─ ─ ▶│ HeadersSent  │◀─ ─ ─ ┐
//!            └──────────────┘        SameConnection
//!                    │               │           │
//!                    ▼
//!            ┌──────────────┐        │           │
//!            │   BodySent   │
//!            └──────────────┘        │           │
//!                    │
//!                    ▼               │           │
//!            ┌──────────────┐
//!            │   Awaiting   │─ ─ ─ ─ ┴ ─ ─ ─ ─ ─ ┘
//!            └──────────────┘   retry::decide()
//!                    │
//!                    ▼
//!            ┌──────────────┐
//!            │   Received   │
//!            └──────────────┘
//! ```
//!
//! The engine performs blocking I/O on the calling thread. The only shared
//! object is the [`ConnectionPool`](pool::ConnectionPool), which lends
//! connections to one session at a time.
//!
//! Collaborators that sit outside the engine are consumed as traits:
//!
//! * [`Connection`](transport::Connection) and [`Dialer`](transport::Dialer) for sockets (and TLS)
//! * [`ProxySelector`](proxy::ProxySelector) for proxy choice
//! * [`ResponseCache`](cache::ResponseCache) and [`CookieStore`](cache::CookieStore)
//! * [`Authenticator`](auth::Authenticator) for credentials
//!
//! # Example
//!
//! ```no_run
//! use std::io::Read;
//! use http1_session::client::Client;
//!
//! let client = Client::new();
//! let mut session = client.open("http://example.test/page").unwrap();
//! session.set_header("x-foo", "bar").unwrap();
//!
//! let status = session.response_code().unwrap();
//! let mut body = String::new();
//! session.input_stream().unwrap().read_to_string(&mut body).unwrap();
//! println!("{} {}", status, body);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

mod close_reason;
mod error;
mod ext;
mod head;
mod util;

pub mod auth;
pub mod body;
pub mod cache;
pub mod client;
pub mod config;
pub mod header;
pub mod pool;
pub mod proxy;
pub mod retry;
pub mod transport;

pub use close_reason::CloseReason;
pub use error::{Error, ErrorKind};

pub use http;
