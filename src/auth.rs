//! Credentials for `401` and `407` challenges.

use std::fmt;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;

/// Which party challenged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthTarget {
    /// The origin server (`401`, `www-authenticate`).
    Server,
    /// The proxy (`407`, `proxy-authenticate`).
    Proxy,
}

impl AuthTarget {
    /// Header carrying the challenge.
    pub fn challenge_header(&self) -> &'static str {
        match self {
            AuthTarget::Server => "WWW-Authenticate",
            AuthTarget::Proxy => "Proxy-Authenticate",
        }
    }

    /// Header carrying the answer.
    pub fn credentials_header(&self) -> &'static str {
        match self {
            AuthTarget::Server => "Authorization",
            AuthTarget::Proxy => "Proxy-Authorization",
        }
    }
}

/// Everything known about a challenge when asking for credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest<'a> {
    /// Host that challenged (origin or proxy).
    pub host: &'a str,
    /// Port that challenged.
    pub port: u16,
    /// Scheme of the request uri, `http` or `https`.
    pub protocol: &'a str,
    /// The `realm` parameter, if any.
    pub realm: Option<&'a str>,
    /// Challenge scheme, e.g. `Basic`.
    pub scheme: &'a str,
    /// Server or proxy.
    pub target: AuthTarget,
}

/// A username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// New credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Header value for the `Basic` scheme.
    pub fn basic(&self) -> String {
        basic_value(&self.username, &self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

pub(crate) fn basic_value(user: &str, pass: &str) -> String {
    let creds = BASE64_STANDARD.encode(format!("{}:{}", user, pass));
    format!("Basic {}", creds)
}

/// Supplies credentials for a challenge.
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Credentials for the challenge, or `None` to give up and hand the
    /// `401`/`407` response to the caller.
    fn resolve(&self, request: &AuthRequest<'_>) -> Option<Credentials>;
}

/// One parsed `<scheme> [param=value, ...]` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Challenge {
    pub scheme: String,
    pub realm: Option<String>,
}

/// Parse the first challenge out of a `www-authenticate` value.
pub(crate) fn parse_challenge(value: &str) -> Option<Challenge> {
    let value = value.trim();
    let (scheme, params) = match value.find(char::is_whitespace) {
        Some(i) => (&value[..i], value[i..].trim_start()),
        None => (value, ""),
    };

    if scheme.is_empty() || scheme.contains('=') {
        return None;
    }

    Some(Challenge {
        scheme: scheme.to_string(),
        realm: find_param(params, "realm"),
    })
}

fn find_param(params: &str, name: &str) -> Option<String> {
    let mut rest = params;

    while !rest.is_empty() {
        let eq = rest.find('=')?;
        let key = rest[..eq].trim().trim_start_matches(',').trim();
        rest = rest[eq + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"')?;
            let v = &quoted[..end];
            rest = &quoted[end + 1..];
            v
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let v = rest[..end].trim();
            rest = &rest[end..];
            v
        };

        if key.eq_ignore_ascii_case(name) {
            return Some(value.to_string());
        }

        rest = rest.trim_start().trim_start_matches(',');
    }

    None
}
