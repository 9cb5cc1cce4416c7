//! Decides whether a completed response ends the request or starts another
//! exchange.
//!
//! | Status | Condition | Outcome |
//! |---|---|---|
//! | 401 | `www-authenticate`, credentials resolvable | add `authorization`, same connection |
//! | 407 | request went through a proxy, `proxy-authenticate` | add `proxy-authorization`, same connection |
//! | 300-303, 305 | following redirects, body replayable, `location` | new uri (or proxy for 305) |
//! | 300-303, 305 | 5 redirects already followed | [`Error::TooManyRedirects`] |
//! | other | | final response |
//!
//! A `connection: close` on the response turns "same connection" into
//! "new connection".

use http::{header, Method, StatusCode, Uri};

use crate::auth::{parse_challenge, AuthRequest, AuthTarget, Authenticator};
use crate::config::MAX_REDIRECTS;
use crate::ext::{resolve_location, StatusExt, UriExt};
use crate::header::HeaderTable;
use crate::proxy::Proxy;
use crate::Error;

/// What to do after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// The response is final.
    None,
    /// Send a follow-up request on the same socket.
    SameConnection,
    /// Close the socket and send the follow-up on a fresh one.
    NewConnection,
}

/// Change to apply to the request before retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Set a credentials header.
    Authorize {
        /// `Authorization` or `Proxy-Authorization`.
        header: &'static str,
        /// Header value.
        value: String,
    },
    /// Follow a redirect.
    Redirect {
        /// The resolved target.
        uri: Uri,
        /// Method for the follow-up request.
        method: Method,
        /// Target is on another scheme, host or port.
        cross_origin: bool,
    },
    /// `305 Use Proxy`.
    UseProxy(Proxy),
}

/// Outcome of [`decide()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// How to continue.
    pub retry: Retry,
    /// What to change first.
    pub mutation: Option<Mutation>,
}

impl Decision {
    fn done() -> Self {
        Decision {
            retry: Retry::None,
            mutation: None,
        }
    }
}

/// Retry bookkeeping across the exchanges of one logical request.
#[derive(Debug, Default, Clone)]
pub struct RetryState {
    redirects: u32,
    server_credentials: Option<String>,
    proxy_credentials: Option<String>,
}

impl RetryState {
    /// Redirects followed so far.
    pub fn redirects(&self) -> u32 {
        self.redirects
    }

    fn sent(&mut self, target: AuthTarget) -> &mut Option<String> {
        match target {
            AuthTarget::Server => &mut self.server_credentials,
            AuthTarget::Proxy => &mut self.proxy_credentials,
        }
    }
}

/// The facts about a completed exchange.
#[derive(Debug)]
pub struct RetryInput<'a> {
    /// Request method.
    pub method: &'a Method,
    /// Request uri.
    pub uri: &'a Uri,
    /// Proxy the request went through.
    pub proxy: &'a Proxy,
    /// The request body went straight to the socket and cannot be re-sent.
    pub streaming_body: bool,
    /// Redirects are followed.
    pub follow_redirects: bool,
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: &'a HeaderTable,
}

/// Map a response to a [`Decision`].
pub fn decide(
    input: &RetryInput<'_>,
    state: &mut RetryState,
    authenticator: Option<&dyn Authenticator>,
) -> Result<Decision, Error> {
    let decision = match input.status {
        StatusCode::UNAUTHORIZED => authenticate(input, state, authenticator, AuthTarget::Server)?,
        StatusCode::PROXY_AUTHENTICATION_REQUIRED if !input.proxy.is_direct() => {
            authenticate(input, state, authenticator, AuthTarget::Proxy)?
        }
        s if s.is_followed_redirect() => redirect(input, state)?,
        _ => Decision::done(),
    };

    debug!("Response {} => {:?}", input.status, decision.retry);

    Ok(decision)
}

fn connection_retry(headers: &HeaderTable) -> Retry {
    if headers.has_token(header::CONNECTION.as_str(), "close") {
        Retry::NewConnection
    } else {
        Retry::SameConnection
    }
}

fn authenticate(
    input: &RetryInput<'_>,
    state: &mut RetryState,
    authenticator: Option<&dyn Authenticator>,
    target: AuthTarget,
) -> Result<Decision, Error> {
    let Some(authenticator) = authenticator else {
        return Ok(Decision::done());
    };

    let (host, port) = match (target, input.proxy) {
        (AuthTarget::Proxy, Proxy::Http { host, port }) => (host.as_str(), *port),
        (AuthTarget::Proxy, Proxy::Direct) => return Ok(Decision::done()),
        (AuthTarget::Server, _) => (input.uri.host_or_err()?, input.uri.port_or_default()),
    };

    for value in input.headers.get_all(target.challenge_header()) {
        let Some(challenge) = parse_challenge(value) else {
            continue;
        };

        if !challenge.scheme.eq_ignore_ascii_case("basic") {
            debug!("Skip unsupported auth scheme: {}", challenge.scheme);
            continue;
        }

        let request = AuthRequest {
            host,
            port,
            protocol: input.uri.scheme_or_http().as_str(),
            realm: challenge.realm.as_deref(),
            scheme: &challenge.scheme,
            target,
        };

        let Some(credentials) = authenticator.resolve(&request) else {
            debug!("No credentials for {:?} challenge", target);
            return Ok(Decision::done());
        };

        let value = credentials.basic();

        let sent = state.sent(target);
        if sent.as_deref() == Some(value.as_str()) {
            debug!("Credentials for {:?} were already rejected", target);
            return Ok(Decision::done());
        }

        if input.streaming_body {
            return Err(Error::StreamedBodyNotRetryable(input.status.as_u16()));
        }

        *sent = Some(value.clone());

        return Ok(Decision {
            retry: connection_retry(input.headers),
            mutation: Some(Mutation::Authorize {
                header: target.credentials_header(),
                value,
            }),
        });
    }

    Ok(Decision::done())
}

fn redirect(input: &RetryInput<'_>, state: &mut RetryState) -> Result<Decision, Error> {
    if !input.follow_redirects {
        return Ok(Decision::done());
    }

    if input.streaming_body {
        debug!("Not following redirect, request body was streamed");
        return Ok(Decision::done());
    }

    let Some(location) = input.headers.get(header::LOCATION.as_str()) else {
        return Ok(Decision::done());
    };

    if state.redirects >= MAX_REDIRECTS {
        return Err(Error::TooManyRedirects);
    }
    state.redirects += 1;

    if input.status == StatusCode::USE_PROXY {
        return Ok(match Proxy::from_use_proxy_location(input.uri, location) {
            Some(proxy) => Decision {
                retry: Retry::NewConnection,
                mutation: Some(Mutation::UseProxy(proxy)),
            },
            None => {
                debug!("Ignore unusable 305 location: {}", location);
                Decision::done()
            }
        });
    }

    let uri = resolve_location(input.uri, location)?;

    if uri.scheme_or_http() != input.uri.scheme_or_http() {
        debug!("Not following redirect to other scheme: {}", uri);
        return Ok(Decision::done());
    }

    let method = if input.status == StatusCode::SEE_OTHER && *input.method != Method::HEAD {
        Method::GET
    } else {
        input.method.clone()
    };

    let same_origin = input.uri.same_origin(&uri);
    let retry = if same_origin {
        connection_retry(input.headers)
    } else {
        Retry::NewConnection
    };

    Ok(Decision {
        retry,
        mutation: Some(Mutation::Redirect {
            uri,
            method,
            cross_origin: !same_origin,
        }),
    })
}
