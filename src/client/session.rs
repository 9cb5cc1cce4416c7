use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};

use super::{Client, RequestBody, ResponseBody};
use crate::auth::basic_value;
use crate::body::{content_length, is_chunked, BodyOptions, BodyReader, BodyWriter};
use crate::cache::CacheWriter;
use crate::ext::{MethodExt, StatusExt, UriExt};
use crate::head::{parse_status_line, read_response_head, StatusLine};
use crate::header::HeaderTable;
use crate::pool::{ConnectionKey, PooledConnection};
use crate::proxy::Proxy;
use crate::retry::{self, Decision, Mutation, Retry, RetryInput, RetryState};
use crate::transport::ShutdownHandle;
use crate::util::log_data;
use crate::{CloseReason, Error};

/// Where a session is in its lifecycle.
///
/// The retry loop moves back from `AwaitingResponse` to `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum State {
    Unsent,
    Connecting,
    HeadersSent,
    BodySent,
    AwaitingResponse,
    ResponseReceived,
}

/// The final response head.
#[derive(Debug)]
struct Response {
    line: StatusLine,
    headers: HeaderTable,
}

/// One logical HTTP request and its final response.
///
/// Created by [`Client::open`]. See the [module docs](super) for the
/// lifecycle.
pub struct Session {
    client: Client,
    state: State,
    failed: bool,

    uri: Uri,
    method: Method,
    request: HeaderTable,
    follow_redirects: bool,
    use_caches: bool,
    http10: bool,
    fixed_length: Option<u64>,
    chunk_size: Option<usize>,
    writer: Option<BodyWriter>,
    output_taken: bool,

    connection: Option<PooledConnection>,
    proxy: Proxy,
    proxy_override: Option<Proxy>,
    response_started: bool,
    stale_retry_used: bool,
    dial_fresh: bool,
    transparent_gzip: bool,
    cancel: CancelHandle,
    retry: RetryState,

    response: Option<Response>,
    reader: Option<BodyReader>,
    gunzip: bool,
    cached_body: Option<Box<dyn io::Read + Send>>,
    cache_writer: Option<Box<dyn CacheWriter>>,
    input_taken: bool,
}

impl Session {
    pub(crate) fn new(client: Client, uri: Uri) -> Self {
        let config = &client.config;

        Session {
            state: State::Unsent,
            failed: false,
            method: Method::GET,
            request: HeaderTable::with_defaults(&config.default_headers),
            follow_redirects: config.follow_redirects,
            use_caches: config.use_caches,
            http10: config.version == Version::HTTP_10,
            fixed_length: None,
            chunk_size: None,
            writer: None,
            output_taken: false,
            connection: None,
            proxy: Proxy::Direct,
            proxy_override: None,
            response_started: false,
            stale_retry_used: false,
            dial_fresh: false,
            transparent_gzip: false,
            cancel: CancelHandle::default(),
            retry: RetryState::default(),
            response: None,
            reader: None,
            gunzip: false,
            cached_body: None,
            cache_writer: None,
            input_taken: false,
            client,
            uri,
        }
    }

    /// The request uri. Changes when a redirect is followed.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The proxy of the last exchange, [`Proxy::Direct`] if none.
    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    /// Set the request method. Defaults to `GET`.
    ///
    /// Fails once the output stream was taken, the body is framed for the
    /// method it was written under.
    pub fn set_method(&mut self, method: Method) -> Result<(), Error> {
        self.check_body_mode()?;
        self.method = method;
        Ok(())
    }

    /// Replace all request headers named `key`.
    pub fn set_header(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.check_unsent()?;
        check_header(key, value)?;
        self.request.set(key, value);
        Ok(())
    }

    /// Add a request header, keeping earlier ones with the same name.
    pub fn add_header(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.check_unsent()?;
        check_header(key, value)?;
        self.request.add(key, value);
        Ok(())
    }

    /// Last request header named `key`.
    pub fn request_header(&self, key: &str) -> Option<&str> {
        self.request.get(key)
    }

    /// All request headers set so far.
    ///
    /// Headers synthesized at send time (`host`, `user-agent` etc.) are
    /// not included.
    pub fn request_headers(&self) -> &HeaderTable {
        &self.request
    }

    /// Follow redirects for this request. Defaults to the client config.
    pub fn set_follow_redirects(&mut self, v: bool) -> Result<(), Error> {
        self.check_unsent()?;
        self.follow_redirects = v;
        Ok(())
    }

    /// Consult the response cache for this request. Defaults to the client
    /// config.
    pub fn set_use_caches(&mut self, v: bool) -> Result<(), Error> {
        self.check_unsent()?;
        self.use_caches = v;
        Ok(())
    }

    /// Stream a body of exactly `length` bytes.
    ///
    /// The request head is sent when the output stream is obtained, and
    /// the body cannot be re-sent for redirects or auth challenges.
    pub fn set_fixed_length_streaming_mode(&mut self, length: u64) -> Result<(), Error> {
        self.check_body_mode()?;
        self.fixed_length = Some(length);
        Ok(())
    }

    /// Stream the body with chunked transfer encoding. A size of 0 means
    /// the configured default.
    ///
    /// Ignored for HTTP/1.0 requests, which buffer the body instead.
    pub fn set_chunked_streaming_mode(&mut self, chunk_size: usize) -> Result<(), Error> {
        self.check_body_mode()?;
        self.chunk_size = Some(if chunk_size == 0 {
            self.client.config.chunk_size
        } else {
            chunk_size
        });
        Ok(())
    }

    /// Handle for aborting this session from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Stream for the request body.
    ///
    /// Only methods that carry a body (`POST`, `PUT`, `PATCH`) have one,
    /// and it can be obtained once.
    pub fn output_stream(&mut self) -> Result<RequestBody<'_>, Error> {
        if self.output_taken {
            return Err(Error::OutputStreamTaken);
        }
        self.check_unsent()?;
        if !self.method.allows_request_body() {
            return Err(Error::MethodHasNoBody(self.method.clone()));
        }

        let chunked_requested = is_chunked(&self.request);
        let opts = BodyOptions {
            fixed_length: self.fixed_length,
            chunk_size: self
                .chunk_size
                .or_else(|| chunked_requested.then_some(self.client.config.chunk_size)),
            chunked_requested,
            content_length: content_length(&self.request),
            http10: self.http10,
        };

        let writer = BodyWriter::select(&opts);
        debug!("Request body: {:?}", writer);

        let streaming = writer.is_streaming();
        self.writer = Some(writer);
        self.output_taken = true;

        if streaming {
            // The framing is known, so the head goes out right away.
            self.run_guarded(|s| {
                s.connect(false)?;
                s.send_head()
            })?;
        }

        Ok(RequestBody::new(self))
    }

    pub(crate) fn write_body(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let writer = self.writer.as_mut().ok_or(Error::OutputStreamTaken)?;
        if !writer.is_streaming() {
            return writer.write(buf, &mut io::sink());
        }

        let conn = self.connection.as_mut().ok_or(Error::ConnectionClosed)?;
        let r = writer.write(buf, conn);
        if r.is_err() {
            conn.mark_not_reusable(CloseReason::IncompleteRequestBody);
        }
        r
    }

    pub(crate) fn flush_body(&mut self) -> Result<(), Error> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        match self.connection.as_mut() {
            Some(conn) if writer.is_streaming() => writer.flush(conn),
            _ => Ok(()),
        }
    }

    pub(crate) fn finish_body(&mut self) -> Result<(), Error> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        if writer.is_ended() {
            return Ok(());
        }
        if !writer.is_streaming() {
            return writer.finish(&mut io::sink());
        }

        let conn = self.connection.as_mut().ok_or(Error::ConnectionClosed)?;
        let r = writer.finish(conn);
        if r.is_err() {
            conn.mark_not_reusable(CloseReason::IncompleteRequestBody);
        }
        r
    }

    /// Send the request and follow redirects and auth challenges until
    /// there is a final response.
    ///
    /// Every response accessor calls this. Repeated calls return at once.
    pub fn execute(&mut self) -> Result<(), Error> {
        if self.state == State::ResponseReceived {
            return Ok(());
        }
        if self.failed {
            return Err(Error::ConnectionClosed);
        }
        self.run_guarded(Session::run)
    }

    /// Status of the final response.
    pub fn response_code(&mut self) -> Result<StatusCode, Error> {
        self.execute()?;
        Ok(self.final_response()?.line.status)
    }

    /// Reason phrase of the final response, e.g. `Not Found`.
    pub fn response_message(&mut self) -> Result<&str, Error> {
        self.execute()?;
        Ok(&self.final_response()?.line.reason)
    }

    /// HTTP version of the final response.
    pub fn response_version(&mut self) -> Result<Version, Error> {
        self.execute()?;
        Ok(self.final_response()?.line.version)
    }

    /// Status line and headers of the final response.
    pub fn response_headers(&mut self) -> Result<&HeaderTable, Error> {
        self.execute()?;
        Ok(&self.final_response()?.headers)
    }

    /// Last response header named `key`.
    pub fn header_field(&mut self, key: &str) -> Result<Option<&str>, Error> {
        Ok(self.response_headers()?.get(key))
    }

    /// Body of a successful response.
    ///
    /// A status of 400 or above is an [`Error::HttpStatus`], the body is
    /// then available from [`Session::error_stream`].
    pub fn input_stream(&mut self) -> Result<ResponseBody, Error> {
        self.execute()?;
        if self.input_taken {
            return Err(Error::InputStreamTaken);
        }

        let status = self.final_response()?.line.status;
        if status.as_u16() >= 400 {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        Ok(self.take_body())
    }

    /// Body of a failed response (status 400 or above), if it has one.
    ///
    /// Does not send the request.
    pub fn error_stream(&mut self) -> Option<ResponseBody> {
        if self.state != State::ResponseReceived || self.input_taken {
            return None;
        }

        let status = self.response.as_ref()?.line.status;
        if status.as_u16() < 400 {
            return None;
        }

        let empty = self.cached_body.is_none()
            && self.reader.as_ref().map_or(true, |r| r.is_ended());
        if empty {
            return None;
        }

        Some(self.take_body())
    }

    /// Close the connection, if the session holds one.
    pub fn disconnect(&mut self) {
        self.drop_connection(CloseReason::ClientConnectionClose);
    }

    fn check_unsent(&self) -> Result<(), Error> {
        if self.state > State::Unsent {
            return Err(Error::HeadersAlreadySent);
        }
        Ok(())
    }

    fn check_body_mode(&self) -> Result<(), Error> {
        if self.output_taken {
            return Err(Error::OutputStreamTaken);
        }
        self.check_unsent()
    }

    fn writer_is_streaming(&self) -> bool {
        self.writer.as_ref().map_or(false, |w| w.is_streaming())
    }

    fn final_response(&self) -> Result<&Response, Error> {
        self.response.as_ref().ok_or(Error::ConnectionClosed)
    }

    fn take_body(&mut self) -> ResponseBody {
        self.input_taken = true;

        if let Some(body) = self.cached_body.take() {
            return ResponseBody::cached(body);
        }

        ResponseBody::wire(
            self.connection.take(),
            self.reader.take().unwrap_or_else(|| BodyReader::fixed(0)),
            self.client.pool.clone(),
            self.gunzip,
            self.cache_writer.take(),
        )
    }

    /// Run `f`, closing the connection and poisoning the session if it fails.
    fn run_guarded(&mut self, f: impl FnOnce(&mut Session) -> Result<(), Error>) -> Result<(), Error> {
        let r = f(self);
        if let Err(e) = &r {
            debug!("Request to {} failed: {}", self.uri, e);
            self.failed = true;
            self.drop_connection(CloseReason::ExchangeFailed);
        }
        r
    }

    fn run(&mut self) -> Result<(), Error> {
        if self.state == State::Unsent && self.serve_from_cache() {
            return Ok(());
        }

        // A buffered body is complete once the request executes, which
        // fixes its content-length.
        if let Some(writer) = &mut self.writer {
            if !writer.is_streaming() && !writer.is_ended() {
                writer.finish(&mut io::sink())?;
            }
        }

        loop {
            let (line, headers) = match self.exchange() {
                Ok(head) => head,
                Err(e) if self.can_redo_on_fresh(&e) => {
                    debug!("Pooled connection failed ({}), retry on a new one", e);
                    self.stale_retry_used = true;
                    self.drop_connection(CloseReason::ExchangeFailed);
                    self.state = State::Connecting;
                    self.connect(true)?;
                    self.exchange()?
                }
                Err(e) => return Err(e),
            };

            self.store_cookies(&headers);

            if line.version == Version::HTTP_10 && !self.http10 {
                debug!("Server speaks HTTP/1.0, downgrade");
                self.http10 = true;
            }

            let reader = BodyReader::for_response(&self.method, line.status, &headers);
            self.mark_connection(&headers, &reader);

            let input = RetryInput {
                method: &self.method,
                uri: &self.uri,
                proxy: &self.proxy,
                streaming_body: self.writer_is_streaming(),
                follow_redirects: self.follow_redirects,
                status: line.status,
                headers: &headers,
            };
            let authenticator = self.client.authenticator.as_deref();
            let Decision { retry: next, mutation } =
                retry::decide(&input, &mut self.retry, authenticator)?;

            if next == Retry::None {
                self.finish_exchange(line, headers, reader);
                return Ok(());
            }

            self.discard_body(next, reader);

            if let Some(mutation) = mutation {
                self.apply(mutation);
            }

            self.state = State::Connecting;
            self.response_started = false;
        }
    }

    /// One request and response head, on the held connection or a new one.
    fn exchange(&mut self) -> Result<(StatusLine, HeaderTable), Error> {
        if self.connection.is_none() {
            let fresh = std::mem::take(&mut self.dial_fresh);
            self.connect(fresh)?;
        }
        if self.state < State::HeadersSent {
            self.send_head()?;
        }
        self.send_body()?;

        self.state = State::AwaitingResponse;
        self.read_head()
    }

    fn can_redo_on_fresh(&self, e: &Error) -> bool {
        let recycled = self.connection.as_ref().map_or(false, |c| c.was_recycled());
        let resendable = !self.writer_is_streaming();

        recycled && resendable && e.is_transport() && !self.response_started && !self.stale_retry_used
    }

    /// Get a connection for the current uri. `fresh` bypasses idle connections.
    fn connect(&mut self, fresh: bool) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }

        self.state = State::Connecting;

        let mut proxies = match (&self.proxy_override, &self.client.config.proxy) {
            (Some(p), _) | (None, Some(p)) => vec![p.clone()],
            (None, None) => self.client.proxy_selector.select(&self.uri),
        };
        if proxies.is_empty() {
            proxies.push(Proxy::Direct);
        }

        let config = &self.client.config;
        let proxy_auth = self.request.get(header::PROXY_AUTHORIZATION.as_str());
        let mut last_err = None;

        for proxy in proxies {
            let key = ConnectionKey::new(&self.uri, &proxy)?;

            let result = if fresh {
                self.client.pool.connect_fresh(&key, config.connect_timeout, proxy_auth)
            } else {
                self.client.pool.get(&key, config.connect_timeout, proxy_auth)
            };

            match result {
                Ok(mut conn) => {
                    conn.set_timeout(config.read_timeout)?;
                    self.cancel.set(conn.shutdown_handle());
                    self.connection = Some(conn);
                    self.proxy = proxy;
                    return Ok(());
                }
                Err(e) if !proxy.is_direct() && e.is_transport() => {
                    let err: io::Error = e.into();
                    warn!("Proxy {} failed: {}", proxy, err);
                    self.client.proxy_selector.notify_failed(&self.uri, &proxy, &err);
                    last_err = Some(Error::from_io(err));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or(Error::ConnectionClosed))
    }

    fn send_head(&mut self) -> Result<(), Error> {
        let plain_proxy = self
            .connection
            .as_ref()
            .ok_or(Error::ConnectionClosed)?
            .key()
            .is_plain_proxy();

        let headers = self.prepare_headers(plain_proxy)?;
        self.transparent_gzip = cfg!(feature = "gzip")
            && !self.request.contains(header::ACCEPT_ENCODING.as_str());

        let mut out = Vec::with_capacity(512);
        headers.write_to(&mut out)?;
        log_data(&out);

        let conn = self.connection.as_mut().ok_or(Error::ConnectionClosed)?;
        conn.write_all(&out)?;
        conn.flush()?;

        self.state = State::HeadersSent;
        Ok(())
    }

    /// The request headers plus everything synthesized at send time.
    fn prepare_headers(&self, plain_proxy: bool) -> Result<HeaderTable, Error> {
        let config = &self.client.config;
        let mut h = self.request.clone();

        let target = if plain_proxy {
            let host = self.uri.host_header().ok_or_else(|| Error::BadUri(self.uri.to_string()))?;
            format!("{}://{}{}", self.uri.scheme_or_http(), host, self.uri.origin_form())
        } else {
            self.uri.origin_form().to_string()
        };
        let version = if self.http10 { "HTTP/1.0" } else { "HTTP/1.1" };
        h.set_status_line(format!("{} {} {}", self.method, target, version));

        // Synthesized names go out in canonical case, like the ones retries add.
        if let Some(host) = self.uri.host_header() {
            h.add_if_absent("Host", host);
        }
        h.add_if_absent("User-Agent", config.user_agent.as_str());
        if !self.http10 && config.keep_alive {
            h.add_if_absent("Connection", "Keep-Alive");
        }
        h.add_if_absent("Accept", "*/*");
        if cfg!(feature = "gzip") {
            h.add_if_absent("Accept-Encoding", "gzip");
        }

        if let Some(writer) = &self.writer {
            h.add_if_absent("Content-Type", "application/x-www-form-urlencoded");
            let (key, value) = writer.framing_header();
            h.remove_all(header::CONTENT_LENGTH.as_str());
            h.remove_all(header::TRANSFER_ENCODING.as_str());
            h.add(key, value);
        }

        // Tunnels carry it in the CONNECT, the origin never sees it.
        if !plain_proxy {
            h.remove_all(header::PROXY_AUTHORIZATION.as_str());
        }

        if !h.contains(header::AUTHORIZATION.as_str()) {
            if let Some((user, pass)) = self.uri.userinfo() {
                h.add("Authorization", basic_value(user, pass));
            }
        }

        if let Some(store) = &self.client.cookies {
            match store.get(&self.uri, &h) {
                Ok(cookies) => {
                    for (key, values) in cookies {
                        for value in values {
                            h.add(key.as_str(), value);
                        }
                    }
                }
                Err(e) => warn!("Cookie store get failed: {}", e),
            }
        }

        Ok(h)
    }

    fn send_body(&mut self) -> Result<(), Error> {
        let Some(writer) = self.writer.as_mut() else {
            self.state = State::BodySent;
            return Ok(());
        };
        let conn = self.connection.as_mut().ok_or(Error::ConnectionClosed)?;

        let r = match writer {
            BodyWriter::Retryable(buffer) => buffer.transmit(conn),
            w if !w.is_ended() => w.finish(conn),
            _ => Ok(()),
        };

        if r.is_err() {
            conn.mark_not_reusable(CloseReason::IncompleteRequestBody);
        }
        r?;

        self.state = State::BodySent;
        Ok(())
    }

    /// Read the response head, skipping intermediate `1xx` responses.
    fn read_head(&mut self) -> Result<(StatusLine, HeaderTable), Error> {
        let conn = self.connection.as_mut().ok_or(Error::ConnectionClosed)?;

        if conn.fill_buf().map_err(Error::from_io)?.is_empty() {
            return Err(Error::ConnectionClosed);
        }
        self.response_started = true;

        loop {
            let (line, headers) = read_response_head(conn)?;
            trace!("{:?}", headers);

            if line.status.is_informational_only() {
                debug!("Skip {} response", line.status);
                continue;
            }

            debug!("Response {} from {}", line.status, self.uri);
            return Ok((line, headers));
        }
    }

    /// Record why the held connection can't be reused after this exchange.
    fn mark_connection(&mut self, headers: &HeaderTable, reader: &BodyReader) {
        let client_close = self
            .request
            .has_token(header::CONNECTION.as_str(), "close");
        let Some(conn) = self.connection.as_mut() else {
            return;
        };

        if self.http10 {
            conn.mark_not_reusable(CloseReason::Http10);
        }
        if client_close {
            conn.mark_not_reusable(CloseReason::ClientConnectionClose);
        }
        if headers.has_token(header::CONNECTION.as_str(), "close") {
            conn.mark_not_reusable(CloseReason::ServerConnectionClose);
        }
        if reader.is_close_delimited() {
            conn.mark_not_reusable(CloseReason::CloseDelimitedBody);
        }
        if self.writer.as_ref().map_or(false, |w| !w.is_ended()) {
            conn.mark_not_reusable(CloseReason::IncompleteRequestBody);
        }
    }

    /// Drop an intermediate response so the next exchange can start.
    fn discard_body(&mut self, retry: Retry, mut reader: BodyReader) {
        let keep = retry == Retry::SameConnection
            && self.connection.as_ref().map_or(false, |c| c.is_reusable());

        if !keep {
            self.drop_connection(CloseReason::NewConnectionRetry);
            // The follow-up must not borrow another idle socket.
            self.dial_fresh = true;
            return;
        }

        let Some(conn) = self.connection.as_mut() else {
            return;
        };

        let mut buf = [0_u8; 1024];
        loop {
            match reader.read(conn, &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to discard response body: {}", e);
                    self.drop_connection(CloseReason::IncompleteResponseBody);
                    self.dial_fresh = true;
                    break;
                }
            }
        }
    }

    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Authorize { header, value } => {
                debug!("Retry with {}", header);
                self.request.set(header, value);
            }
            Mutation::Redirect {
                uri,
                method,
                cross_origin,
            } => {
                debug!("Redirect {} -> {} {}", self.uri, method, uri);

                if method != self.method {
                    self.writer = None;
                    self.request.remove_all(header::CONTENT_TYPE.as_str());
                    self.request.remove_all(header::CONTENT_LENGTH.as_str());
                    self.request.remove_all(header::TRANSFER_ENCODING.as_str());
                }
                if cross_origin {
                    self.request.remove_all(header::HOST.as_str());
                    self.request.remove_all(header::AUTHORIZATION.as_str());
                }

                self.method = method;
                self.uri = uri;
            }
            Mutation::UseProxy(proxy) => {
                debug!("Use proxy {}", proxy);
                self.proxy_override = Some(proxy);
            }
        }
    }

    fn finish_exchange(&mut self, line: StatusLine, mut headers: HeaderTable, reader: BodyReader) {
        let gzip = headers
            .get(header::CONTENT_ENCODING.as_str())
            .map_or(false, |v| v.trim().eq_ignore_ascii_case("gzip"));

        if self.transparent_gzip && gzip {
            headers.remove_all(header::CONTENT_ENCODING.as_str());
            headers.remove_all(header::CONTENT_LENGTH.as_str());
            self.gunzip = !reader.is_ended();
        }

        self.offer_to_cache(line.status, &headers);

        if reader.is_ended() {
            // Nothing to read, the connection is done.
            if let Some(conn) = self.connection.take() {
                self.client.pool.recycle(conn);
            }
        }

        self.response = Some(Response { line, headers });
        self.reader = Some(reader);
        self.state = State::ResponseReceived;
    }

    fn serve_from_cache(&mut self) -> bool {
        if !self.use_caches {
            return false;
        }
        let Some(cache) = &self.client.cache else {
            return false;
        };
        let Some(entry) = cache.get(&self.uri, &self.method, &self.request) else {
            return false;
        };

        let line = match entry.headers.status_line().map(parse_status_line) {
            Some(Ok(line)) => line,
            _ => {
                warn!("Ignore cached response without valid status line");
                return false;
            }
        };

        debug!("Serve {} {} from cache", self.method, self.uri);

        self.response = Some(Response {
            line,
            headers: entry.headers,
        });
        self.cached_body = Some(entry.body);
        self.state = State::ResponseReceived;
        true
    }

    fn offer_to_cache(&mut self, status: StatusCode, headers: &HeaderTable) {
        if !self.use_caches || self.method != Method::GET || status != StatusCode::OK {
            return;
        }
        let Some(cache) = &self.client.cache else {
            return;
        };

        match cache.put(&self.uri, headers) {
            Ok(writer) => self.cache_writer = writer,
            Err(e) => warn!("Response cache put failed: {}", e),
        }
    }

    fn store_cookies(&self, headers: &HeaderTable) {
        if let Some(store) = &self.client.cookies {
            if let Err(e) = store.put(&self.uri, headers) {
                warn!("Cookie store put failed: {}", e);
            }
        }
    }

    fn drop_connection(&mut self, reason: CloseReason) {
        if let Some(mut conn) = self.connection.take() {
            conn.mark_not_reusable(reason);
            conn.close();
        }
        self.cancel.set(None);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // A response nobody read leaves the connection mid-body.
        self.drop_connection(CloseReason::IncompleteResponseBody);
        if let Some(writer) = self.cache_writer.take() {
            writer.abort();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("request", &self.request)
            .field("connection", &self.connection)
            .field("proxy", &self.proxy)
            .field("retry", &self.retry)
            .finish()
    }
}

fn check_header(key: &str, value: &str) -> Result<(), Error> {
    HeaderName::from_bytes(key.as_bytes()).map_err(|_| Error::BadHeader(key.to_string()))?;
    HeaderValue::from_str(value).map_err(|_| Error::BadHeader(format!("{}: {}", key, value)))?;
    Ok(())
}

/// Aborts a session from another thread.
///
/// Cancelling shuts down the socket the session currently uses, so a
/// blocked read or write fails with [`Error::ConnectionClosed`]. A session
/// that has not connected yet fails when it tries to.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    shutdown: Mutex<Option<ShutdownHandle>>,
}

impl CancelHandle {
    /// Abort the session.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let lock = self.inner.shutdown.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = lock.as_ref() {
            debug!("Cancel session, shut down socket");
            handle.shutdown();
        }
    }

    /// Tell if [`CancelHandle::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn set(&self, handle: Option<ShutdownHandle>) {
        *self.inner.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = handle;
    }
}
