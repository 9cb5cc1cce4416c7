use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use http::{Uri, Version};

use crate::client::test::mock::Script;
use crate::client::Client;
use crate::client::test::scenario::{read_string, Scenario};
use crate::config::Config;
use crate::proxy::{Proxy, ProxySelector, StaticProxies};
use crate::{Error, ErrorKind};

const OK: &str = "HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndone";

/// Fixed candidates, remembering failures.
#[derive(Debug, Default)]
struct Recording {
    proxies: Vec<Proxy>,
    failed: Arc<Mutex<Vec<String>>>,
}

impl ProxySelector for Recording {
    fn select(&self, _uri: &Uri) -> Vec<Proxy> {
        self.proxies.clone()
    }

    fn notify_failed(&self, _uri: &Uri, proxy: &Proxy, _err: &io::Error) {
        self.failed.lock().unwrap().push(proxy.to_string());
    }
}

#[test]
fn stale_pooled_connection_is_redone() {
    let a1 = Script::new().respond(OK);
    let a2 = Script::new().respond(OK);
    let s = Scenario::builder()
        .script("a.test", a1.clone())
        .script("a.test", a2.clone())
        .build();

    let mut first = s.open("http://a.test/one");
    assert_eq!(read_string(first.input_stream().unwrap()), "done");

    // The server went away while the connection sat idle.
    a1.set_broken();

    let mut second = s.open("http://a.test/two");
    assert_eq!(read_string(second.input_stream().unwrap()), "done");
    assert_eq!(s.dialer.dial_count(), 2);
    assert!(a2.written_string().starts_with("GET /two HTTP/1.1\r\n"));
}

#[test]
fn idle_connection_closed_by_server_is_redone() {
    // Server accepts the request but closes without answering.
    let a1 = Script::new().respond(OK).respond("");
    let a2 = Script::new().respond(OK);
    let s = Scenario::builder()
        .script("a.test", a1.clone())
        .script("a.test", a2.clone())
        .build();

    let mut first = s.open("http://a.test/one");
    assert_eq!(read_string(first.input_stream().unwrap()), "done");

    let mut second = s.open("http://a.test/two");
    assert_eq!(second.response_code().unwrap(), 200);
    assert_eq!(s.dialer.dial_count(), 2);
    assert!(a1.is_closed());
}

#[test]
fn fresh_connection_is_not_redone() {
    let a = Script::new().respond(OK);
    a.set_broken();
    let mut s = Scenario::builder()
        .script("a.test", a)
        .script("a.test", Script::new().respond(OK))
        .build();

    let err = s.session.response_code().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(s.dialer.dial_count(), 1);

    // The session stays failed.
    assert!(matches!(
        s.session.response_code(),
        Err(Error::ConnectionClosed)
    ));
}

#[test]
fn dead_idle_connection_is_discarded() {
    let a1 = Script::new().respond(OK);
    let a2 = Script::new().respond(OK);
    let s = Scenario::builder()
        .script("a.test", a1.clone())
        .script("a.test", a2.clone())
        .build();

    let mut first = s.open("http://a.test/");
    assert_eq!(read_string(first.input_stream().unwrap()), "done");
    a1.set_dead();

    let mut second = s.open("http://a.test/");
    assert_eq!(second.response_code().unwrap(), 200);
    assert_eq!(s.dialer.dial_count(), 2);
    assert!(a1.is_closed());
    assert_eq!(a1.requests().len(), 1);
}

#[test]
fn pooling_disabled() {
    let a1 = Script::new().respond(OK);
    let a2 = Script::new().respond(OK);
    let s = Scenario::builder()
        .config(Config::new().max_idle_per_key(0))
        .script("a.test", a1.clone())
        .script("a.test", a2)
        .build();

    let mut first = s.open("http://a.test/");
    assert_eq!(read_string(first.input_stream().unwrap()), "done");
    assert!(a1.is_closed());

    let mut second = s.open("http://a.test/");
    assert_eq!(second.response_code().unwrap(), 200);
    assert_eq!(s.dialer.dial_count(), 2);
}

#[test]
fn proxy_failover() {
    let selector = Recording {
        proxies: vec![Proxy::http("p1.test", 3128), Proxy::http("p2.test", 3128)],
        ..Default::default()
    };
    let failed = selector.failed.clone();
    let p2 = Script::new().respond(OK);
    let mut s = Scenario::builder()
        .get("http://a.test/x")
        .proxy_selector(selector)
        .script("p2.test", p2.clone())
        .build();

    assert_eq!(s.session.response_code().unwrap(), 200);
    assert_eq!(s.dialer.dials(), ["p1.test", "p2.test"]);
    assert_eq!(*failed.lock().unwrap(), ["http://p1.test:3128"]);
    assert_eq!(s.session.proxy(), &Proxy::http("p2.test", 3128));

    let sent = p2.written_string();
    assert!(sent.starts_with("GET http://a.test/x HTTP/1.1\r\n"));
    assert!(sent.contains("\r\nHost: a.test\r\n"));
}

#[test]
fn proxy_failover_to_direct() {
    let a = Script::new().respond(OK);
    let mut s = Scenario::builder()
        .get("http://a.test/x")
        .proxy_selector(StaticProxies(vec![
            Proxy::http("p1.test", 3128),
            Proxy::Direct,
        ]))
        .script("a.test", a.clone())
        .build();

    assert_eq!(s.session.response_code().unwrap(), 200);
    assert!(s.session.proxy().is_direct());
    assert!(a.written_string().starts_with("GET /x HTTP/1.1\r\n"));
}

#[test]
fn all_proxies_fail() {
    let selector = Recording {
        proxies: vec![Proxy::http("p1.test", 3128), Proxy::http("p2.test", 3128)],
        ..Default::default()
    };
    let failed = selector.failed.clone();
    let mut s = Scenario::builder().proxy_selector(selector).build();

    let err = s.session.response_code().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(failed.lock().unwrap().len(), 2);
}

#[test]
fn empty_selection_means_direct() {
    let a = Script::new().respond(OK);
    let mut s = Scenario::builder()
        .proxy_selector(StaticProxies(vec![]))
        .script("a.test", a)
        .build();

    assert_eq!(s.session.response_code().unwrap(), 200);
    assert_eq!(s.dialer.dials(), ["a.test"]);
}

#[test]
fn direct_connect_refused() {
    let mut s = Scenario::builder().build();
    let err = s.session.response_code().unwrap_err();
    assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::ConnectionRefused));
}

#[test]
fn https_direct() {
    let a = Script::new().respond(OK);
    let mut s = Scenario::builder()
        .get("https://a.test/secure")
        .tls()
        .script("a.test", a.clone())
        .build();

    assert_eq!(read_string(s.session.input_stream().unwrap()), "done");
    assert_eq!(s.dialer.secured_hosts(), ["a.test"]);

    let sent = a.written_string();
    assert!(sent.starts_with("GET /secure HTTP/1.1\r\n"));
    assert!(sent.contains("\r\nHost: a.test\r\n"));
}

#[test]
fn https_without_tls() {
    let mut s = Scenario::builder()
        .get("https://a.test/")
        .script("a.test", Script::new().respond(OK))
        .build();

    let err = s.session.response_code().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[test]
fn https_tunnel_through_proxy() {
    let p = Script::new()
        .respond("HTTP/1.1 200 Connection established\r\n\r\n")
        .respond(OK);
    let mut s = Scenario::builder()
        .get("https://a.test/x")
        .tls()
        .config(Config::new().proxy(Some(Proxy::http("p.test", 3128))))
        .header("Proxy-Authorization", "Basic cDpx")
        .script("p.test", p.clone())
        .build();

    assert_eq!(read_string(s.session.input_stream().unwrap()), "done");
    assert_eq!(s.dialer.dials(), ["p.test"]);
    assert_eq!(s.dialer.secured_hosts(), ["a.test"]);

    let requests = p.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0],
        "CONNECT a.test:443 HTTP/1.1\r\n\
        Host: a.test:443\r\n\
        Proxy-Authorization: Basic cDpx\r\n\
        \r\n"
    );
    assert!(requests[1].starts_with("GET /x HTTP/1.1\r\n"));
    assert!(!requests[1].contains("Proxy-Authorization"));
}

#[test]
fn tunnel_refused() {
    let p = Script::new().respond("HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n");
    let mut s = Scenario::builder()
        .get("https://a.test/")
        .tls()
        .config(Config::new().proxy(Some(Proxy::http("p.test", 3128))))
        .script("p.test", p.clone())
        .build();

    let err = s.session.response_code().unwrap_err();
    assert!(matches!(err, Error::TunnelFailed(403)));
    assert!(p.is_closed());
    assert!(s.dialer.secured_hosts().is_empty());
}

#[test]
fn cancel_before_execute() {
    let mut s = Scenario::builder()
        .script("a.test", Script::new().respond(OK))
        .build();

    let handle = s.session.cancel_handle();
    handle.cancel();
    assert!(handle.is_cancelled());

    let err = s.session.response_code().unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    assert_eq!(s.dialer.dial_count(), 0);
}

#[test]
fn cancel_shuts_down_socket() {
    let a = Script::new().respond(OK);
    let mut s = Scenario::builder()
        .post("http://a.test/up")
        .script("a.test", a.clone())
        .build();

    let handle = s.session.cancel_handle();
    s.session.set_chunked_streaming_mode(16).unwrap();
    s.session.output_stream().unwrap().write_all(b"data").unwrap();

    handle.cancel();
    assert!(a.is_closed());

    assert!(s.session.response_code().is_err());
}

#[test]
fn disconnect_closes_connection() {
    let a = Script::new().respond(OK);
    let mut s = Scenario::builder().script("a.test", a.clone()).build();

    assert_eq!(s.session.response_code().unwrap(), 200);
    assert!(!a.is_closed());

    s.session.disconnect();
    assert!(a.is_closed());
}

#[test]
fn open_rejects_bad_uris() {
    let s = Scenario::builder().build();

    assert!(matches!(
        s.client.open("ftp://a.test/"),
        Err(Error::UnsupportedScheme(_))
    ));
    assert!(matches!(s.client.open("http://a b/"), Err(Error::BadUri(_))));
    assert!(matches!(s.client.open("/relative"), Err(Error::BadUri(_))));
}

#[test]
fn open_rejects_unsupported_version() {
    let client = Client::builder()
        .config(Config::new().version(Version::HTTP_2))
        .build();
    assert!(matches!(
        client.open("http://a.test/"),
        Err(Error::UnsupportedVersion)
    ));
}
