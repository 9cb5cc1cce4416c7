use std::io::Write;

use crate::client::test::mock::Script;
use crate::client::test::scenario::{read_string, Scenario};
use crate::config::Config;
use crate::Error;

const OK: &str = "HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndone";

fn found(location: &str) -> String {
    format!(
        "HTTP/1.1 302 Found\r\n\
        Location: {}\r\n\
        Content-Length: 0\r\n\
        \r\n",
        location
    )
}

#[test]
fn same_origin_reuses_connection() {
    let a = Script::new()
        .respond(
            "HTTP/1.1 301 Moved Permanently\r\n\
            Location: /y\r\n\
            Content-Length: 5\r\n\
            \r\n\
            moved",
        )
        .respond(OK);
    let mut s = Scenario::builder()
        .get("http://a.test/x")
        .script("a.test", a.clone())
        .build();

    assert_eq!(read_string(s.session.input_stream().unwrap()), "done");
    assert_eq!(s.session.uri(), "http://a.test/y");
    assert_eq!(s.dialer.dial_count(), 1);

    let requests = a.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].starts_with("GET /x HTTP/1.1\r\n"));
    assert!(requests[1].starts_with("GET /y HTTP/1.1\r\n"));
}

#[test]
fn cross_origin_strips_host_and_dials() {
    let a = Script::new().respond(
        "HTTP/1.1 301 Moved Permanently\r\n\
        Location: http://b.test/y\r\n\
        Content-Length: 0\r\n\
        \r\n",
    );
    let b = Script::new().respond(OK);
    let mut s = Scenario::builder()
        .get("http://a.test/x")
        .header("Host", "a.test")
        .header("Authorization", "Bearer secret")
        .script("a.test", a.clone())
        .script("b.test", b.clone())
        .build();

    assert_eq!(s.session.response_code().unwrap(), 200);
    assert_eq!(s.dialer.dials(), ["a.test", "b.test"]);
    assert!(a.is_closed());

    let sent = b.written_string();
    assert!(sent.starts_with("GET /y HTTP/1.1\r\n"));
    assert!(sent.contains("\r\nHost: b.test\r\n"));
    assert!(!sent.contains("a.test"));
    assert!(!sent.contains("Authorization"));
}

#[test]
fn other_port_is_cross_origin() {
    let a = Script::new().respond(&found("http://a.test:8080/"));
    let b = Script::new().respond(OK);
    let mut s = Scenario::builder()
        .script("a.test", a)
        .script("a.test", b.clone())
        .build();

    assert_eq!(s.session.response_code().unwrap(), 200);
    assert_eq!(s.dialer.dial_count(), 2);
    assert!(b.written_string().contains("\r\nHost: a.test:8080\r\n"));
}

#[test]
fn redirect_ceiling() {
    let mut a = Script::new();
    for i in 0..6 {
        a = a.respond(&found(&format!("/r{}", i)));
    }
    let mut s = Scenario::builder()
        .get("http://a.test/start")
        .script("a.test", a.clone())
        .build();

    let err = s.session.response_code().unwrap_err();
    assert!(matches!(err, Error::TooManyRedirects));

    // The first request and 5 follow-ups, no 7th request.
    assert_eq!(a.requests().len(), 6);
    assert_eq!(s.dialer.dial_count(), 1);
    assert!(a.is_closed());
}

#[test]
fn five_redirects_are_fine() {
    let mut a = Script::new();
    for i in 0..5 {
        a = a.respond(&found(&format!("/r{}", i)));
    }
    a = a.respond(OK);
    let mut s = Scenario::builder().script("a.test", a.clone()).build();

    assert_eq!(s.session.response_code().unwrap(), 200);
    assert_eq!(s.session.uri(), "http://a.test/r4");
    assert_eq!(a.requests().len(), 6);
}

#[test]
fn streamed_body_blocks_redirect() {
    let a = Script::new().respond(
        "HTTP/1.1 302 Found\r\n\
        Location: /elsewhere\r\n\
        Content-Length: 3\r\n\
        \r\n\
        see",
    );
    let mut s = Scenario::builder()
        .post("http://a.test/up")
        .script("a.test", a.clone())
        .build();

    s.session.set_chunked_streaming_mode(16).unwrap();
    s.session.output_stream().unwrap().write_all(b"data").unwrap();

    assert_eq!(s.session.response_code().unwrap(), 302);
    assert_eq!(read_string(s.session.input_stream().unwrap()), "see");
    assert_eq!(a.requests().len(), 1);
}

#[test]
fn buffered_body_is_resent() {
    let a = Script::new()
        .respond(&found("/again"))
        .respond(OK);
    let mut s = Scenario::builder()
        .post("http://a.test/up")
        .script("a.test", a.clone())
        .build();

    s.session.output_stream().unwrap().write_all(b"data").unwrap();
    assert_eq!(s.session.response_code().unwrap(), 200);

    let requests = a.requests();
    assert!(requests[1].starts_with("POST /again HTTP/1.1\r\n"));
    assert!(requests[1].contains("\r\nContent-Length: 4\r\n"));
    assert!(requests[1].ends_with("\r\n\r\ndata"));
}

#[test]
fn see_other_switches_to_get() {
    let a = Script::new()
        .respond(
            "HTTP/1.1 303 See Other\r\n\
            Location: /result\r\n\
            Content-Length: 0\r\n\
            \r\n",
        )
        .respond(OK);
    let mut s = Scenario::builder()
        .post("http://a.test/form")
        .script("a.test", a.clone())
        .build();

    s.session.output_stream().unwrap().write_all(b"q=1").unwrap();
    assert_eq!(s.session.response_code().unwrap(), 200);
    assert_eq!(s.session.method(), "GET");

    let requests = a.requests();
    assert!(requests[1].starts_with("GET /result HTTP/1.1\r\n"));
    assert!(!requests[1].contains("Content-Length"));
    assert!(!requests[1].contains("Content-Type"));
    assert!(requests[1].ends_with("\r\n\r\n"));
}

#[test]
fn redirects_disabled() {
    let a = Script::new().respond(&found("/y"));
    let mut s = Scenario::builder()
        .config(Config::new().follow_redirects(false))
        .script("a.test", a.clone())
        .build();

    assert_eq!(s.session.response_code().unwrap(), 302);
    assert_eq!(s.session.header_field("location").unwrap(), Some("/y"));
    assert_eq!(a.requests().len(), 1);
}

#[test]
fn redirects_disabled_per_session() {
    let a = Script::new().respond(&found("/y"));
    let mut s = Scenario::builder().script("a.test", a).build();

    s.session.set_follow_redirects(false).unwrap();
    assert_eq!(s.session.response_code().unwrap(), 302);
}

#[test]
fn scheme_change_returns_redirect() {
    let a = Script::new().respond(&found("https://a.test/secure"));
    let mut s = Scenario::builder().script("a.test", a.clone()).build();

    assert_eq!(s.session.response_code().unwrap(), 302);
    assert_eq!(s.session.uri(), "http://a.test/");
    assert_eq!(s.dialer.dial_count(), 1);
}

#[test]
fn bad_location() {
    let a = Script::new().respond(&found("http://"));
    let mut s = Scenario::builder().script("a.test", a.clone()).build();

    let err = s.session.response_code().unwrap_err();
    assert!(matches!(err, Error::BadLocationHeader(_)));
    assert!(a.is_closed());
}

#[test]
fn redirect_to_closing_server_dials_again() {
    let a1 = Script::new().respond(
        "HTTP/1.1 302 Found\r\n\
        Location: /y\r\n\
        Connection: close\r\n\
        Content-Length: 0\r\n\
        \r\n",
    );
    let a2 = Script::new().respond(OK);
    let mut s = Scenario::builder()
        .script("a.test", a1.clone())
        .script("a.test", a2.clone())
        .build();

    assert_eq!(s.session.response_code().unwrap(), 200);
    assert_eq!(s.dialer.dial_count(), 2);
    assert!(a1.is_closed());
    assert!(a2.written_string().starts_with("GET /y HTTP/1.1\r\n"));
}

#[test]
fn use_proxy_redirect() {
    let a = Script::new().respond(
        "HTTP/1.1 305 Use Proxy\r\n\
        Location: http://p.test:3128/\r\n\
        Content-Length: 0\r\n\
        \r\n",
    );
    let p = Script::new().respond(OK);
    let mut s = Scenario::builder()
        .get("http://a.test/x")
        .script("a.test", a.clone())
        .script("p.test", p.clone())
        .build();

    assert_eq!(s.session.response_code().unwrap(), 200);
    assert!(a.is_closed());
    assert_eq!(s.session.proxy().to_string(), "http://p.test:3128");
    assert!(p.written_string().starts_with("GET http://a.test/x HTTP/1.1\r\n"));
}
