use http::uri::Scheme;
use http::{Method, StatusCode, Uri};

use crate::Error;

pub(crate) trait MethodExt {
    /// Whether the caller may write a request body for this method.
    fn allows_request_body(&self) -> bool;
    /// Whether the response to this method never carries a body.
    fn has_no_response_body(&self) -> bool;
}

impl MethodExt for Method {
    fn allows_request_body(&self) -> bool {
        matches!(*self, Method::POST | Method::PUT | Method::PATCH)
    }

    fn has_no_response_body(&self) -> bool {
        matches!(*self, Method::HEAD | Method::CONNECT)
    }
}

pub(crate) trait SchemeExt {
    fn default_port(&self) -> Option<u16>;
}

impl SchemeExt for Scheme {
    fn default_port(&self) -> Option<u16> {
        if *self == Scheme::HTTPS {
            Some(443)
        } else if *self == Scheme::HTTP {
            Some(80)
        } else {
            None
        }
    }
}

pub(crate) trait StatusExt {
    /// The 3xx codes this engine follows.
    fn is_followed_redirect(&self) -> bool;
    /// 1xx responses that precede the real response.
    fn is_informational_only(&self) -> bool;
}

impl StatusExt for StatusCode {
    fn is_followed_redirect(&self) -> bool {
        matches!(self.as_u16(), 300 | 301 | 302 | 303 | 305)
    }

    fn is_informational_only(&self) -> bool {
        // 101 switches protocol, that is a final answer.
        self.is_informational() && *self != StatusCode::SWITCHING_PROTOCOLS
    }
}

pub(crate) trait UriExt {
    fn scheme_or_http(&self) -> &Scheme;
    fn host_or_err(&self) -> Result<&str, Error>;
    fn port_or_default(&self) -> u16;
    fn is_https(&self) -> bool;
    fn same_origin(&self, other: &Uri) -> bool;
    fn origin_form(&self) -> &str;
    fn host_header(&self) -> Option<String>;
    fn userinfo(&self) -> Option<(&str, &str)>;
}

impl UriExt for Uri {
    fn scheme_or_http(&self) -> &Scheme {
        self.scheme().unwrap_or(&Scheme::HTTP)
    }

    fn host_or_err(&self) -> Result<&str, Error> {
        self.host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::BadUri(format!("no host in {}", self)))
    }

    fn port_or_default(&self) -> u16 {
        self.port_u16()
            .or_else(|| self.scheme_or_http().default_port())
            .unwrap_or(80)
    }

    fn is_https(&self) -> bool {
        *self.scheme_or_http() == Scheme::HTTPS
    }

    fn same_origin(&self, other: &Uri) -> bool {
        self.scheme_or_http() == other.scheme_or_http()
            && self
                .host()
                .zip(other.host())
                .map(|(a, b)| a.eq_ignore_ascii_case(b))
                .unwrap_or(false)
            && self.port_or_default() == other.port_or_default()
    }

    fn origin_form(&self) -> &str {
        match self.path_and_query() {
            Some(pq) if !pq.as_str().is_empty() => pq.as_str(),
            _ => "/",
        }
    }

    fn host_header(&self) -> Option<String> {
        let host = self.host()?;
        let default = self.scheme_or_http().default_port();
        match self.port_u16() {
            Some(port) if Some(port) != default => Some(format!("{}:{}", host, port)),
            _ => Some(host.to_string()),
        }
    }

    fn userinfo(&self) -> Option<(&str, &str)> {
        let (info, _) = self.authority()?.as_str().rsplit_once('@')?;
        Some(info.split_once(':').unwrap_or((info, "")))
    }
}

/// Combine a `Location` header with the uri it was received for.
pub(crate) fn resolve_location(base: &Uri, location: &str) -> Result<Uri, Error> {
    let bad = || Error::BadLocationHeader(location.to_string());

    // Fragments are never sent.
    let location = location.split('#').next().unwrap_or_default().trim();
    if location.is_empty() {
        return Err(bad());
    }

    let scheme = base.scheme_or_http().as_str();
    let authority = base.authority().map(|a| a.as_str()).unwrap_or_default();

    let absolute = if location.contains("://") {
        location.to_string()
    } else if let Some(rest) = location.strip_prefix("//") {
        format!("{}://{}", scheme, rest)
    } else if location.starts_with('/') {
        format!("{}://{}{}", scheme, authority, remove_dot_segments(location))
    } else if location.starts_with('?') {
        format!("{}://{}{}{}", scheme, authority, base.path(), location)
    } else {
        let path = base.path();
        let dir = match path.rfind('/') {
            Some(i) => &path[..=i],
            None => "/",
        };
        let merged = format!("{}{}", dir, location);
        format!("{}://{}{}", scheme, authority, remove_dot_segments(&merged))
    };

    let uri: Uri = absolute.parse().map_err(|_| bad())?;

    if uri.scheme().is_none() || uri.host().is_none() {
        return Err(bad());
    }

    Ok(uri)
}

fn remove_dot_segments(path_and_query: &str) -> String {
    let (path, query) = match path_and_query.find('?') {
        Some(i) => path_and_query.split_at(i),
        None => (path_and_query, ""),
    };

    let mut out: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);

    for (i, seg) in segments.iter().enumerate() {
        match *seg {
            "." => {
                if i == last {
                    out.push("");
                }
            }
            ".." => {
                if out.len() > 1 {
                    out.pop();
                }
                if i == last {
                    out.push("");
                }
            }
            s => out.push(s),
        }
    }

    let mut joined = out.join("/");
    if !joined.starts_with('/') {
        joined.insert(0, '/');
    }
    joined.push_str(query);
    joined
}
