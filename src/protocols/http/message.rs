//! HTTP/1.x message types.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
    /// Any other token sent by the client.
    Other(String),
}

impl Method {
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version. Only HTTP/1.0 and HTTP/1.1 are spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "HTTP/1.0" => Some(Version::Http10),
            "HTTP/1.1" => Some(Version::Http11),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// Response status codes produced by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    MethodNotAllowed,
    InternalServerError,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::MethodNotAllowed => 405,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

/// Ordered header fields with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, keeping any existing field of the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Set a field, replacing every existing field of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.fields.push((name, value.into()));
    }

    /// First value of the named field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether any comma-separated element of the named field equals `token`.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.fields
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn encode(&self, dst: &mut BytesMut) {
        for (name, value) in self.iter() {
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection")
            {
                continue;
            }
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
    }
}

/// Persistence rule shared by requests and responses.
///
/// HTTP/1.1 persists unless `Connection: close`; HTTP/1.0 closes unless
/// `Connection: keep-alive`.
pub fn is_keep_alive(version: Version, headers: &Headers) -> bool {
    match version {
        Version::Http11 => !headers.has_token("connection", "close"),
        Version::Http10 => headers.has_token("connection", "keep-alive"),
    }
}

fn encode_connection(version: Version, keep_alive: bool, dst: &mut BytesMut) {
    match (version, keep_alive) {
        (Version::Http11, false) => dst.put_slice(b"Connection: close\r\n"),
        (Version::Http10, true) => dst.put_slice(b"Connection: keep-alive\r\n"),
        _ => {}
    }
}

/// A fully received (or about to be sent) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, target: impl Into<String>, version: Version) -> Self {
        Self {
            method,
            target: target.into(),
            version,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn keep_alive(&self) -> bool {
        is_keep_alive(self.version, &self.headers)
    }

    /// Serialize the request, deriving `Content-Length` from the body.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(128 + self.body.len());
        dst.put_slice(self.method.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(self.target.as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(self.version.as_str().as_bytes());
        dst.put_slice(b"\r\n");
        self.headers.encode(dst);
        dst.put_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        encode_connection(self.version, self.keep_alive(), dst);
        dst.put_slice(b"\r\n");
        dst.put_slice(&self.body);
    }
}

/// A response whose body is any byte container.
#[derive(Debug, Clone)]
pub struct Response<B = Bytes> {
    status: Status,
    version: Version,
    headers: Headers,
    body: B,
    keep_alive: bool,
    head_only: bool,
}

impl<B: AsRef<[u8]>> Response<B> {
    /// New response using the version's default persistence.
    pub fn new(status: Status, version: Version, body: B) -> Self {
        Self {
            status,
            version,
            headers: Headers::new(),
            body,
            keep_alive: version == Version::Http11,
            head_only: false,
        }
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.headers.insert("Content-Type", content_type);
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Answer to a HEAD request: the length is advertised, the body omitted.
    pub fn head_only(mut self, head_only: bool) -> Self {
        self.head_only = head_only;
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_ref()
    }

    /// Bytes that follow the head on the wire.
    pub fn payload(&self) -> &[u8] {
        if self.head_only {
            &[]
        } else {
            self.body.as_ref()
        }
    }

    /// Whether the connection must be closed once this response is sent.
    pub fn need_eof(&self) -> bool {
        !self.keep_alive
    }

    pub fn encode_head(&self, dst: &mut BytesMut) {
        dst.reserve(128);
        dst.put_slice(self.version.as_str().as_bytes());
        dst.put_slice(
            format!(" {} {}\r\n", self.status.code(), self.status.reason()).as_bytes(),
        );
        self.headers.encode(dst);
        dst.put_slice(format!("Content-Length: {}\r\n", self.body.as_ref().len()).as_bytes());
        encode_connection(self.version, self.keep_alive, dst);
        dst.put_slice(b"\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_alive_rules() {
        let mut headers = Headers::new();
        assert!(is_keep_alive(Version::Http11, &headers));
        assert!(!is_keep_alive(Version::Http10, &headers));

        headers.insert("Connection", "Keep-Alive");
        assert!(is_keep_alive(Version::Http10, &headers));

        headers.insert("connection", "upgrade, close");
        assert!(!is_keep_alive(Version::Http11, &headers));
    }

    #[test]
    fn test_headers_insert_replaces() {
        let mut headers = Headers::new();
        headers.append("X-Trace", "a");
        headers.append("x-trace", "b");
        assert_eq!(headers.len(), 2);

        headers.insert("X-TRACE", "c");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-trace"), Some("c"));
    }

    #[test]
    fn test_response_head_http11_close() {
        let response = Response::new(Status::MethodNotAllowed, Version::Http11, "Invalid method")
            .content_type("text/plain")
            .keep_alive(false);

        let mut head = BytesMut::new();
        response.encode_head(&mut head);
        assert_eq!(
            &head[..],
            &b"HTTP/1.1 405 Method Not Allowed\r\n\
               Content-Type: text/plain\r\n\
               Content-Length: 14\r\n\
               Connection: close\r\n\r\n"[..]
        );
        assert!(response.need_eof());
    }

    #[test]
    fn test_response_head_http10_keep_alive() {
        let response = Response::new(Status::Ok, Version::Http10, Bytes::from_static(b"abc"))
            .keep_alive(true);

        let mut head = BytesMut::new();
        response.encode_head(&mut head);
        assert_eq!(
            &head[..],
            &b"HTTP/1.0 200 OK\r\nContent-Length: 3\r\nConnection: keep-alive\r\n\r\n"[..]
        );
        assert!(!response.need_eof());
    }

    #[test]
    fn test_head_only_keeps_length() {
        let response = Response::new(Status::Ok, Version::Http11, vec![7u8; 10]).head_only(true);

        let mut head = BytesMut::new();
        response.encode_head(&mut head);
        assert!(head.ends_with(b"Content-Length: 10\r\n\r\n"));
        assert!(response.payload().is_empty());
        assert_eq!(response.body().len(), 10);
    }

    #[test]
    fn test_request_encode() {
        let request = Request::new(Method::Get, "/", Version::Http11)
            .header("Content-Type", "text/html")
            .with_body(Bytes::from_static(b"xyz"));

        let mut buf = BytesMut::new();
        request.encode(&mut buf);
        assert_eq!(
            &buf[..],
            &b"GET / HTTP/1.1\r\nContent-Type: text/html\r\nContent-Length: 3\r\n\r\nxyz"[..]
        );
    }
}
