use anyhow::{Context, Error, Result};
use chrono::Utc;

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Method {
    Get,
    Post,
}

/// A parsed inbound HTTP request. The query string is split off the
/// request target since file resolution only cares about the path.
#[derive(Debug, PartialEq, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let split = raw
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .ok_or_else(|| Error::msg("malformed HTTP request: missing header terminator"))?;

        let head =
            std::str::from_utf8(&raw[..split]).context("HTTP request head is not valid utf-8")?;
        let body = raw[(split + 4)..].to_vec();

        let mut lines = head.split("\r\n");

        let request_line = lines
            .next()
            .ok_or_else(|| Error::msg("HTTP request is missing a request line"))?;

        let mut parts = request_line.split(' ');

        let method = match parts.next() {
            Some("GET") => Method::Get,
            Some("POST") => Method::Post,
            Some(other) => {
                return Err(Error::msg(format!("unsupported method: {}", other)));
            }
            None => return Err(Error::msg("invalid request line")),
        };

        let target = parts
            .next()
            .ok_or_else(|| Error::msg(format!("invalid request line: {}", request_line)))?;

        let (path, query) = match target.find('?') {
            Some(i) => (target[..i].to_owned(), Some(target[(i + 1)..].to_owned())),
            None => (target.to_owned(), None),
        };

        let mut headers = vec![];

        for line in lines {
            let mut parts = line.splitn(2, ':');

            let name = parts.next().unwrap_or("");
            let value = parts
                .next()
                .ok_or_else(|| Error::msg(format!("invalid header line: {}", line)))?;

            headers.push((name.trim().to_owned(), value.trim().to_owned()));
        }

        Ok(Self {
            method,
            path,
            query,
            headers,
            body,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Response {
    pub status_code: u16,
    pub reason: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    fn new(status_code: u16, reason: &'static str, body: Vec<u8>) -> Self {
        Self {
            status_code,
            reason,
            headers: vec![("Date".to_owned(), http_date())],
            body,
        }
    }

    pub fn ok(body: Vec<u8>) -> Self {
        Self::new(200, "OK", body)
    }

    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request", b"400 Bad Request\n".to_vec())
    }

    pub fn forbidden() -> Self {
        Self::new(403, "Forbidden", b"403 Forbidden\n".to_vec())
    }

    pub fn not_found() -> Self {
        Self::new(404, "Not Found", b"404 Not Found\n".to_vec())
    }

    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error", b"500 Internal Server Error\n".to_vec())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));

        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut text = format!("HTTP/1.0 {} {}\r\n", self.status_code, self.reason);

        for (name, value) in self.headers.iter() {
            text.push_str(&format!("{}: {}\r\n", name, value));
        }

        text.push_str(&format!("Content-Length: {}\r\n\r\n", self.body.len()));

        let mut bytes = text.into_bytes();
        bytes.extend_from_slice(self.body.as_slice());

        bytes
    }
}

/// The current time formatted per RFC 7231, e.g.
/// `Sun, 30 Aug 2026 12:00:00 GMT`.
pub fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
