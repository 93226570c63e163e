use anyhow::{Context, Error, Result};
use log::*;
use rudp_transport::{Client, TransportConfig};

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Minimal parsed form of an `http://` URL. The query string stays
/// attached to the path, since the request line carries it verbatim.
#[derive(Debug, PartialEq, Clone)]
pub struct Url {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Url {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| Error::msg(format!("only http:// URLs are supported: {}", url)))?;

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };

        if authority.is_empty() {
            return Err(Error::msg(format!("URL is missing a host: {}", url)));
        }

        let (host, port) = match authority.find(':') {
            Some(i) => {
                let port = authority[(i + 1)..]
                    .parse::<u16>()
                    .with_context(|| format!("invalid port in URL: {}", url))?;

                (authority[..i].to_owned(), port)
            }
            None => (authority.to_owned(), 80),
        };

        Ok(Self {
            host,
            port,
            path: path.to_owned(),
        })
    }

    /// The value for the Host header.
    pub fn authority(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolves a Location header value against this URL.
    pub fn join(&self, location: &str) -> Result<Url> {
        if location.starts_with("http://") {
            Url::parse(location)
        } else if location.starts_with('/') {
            Ok(Url {
                host: self.host.clone(),
                port: self.port,
                path: location.to_owned(),
            })
        } else {
            Err(Error::msg(format!(
                "unsupported Location value: {}",
                location
            )))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: vec![],
            body: vec![],
        }
    }

    /// Serialises the request as an HTTP/1.0 message. The body is only
    /// attached for POST requests.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut text = format!("{} {} HTTP/1.0\r\n", self.method.name(), self.url.path);
        text.push_str(&format!("Host: {}\r\n", self.url.authority()));

        let has_content_length = self
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("Content-Length"));

        if self.method == Method::Post && !has_content_length {
            text.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }

        for (name, value) in self.headers.iter() {
            text.push_str(&format!("{}: {}\r\n", name, value));
        }

        text.push_str("\r\n");

        let mut bytes = text.into_bytes();

        if self.method == Method::Post {
            bytes.extend_from_slice(self.body.as_slice());
        }

        bytes
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Response {
    pub status_code: u16,
    pub status_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let split = raw
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .ok_or_else(|| Error::msg("malformed HTTP response: missing header terminator"))?;

        let head = std::str::from_utf8(&raw[..split])
            .context("HTTP response head is not valid utf-8")?;
        let body = raw[(split + 4)..].to_vec();

        let mut lines = head.split("\r\n");

        let status_line = lines
            .next()
            .ok_or_else(|| Error::msg("HTTP response is missing a status line"))?
            .to_owned();

        let status_code = status_line
            .split(' ')
            .nth(1)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| Error::msg(format!("invalid status line: {}", status_line)))?;

        let mut headers = vec![];

        for line in lines {
            let mut parts = line.splitn(2, ':');

            let name = parts
                .next()
                .ok_or_else(|| Error::msg(format!("invalid header line: {}", line)))?;
            let value = parts
                .next()
                .ok_or_else(|| Error::msg(format!("invalid header line: {}", line)))?;

            headers.push((name.trim().to_owned(), value.trim().to_owned()));
        }

        Ok(Self {
            status_code,
            status_line,
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

    pub fn is_redirect(&self) -> bool {
        self.status_code >= 300 && self.status_code < 400 && self.header("Location").is_some()
    }

    /// The status line and headers, for verbose output.
    pub fn head_text(&self) -> String {
        let mut text = format!("{}\r\n", self.status_line);

        for (name, value) in self.headers.iter() {
            text.push_str(&format!("{}: {}\r\n", name, value));
        }

        text.push_str("\r\n");

        text
    }
}

/// Drives one logical request over the transport, following redirects up
/// to the configured limit. Each hop opens a fresh connection, and every
/// hop's response is returned in order.
pub struct Exchange {
    relay_addr: String,
    max_redirects: u32,
    transport: TransportConfig,
}

impl Exchange {
    pub fn new(relay_addr: &str, max_redirects: u32, transport: TransportConfig) -> Self {
        Self {
            relay_addr: relay_addr.to_owned(),
            max_redirects,
            transport,
        }
    }

    pub async fn execute(&self, mut request: Request) -> Result<Vec<Response>> {
        let client = Client::new(self.transport.clone());

        let mut responses = vec![];
        let mut hops = 0u32;

        loop {
            debug!(
                "{} {} via {}",
                request.method.name(),
                request.url.path,
                self.relay_addr
            );

            let raw = client
                .transfer(
                    self.relay_addr.as_str(),
                    request.url.server_addr().as_str(),
                    request.to_bytes().as_slice(),
                )
                .await?;

            let response = Response::parse(raw.as_slice())?;

            let redirect = response.is_redirect();
            let location = response.header("Location").map(str::to_owned);

            responses.push(response);

            if !redirect || hops >= self.max_redirects {
                break;
            }

            hops += 1;

            let location = location.unwrap();
            info!("following redirect to {}", location);

            let url = request.url.join(location.as_str())?;
            request = Request { url, ..request };
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_with_port_and_query() {
        let url = Url::parse("http://localhost:8080/path/to?key=value").unwrap();

        assert_eq!(url.host, "localhost");
        assert_eq!(url.port, 8080);
        assert_eq!(url.path, "/path/to?key=value");
        assert_eq!(url.authority(), "localhost:8080");
        assert_eq!(url.server_addr(), "localhost:8080");
    }

    #[test]
    fn test_parse_url_defaults() {
        let url = Url::parse("http://example.com").unwrap();

        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, 80);
        assert_eq!(url.path, "/");
        assert_eq!(url.authority(), "example.com");
    }

    #[test]
    fn test_parse_url_rejects_other_schemes() {
        assert_eq!(Url::parse("https://example.com/").is_err(), true);
        assert_eq!(Url::parse("example.com/").is_err(), true);
    }

    #[test]
    fn test_url_join() {
        let url = Url::parse("http://localhost:8080/old").unwrap();

        let absolute = url.join("http://other:9090/new").unwrap();
        assert_eq!(absolute.host, "other");
        assert_eq!(absolute.port, 9090);
        assert_eq!(absolute.path, "/new");

        let relative = url.join("/new?x=1").unwrap();
        assert_eq!(relative.host, "localhost");
        assert_eq!(relative.port, 8080);
        assert_eq!(relative.path, "/new?x=1");
    }

    #[test]
    fn test_get_request_to_bytes() {
        let mut request = Request::new(Method::Get, Url::parse("http://localhost:8080/hi").unwrap());
        request.headers.push(("Accept".to_owned(), "*/*".to_owned()));
        request.body = b"ignored for GET".to_vec();

        let bytes = request.to_bytes();

        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "GET /hi HTTP/1.0\r\nHost: localhost:8080\r\nAccept: */*\r\n\r\n"
        );
    }

    #[test]
    fn test_post_request_to_bytes_includes_body_and_length() {
        let mut request =
            Request::new(Method::Post, Url::parse("http://localhost/upload").unwrap());
        request.body = b"hello".to_vec();

        let bytes = request.to_bytes();

        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "POST /upload HTTP/1.0\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello"
        );
    }

    #[test]
    fn test_parse_response() {
        let raw = b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nhi";

        let response = Response::parse(raw).unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.status_line, "HTTP/1.0 200 OK");
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.body, b"hi".to_vec());
        assert_eq!(response.is_redirect(), false);
    }

    #[test]
    fn test_parse_redirect_response() {
        let raw = b"HTTP/1.0 302 Found\r\nLocation: /elsewhere\r\n\r\n";

        let response = Response::parse(raw).unwrap();

        assert_eq!(response.is_redirect(), true);
        assert_eq!(response.header("Location"), Some("/elsewhere"));
    }

    #[test]
    fn test_parse_response_without_terminator_fails() {
        assert_eq!(Response::parse(b"HTTP/1.0 200 OK\r\n").is_err(), true);
    }

    #[test]
    fn test_response_head_text_round_trips() {
        let raw = b"HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n";

        let response = Response::parse(raw).unwrap();

        assert_eq!(response.head_text().as_bytes(), &raw[..]);
    }
}
