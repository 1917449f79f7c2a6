//! Minimal HTTP/1.1 request-head parsing and routing for the dashboard server
//!
//! Only what the dashboard needs: a request line, `Content-Length` for POST
//! bodies, and a fixed route table. Socket handling stays in the firmware.

use core::fmt::Write;

use thiserror_no_std::Error;

/// Largest request (head plus body) the server accepts
pub const MAX_REQUEST_SIZE: usize = 1024;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    #[error("request head is not complete")]
    Incomplete,
    #[error("request is not valid UTF-8")]
    NotUtf8,
    #[error("malformed request line")]
    MalformedRequestLine,
    #[error("only HTTP/1.x is supported")]
    UnsupportedVersion,
    #[error("invalid Content-Length")]
    BadContentLength,
    #[error("request body too large")]
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

impl Method {
    fn parse(token: &str) -> Self {
        match token {
            "GET" | "HEAD" => Self::Get,
            "POST" => Self::Post,
            _ => Self::Other,
        }
    }
}

/// Parsed request line and the headers the server cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHead<'a> {
    pub method: Method,
    /// Path without the query string
    pub path: &'a str,
    pub content_length: usize,
    /// Bytes up to and including the blank line; the body starts here
    pub header_len: usize,
}

impl RequestHead<'_> {
    /// Total bytes the request occupies once its body has arrived.
    ///
    /// Never exceeds [`MAX_REQUEST_SIZE`] for a head returned by [`parse_request_head`].
    pub fn total_len(&self) -> usize {
        self.header_len.saturating_add(self.content_length)
    }
}

/// Offset just past the `\r\n\r\n` that ends the head, if it has arrived
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Parse the request line and headers at the start of `buf`
pub fn parse_request_head(buf: &[u8]) -> Result<RequestHead<'_>, RequestError> {
    let header_len = find_head_end(buf).ok_or(RequestError::Incomplete)?;
    let head = core::str::from_utf8(&buf[..header_len]).map_err(|_| RequestError::NotUtf8)?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_ascii_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(RequestError::MalformedRequestLine);
    };
    if !version.starts_with("HTTP/1.") {
        return Err(RequestError::UnsupportedVersion);
    }
    let path = target.split_once('?').map_or(target, |(path, _)| path);

    let mut content_length = 0;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            content_length = value
                .trim()
                .parse()
                .map_err(|_| RequestError::BadContentLength)?;
        }
    }

    header_len
        .checked_add(content_length)
        .filter(|&total| total <= MAX_REQUEST_SIZE)
        .ok_or(RequestError::TooLarge)?;

    Ok(RequestHead {
        method: Method::parse(method),
        path,
        content_length,
        header_len,
    })
}

/// Endpoints served by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Dashboard,
    Data,
    History,
    StorageInfo,
    Download,
    GetRanges,
    SetRanges,
    NotFound,
}

impl Route {
    pub fn resolve(method: Method, path: &str) -> Self {
        match (method, path) {
            (Method::Get, "/" | "/index.html") => Self::Dashboard,
            (Method::Get, "/api/data") => Self::Data,
            (Method::Get, "/api/history") => Self::History,
            (Method::Get, "/api/sd-info") => Self::StorageInfo,
            (Method::Get, "/api/download-data") => Self::Download,
            (Method::Get, "/api/ranges") => Self::GetRanges,
            (Method::Post, "/api/ranges") => Self::SetRanges,
            _ => Self::NotFound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    InternalError,
}

impl Status {
    pub const fn line(self) -> &'static str {
        match self {
            Self::Ok => "200 OK",
            Self::BadRequest => "400 Bad Request",
            Self::NotFound => "404 Not Found",
            Self::InternalError => "500 Internal Server Error",
        }
    }
}

pub const CONTENT_JSON: &str = "application/json";
pub const CONTENT_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_CSV: &str = "text/csv";

pub type HeadString = heapless::String<256>;

/// Response status line and headers, ending with the blank line.
///
/// `attachment` adds a `Content-Disposition` naming the downloaded file.
pub fn response_head(
    status: Status,
    content_type: &str,
    content_length: usize,
    attachment: Option<&str>,
) -> HeadString {
    let mut head = HeadString::new();
    // Longest head is ~200 bytes with a 32-byte file name
    let _ = write!(
        head,
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status.line(),
        content_type,
        content_length
    );
    if let Some(name) = attachment {
        let _ = write!(
            head,
            "Content-Disposition: attachment; filename={}\r\n",
            name
        );
    }
    let _ = head.push_str("\r\n");
    head
}
