//! HTTP side of the upgrade endpoint.
//!
//! The request head is parsed with `httparse` into an [`http::Request`],
//! which is what tungstenite's server handshake validates. Replies are
//! built as [`http::Response`] values and written straight to the socket.

use courier_core::{CourierError, CourierResult};
use http::header::{self, HeaderValue};
use http::{Request, Response, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on the request head, terminator included.
pub const MAX_HEAD_BYTES: usize = 8 * 1024;

const MAX_HEADERS: usize = 64;

/// Parse a request head from `buf`.
///
/// Returns `Ok(None)` while the head is incomplete, otherwise the request
/// and the number of bytes it occupied.
pub fn parse_request(buf: &[u8]) -> CourierResult<Option<(Request<()>, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    let consumed = match parsed.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => {
            return Err(CourierError::InvalidFrame(format!(
                "malformed request head: {e}"
            )))
        }
    };

    let (Some(method), Some(path)) = (parsed.method, parsed.path) else {
        return Err(CourierError::InvalidFrame("incomplete request line".into()));
    };
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut builder = Request::builder().method(method).uri(path).version(version);
    for h in parsed.headers.iter() {
        builder = builder.header(h.name, h.value);
    }
    let request = builder
        .body(())
        .map_err(|e| CourierError::InvalidFrame(format!("invalid request: {e}")))?;
    Ok(Some((request, consumed)))
}

/// Read bytes until a complete request head has arrived.
///
/// Clients must wait for the `101` before sending frames, so bytes after
/// the head are refused.
pub async fn read_request<S>(stream: &mut S) -> CourierResult<Request<()>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(CourierError::Transport(
                "connection closed before request head".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some((request, consumed)) = parse_request(&buf)? {
            if consumed != buf.len() {
                return Err(CourierError::InvalidFrame(
                    "unexpected bytes after request head".into(),
                ));
            }
            return Ok(request);
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(CourierError::InvalidFrame("request head too large".into()));
        }
    }
}

/// The bearer credential: `token` query parameter, then the
/// `Authorization` header (`Bearer <t>` in any case, or the bare value),
/// then the `session_token` cookie.
pub fn credential<B>(request: &Request<B>) -> Option<String> {
    let from_query = request.uri().query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
    });
    if let Some(token) = from_query.filter(|t| !t.is_empty()) {
        return Some(token);
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(value) = authorization {
        return Some(match value.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
                token.trim().to_string()
            }
            _ => value.to_string(),
        });
    }

    request
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == "session_token")
        .map(|(_, v)| v.to_string())
        .filter(|t| !t.is_empty())
}

/// `200` with the health document.
pub fn health() -> Response<String> {
    plain(
        StatusCode::OK,
        "application/json",
        r#"{"status":"healthy"}"#.to_string(),
    )
}

/// A plain-text refusal carrying the status's reason phrase.
pub fn refusal(status: StatusCode) -> Response<String> {
    let body = status.canonical_reason().unwrap_or("Error").to_string();
    plain(status, "text/plain; charset=utf-8", body)
}

fn plain(status: StatusCode, content_type: &'static str, body: String) -> Response<String> {
    let length = body.len();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Serialize a response for the wire. The body goes out verbatim.
pub fn to_bytes<B: AsRef<[u8]>>(response: &Response<B>) -> Vec<u8> {
    let status = response.status();
    let mut out = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_str(),
        status.canonical_reason().unwrap_or("")
    )
    .into_bytes();
    for (name, value) in response.headers() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(response.body().as_ref());
    out
}
