//! Server-side opening handshake (RFC 6455 Section 4.2).
//!
//! [`Upgrader`] validates an upgrade request head and prepares the
//! `101 Switching Protocols` response. It never touches the socket: taking
//! over the connection is left to the HTTP layer.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::extensions::{ExtensionOffer, offers_deflate};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this crate speaks.
pub const WS_VERSION: &str = "13";

/// Decides whether a request's `Origin` is acceptable.
pub type CheckOrigin = Arc<dyn Fn(&Request<()>) -> bool + Send + Sync>;

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsconn::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// A fresh Sec-WebSocket-Key: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// `Error::Io` if the system random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

/// Build a header value, rejecting CR/LF and other bytes HTTP forbids.
///
/// # Errors
///
/// `Error::InvalidHeaderValue` naming the offending header.
pub fn header_value(header: &HeaderName, value: &str) -> Result<HeaderValue> {
    if value.contains(['\r', '\n']) {
        return Err(Error::InvalidHeaderValue {
            header: header.to_string(),
            reason: "contains CR or LF characters".into(),
        });
    }
    HeaderValue::from_str(value).map_err(|e| Error::InvalidHeaderValue {
        header: header.to_string(),
        reason: e.to_string(),
    })
}

/// `true` if any comma-separated element of any `name` header equals
/// `token`, ignoring ASCII case.
#[must_use]
pub fn header_contains_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Sub-protocols listed by the client, in order of preference.
#[must_use]
pub fn requested_subprotocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// `true` when the request carries `Origin` whose host equals `Host`.
/// Requests without an `Origin` header are accepted.
#[must_use]
pub fn check_same_origin(request: &Request<()>) -> bool {
    let Some(origin) = request.headers().get(header::ORIGIN) else {
        return true;
    };
    let Some(origin_host) = origin.to_str().ok().and_then(origin_authority) else {
        return false;
    };

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()));

    host.is_some_and(|h| h.eq_ignore_ascii_case(origin_host))
}

/// `scheme://authority/...` -> `authority`.
fn origin_authority(origin: &str) -> Option<&str> {
    let (_, rest) = origin.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    (!authority.is_empty()).then_some(authority)
}

/// A request the upgrader refused, with the HTTP status to answer with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRejection {
    pub status: StatusCode,
    pub error: Error,
}

impl HandshakeRejection {
    fn new(status: StatusCode, error: Error) -> Self {
        Self { status, error }
    }

    fn bad_request(reason: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Error::InvalidHandshake(reason.to_string()),
        )
    }
}

/// An accepted upgrade: the response head to send and what was negotiated.
#[derive(Debug)]
pub struct Handshake {
    pub response: Response<()>,
    pub subprotocol: Option<String>,
    pub compression: bool,
}

/// Server-side handshake negotiator.
#[derive(Clone, Default)]
pub struct Upgrader {
    /// Supported sub-protocols in order of preference. Empty means the
    /// application chooses through the response headers.
    pub subprotocols: Vec<String>,
    /// Origin policy, [`check_same_origin`] when `None`.
    pub check_origin: Option<CheckOrigin>,
    /// Negotiate permessage-deflate when the client offers it.
    pub enable_compression: bool,
}

impl std::fmt::Debug for Upgrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgrader")
            .field("subprotocols", &self.subprotocols)
            .field("check_origin", &self.check_origin.is_some())
            .field("enable_compression", &self.enable_compression)
            .finish()
    }
}

impl Upgrader {
    /// Validate `request` and build the switching-protocols response.
    ///
    /// Headers in `response_header` are copied onto the response. Its
    /// `Sec-WebSocket-Protocol` is only used when no sub-protocol list is
    /// configured, and it must not carry `Sec-WebSocket-Extensions`.
    ///
    /// # Errors
    ///
    /// A [`HandshakeRejection`] with 400, 403, 405 or 500 status.
    pub fn upgrade(
        &self,
        request: &Request<()>,
        response_header: Option<&HeaderMap>,
    ) -> std::result::Result<Handshake, HandshakeRejection> {
        let headers = request.headers();

        if !header_contains_token(headers, &header::CONNECTION, "upgrade") {
            return Err(HandshakeRejection::bad_request(
                "'upgrade' token not found in 'Connection' header",
            ));
        }
        if !header_contains_token(headers, &header::UPGRADE, "websocket") {
            return Err(HandshakeRejection::bad_request(
                "'websocket' token not found in 'Upgrade' header",
            ));
        }
        if request.method() != Method::GET {
            return Err(HandshakeRejection::new(
                StatusCode::METHOD_NOT_ALLOWED,
                Error::InvalidHandshake(format!("request method is {}, not GET", request.method())),
            ));
        }
        if !header_contains_token(headers, &header::SEC_WEBSOCKET_VERSION, WS_VERSION) {
            return Err(HandshakeRejection::bad_request(
                "unsupported version: 13 not found in 'Sec-Websocket-Version' header",
            ));
        }
        if response_header.is_some_and(|h| h.contains_key(header::SEC_WEBSOCKET_EXTENSIONS)) {
            return Err(HandshakeRejection::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                Error::InvalidHandshake(
                    "application specific 'Sec-WebSocket-Extensions' headers are unsupported"
                        .into(),
                ),
            ));
        }

        let origin_ok = match &self.check_origin {
            Some(check) => check(request),
            None => check_same_origin(request),
        };
        if !origin_ok {
            let origin = headers
                .get(header::ORIGIN)
                .and_then(|o| o.to_str().ok())
                .unwrap_or("(none)")
                .to_string();
            return Err(HandshakeRejection::new(
                StatusCode::FORBIDDEN,
                Error::OriginNotAllowed { origin },
            ));
        }

        let key = headers
            .get(header::SEC_WEBSOCKET_KEY)
            .and_then(|k| k.to_str().ok())
            .map(str::trim)
            .filter(|k| is_valid_key(k))
            .ok_or_else(|| {
                HandshakeRejection::bad_request("'Sec-WebSocket-Key' header must be Base64 encoded value of 16-byte in length")
            })?;

        let subprotocol = self.select_subprotocol(headers, response_header);
        let compression = self.enable_compression
            && offers_deflate(
                headers
                    .get_all(header::SEC_WEBSOCKET_EXTENSIONS)
                    .iter()
                    .filter_map(|v| v.to_str().ok()),
            );

        let response = build_response(key, subprotocol.as_deref(), compression, response_header)
            .map_err(|e| HandshakeRejection::new(StatusCode::INTERNAL_SERVER_ERROR, e))?;

        Ok(Handshake {
            response,
            subprotocol,
            compression,
        })
    }

    /// First configured sub-protocol the client also offered. Without a
    /// configured list, the application's `Sec-WebSocket-Protocol` response
    /// header is used as is.
    fn select_subprotocol(
        &self,
        headers: &HeaderMap,
        response_header: Option<&HeaderMap>,
    ) -> Option<String> {
        if self.subprotocols.is_empty() {
            return response_header
                .and_then(|h| h.get(header::SEC_WEBSOCKET_PROTOCOL))
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(String::from);
        }

        let offered = requested_subprotocols(headers);
        self.subprotocols
            .iter()
            .find(|server| offered.iter().any(|client| client == *server))
            .cloned()
    }
}

fn is_valid_key(key: &str) -> bool {
    BASE64.decode(key).is_ok_and(|decoded| decoded.len() == 16)
}

fn build_response(
    key: &str,
    subprotocol: Option<&str>,
    compression: bool,
    response_header: Option<&HeaderMap>,
) -> Result<Response<()>> {
    let mut response = Response::new(());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;

    let headers = response.headers_mut();
    if let Some(extra) = response_header {
        for (name, value) in extra {
            if *name != header::SEC_WEBSOCKET_PROTOCOL {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(
        header::SEC_WEBSOCKET_ACCEPT,
        header_value(&header::SEC_WEBSOCKET_ACCEPT, &compute_accept_key(key))?,
    );
    if let Some(protocol) = subprotocol {
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            header_value(&header::SEC_WEBSOCKET_PROTOCOL, protocol)?,
        );
    }
    if compression {
        headers.insert(
            header::SEC_WEBSOCKET_EXTENSIONS,
            header_value(
                &header::SEC_WEBSOCKET_EXTENSIONS,
                &ExtensionOffer::deflate_no_context_takeover().to_string(),
            )?,
        );
    }
    Ok(response)
}
