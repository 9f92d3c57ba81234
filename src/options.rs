//! Connection and upgrade options, and their HTTP header encoding.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body_util::Full;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extensions::deflate::{DEFAULT_COMPRESSION_LEVEL, DeflateCodec};
use crate::extensions::{ExtensionOffer, offers_deflate};
use crate::protocol::handshake::{
    CheckOrigin, Upgrader, WS_VERSION, generate_key, header_value, requested_subprotocols,
};

pub use crate::extensions::deflate::{
    CompressWriter, CompressionWriterFactory, DecompressionReaderFactory,
};

/// Per-connection options.
///
/// Empty strings and zero sizes mean "not set". Compression factories are
/// optional; the flate2 codec is used for whichever one is missing.
#[derive(Clone, Default)]
pub struct Options {
    /// Negotiated (or requested) sub-protocol, empty for none.
    pub subprotocol: String,
    /// Use permessage-deflate.
    pub enable_compression: bool,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Wraps an output buffer with a compressing writer at the given level.
    pub new_compression_writer: Option<CompressionWriterFactory>,
    /// Wraps a compressed input with a decompressing reader.
    pub new_decompression_reader: Option<DecompressionReaderFactory>,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("subprotocol", &self.subprotocol)
            .field("enable_compression", &self.enable_compression)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("new_compression_writer", &self.new_compression_writer.is_some())
            .field(
                "new_decompression_reader",
                &self.new_decompression_reader.is_some(),
            )
            .finish()
    }
}

impl Options {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = subprotocol.into();
        self
    }

    #[must_use]
    pub const fn with_compression(mut self, enable: bool) -> Self {
        self.enable_compression = enable;
        self
    }

    #[must_use]
    pub const fn with_buffer_sizes(mut self, read: usize, write: usize) -> Self {
        self.read_buffer_size = read;
        self.write_buffer_size = write;
        self
    }

    #[must_use]
    pub fn with_compression_writer(mut self, factory: CompressionWriterFactory) -> Self {
        self.new_compression_writer = Some(factory);
        self
    }

    #[must_use]
    pub fn with_decompression_reader(mut self, factory: DecompressionReaderFactory) -> Self {
        self.new_decompression_reader = Some(factory);
        self
    }

    fn codec(&self) -> Option<DeflateCodec> {
        self.enable_compression.then(|| {
            DeflateCodec::new(
                DEFAULT_COMPRESSION_LEVEL,
                self.new_compression_writer.clone(),
                self.new_decompression_reader.clone(),
            )
        })
    }
}

impl From<&Options> for Config {
    fn from(options: &Options) -> Self {
        let config = Config::new()
            .with_read_buffer_size(options.read_buffer_size)
            .with_write_buffer_size(options.write_buffer_size);
        match options.codec() {
            Some(codec) => config.with_compression(codec),
            None => config,
        }
    }
}

/// Fill in the headers of a client upgrade request.
///
/// Requests `options.subprotocol` and permessage-deflate when enabled. The
/// mandatory `Upgrade`, `Connection`, `Sec-WebSocket-Version` and
/// `Sec-WebSocket-Key` headers are added unless already present.
///
/// # Errors
///
/// `Error::InvalidHeaderValue` for a sub-protocol that is not a valid header
/// value, `Error::Io` if no random key can be generated.
pub fn set_client_headers_with_option(headers: &mut HeaderMap, options: &Options) -> Result<()> {
    if !options.subprotocol.is_empty() {
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            header_value(&header::SEC_WEBSOCKET_PROTOCOL, &options.subprotocol)?,
        );
    }
    if options.enable_compression {
        headers.insert(
            header::SEC_WEBSOCKET_EXTENSIONS,
            header_value(
                &header::SEC_WEBSOCKET_EXTENSIONS,
                &ExtensionOffer::deflate_no_context_takeover().to_string(),
            )?,
        );
    }

    if !headers.contains_key(header::UPGRADE) {
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    }
    if !headers.contains_key(header::CONNECTION) {
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    }
    if !headers.contains_key(header::SEC_WEBSOCKET_VERSION) {
        headers.insert(
            header::SEC_WEBSOCKET_VERSION,
            HeaderValue::from_static(WS_VERSION),
        );
    }
    if !headers.contains_key(header::SEC_WEBSOCKET_KEY) {
        headers.insert(
            header::SEC_WEBSOCKET_KEY,
            header_value(&header::SEC_WEBSOCKET_KEY, &generate_key()?)?,
        );
    }
    Ok(())
}

/// Options negotiated by a server, read from its upgrade response.
#[must_use]
pub fn get_response_header_option(headers: &HeaderMap) -> Options {
    let subprotocol = headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    Options {
        subprotocol,
        enable_compression: deflate_offered(headers),
        ..Options::default()
    }
}

/// Options requested by a client, read from its upgrade request. Of several
/// sub-protocols, the first is kept.
#[must_use]
pub fn get_request_header_option(headers: &HeaderMap) -> Options {
    Options {
        subprotocol: requested_subprotocols(headers)
            .into_iter()
            .next()
            .unwrap_or_default(),
        enable_compression: deflate_offered(headers),
        ..Options::default()
    }
}

fn deflate_offered(headers: &HeaderMap) -> bool {
    offers_deflate(
        headers
            .get_all(header::SEC_WEBSOCKET_EXTENSIONS)
            .iter()
            .filter_map(|v| v.to_str().ok()),
    )
}

/// Builds the HTTP response for a refused upgrade.
pub type ErrorHandler =
    Arc<dyn Fn(&Request<()>, StatusCode, &Error) -> Response<Full<Bytes>> + Send + Sync>;

/// Options for accepting a connection through an HTTP upgrade.
#[derive(Clone, Default)]
pub struct UpgradeOptions {
    /// Upper bound for the HTTP layer to hand over the stream. Zero waits
    /// indefinitely.
    pub handshake_timeout: Duration,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Supported sub-protocols in order of preference.
    pub subprotocols: Vec<String>,
    /// Custom rejection response, [`default_error_response`] when `None`.
    pub error: Option<ErrorHandler>,
    /// Origin policy, same-host when `None`.
    pub check_origin: Option<CheckOrigin>,
    pub enable_compression: bool,
}

impl fmt::Debug for UpgradeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeOptions")
            .field("handshake_timeout", &self.handshake_timeout)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("subprotocols", &self.subprotocols)
            .field("error", &self.error.is_some())
            .field("check_origin", &self.check_origin.is_some())
            .field("enable_compression", &self.enable_compression)
            .finish()
    }
}

impl UpgradeOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_buffer_sizes(mut self, read: usize, write: usize) -> Self {
        self.read_buffer_size = read;
        self.write_buffer_size = write;
        self
    }

    #[must_use]
    pub fn with_subprotocols<I, S>(mut self, subprotocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = subprotocols.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error = Some(handler);
        self
    }

    #[must_use]
    pub fn with_check_origin(mut self, check: CheckOrigin) -> Self {
        self.check_origin = Some(check);
        self
    }

    #[must_use]
    pub const fn with_compression(mut self, enable: bool) -> Self {
        self.enable_compression = enable;
        self
    }

    pub(crate) fn upgrader(&self) -> Upgrader {
        Upgrader {
            subprotocols: self.subprotocols.clone(),
            check_origin: self.check_origin.clone(),
            enable_compression: self.enable_compression,
        }
    }

    /// Connection options once the handshake settled on `subprotocol` and
    /// `compression`.
    pub(crate) fn negotiated(&self, subprotocol: Option<String>, compression: bool) -> Options {
        Options {
            subprotocol: subprotocol.unwrap_or_default(),
            enable_compression: compression,
            read_buffer_size: self.read_buffer_size,
            write_buffer_size: self.write_buffer_size,
            ..Options::default()
        }
    }

    pub(crate) fn error_response(
        &self,
        request: &Request<()>,
        status: StatusCode,
        error: &Error,
    ) -> Response<Full<Bytes>> {
        match &self.error {
            Some(handler) => handler(request, status, error),
            None => default_error_response(status, error),
        }
    }
}

/// `status` with `Sec-WebSocket-Version: 13` and the status text as body.
#[must_use]
pub fn default_error_response(status: StatusCode, _error: &Error) -> Response<Full<Bytes>> {
    let body = status.canonical_reason().unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::SEC_WEBSOCKET_VERSION,
        HeaderValue::from_static(WS_VERSION),
    );
    response
}
